/// Optional health HTTP endpoint.
///
/// Binds to `0.0.0.0:<health>` when health reporting is enabled.
///
/// Endpoints:
///   GET /health          — JSON `HealthReport`
///   GET /health/config   — JSON `ConfigEcho`
///   GET /health/history  — JSON array of `WriteRecord`, oldest first

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::health::SharedHealth;

pub fn router(state: SharedHealth) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/config", get(config_handler))
        .route("/health/history", get(history_handler))
        .with_state(state)
}

/// Bind the health port. A taken port is a startup error for the caller.
pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(port, "Health API listening");
    Ok(listener)
}

/// Serve on an already bound listener.  Should be spawned as a tokio task.
pub async fn serve(listener: TcpListener, state: SharedHealth) {
    if let Err(e) = axum::serve(listener, router(state)).await {
        error!("Health server error: {}", e);
    }
}

// ── Handlers ────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<SharedHealth>) -> impl IntoResponse {
    Json(state.read().await.report())
}

async fn config_handler(State(state): State<SharedHealth>) -> impl IntoResponse {
    Json(state.read().await.config())
}

async fn history_handler(State(state): State<SharedHealth>) -> impl IntoResponse {
    Json(state.read().await.history())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use dmx_protocol::events::BridgeEvent;
    use dmx_protocol::health::{ArtnetEcho, ConfigEcho};
    use tower::ServiceExt;

    use crate::health::HealthState;

    fn state() -> SharedHealth {
        HealthState::new(ConfigEcho {
            artnet: ArtnetEcho {
                port: 6454,
                universe: 2,
            },
        })
        .shared()
    }

    async fn get_json(state: SharedHealth, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_disconnected_at_start() {
        let (status, body) = get_json(state(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({ "healthy": false, "lastWrite": null, "connected": false })
        );
    }

    #[tokio::test]
    async fn health_shows_last_write_once_connected() {
        let state = state();
        {
            let mut s = state.write().await;
            s.apply(BridgeEvent::DeviceConnected, 1);
            s.apply(
                BridgeEvent::FramePayload {
                    universe: 2,
                    origin: "10.1.1.1:6454".parse().unwrap(),
                    data: vec![1, 2],
                },
                42,
            );
        }

        let (_, body) = get_json(state, "/health").await;
        assert_eq!(body["healthy"], true);
        assert_eq!(body["connected"], true);
        assert_eq!(
            body["lastWrite"],
            serde_json::json!({ "timestamp": 42, "peer": "10.1.1.1", "universe": 2, "data": [1, 2] })
        );
    }

    #[tokio::test]
    async fn config_echoes_artnet_settings() {
        let (_, body) = get_json(state(), "/health/config").await;
        assert_eq!(body, serde_json::json!({ "artnet": { "port": 6454, "universe": 2 } }));
    }

    #[tokio::test]
    async fn history_lists_oldest_first() {
        let state = state();
        {
            let mut s = state.write().await;
            for (i, ts) in [10u64, 20, 30].into_iter().enumerate() {
                s.apply(
                    BridgeEvent::FramePayload {
                        universe: 0,
                        origin: "10.1.1.1:6454".parse().unwrap(),
                        data: vec![i as u8],
                    },
                    ts,
                );
            }
        }

        let (_, body) = get_json(state, "/health/history").await;
        let stamps: Vec<u64> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["timestamp"].as_u64().unwrap())
            .collect();
        assert_eq!(stamps, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let response = router(state())
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serves_on_bound_listener() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = bind(0).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(serve(listener, state()));

        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(b"GET /health/config HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        server.abort();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains(r#""universe":2"#));
    }

    #[tokio::test]
    async fn bind_fails_on_taken_port() {
        let taken = bind(0).await.unwrap();
        let port = taken.local_addr().unwrap().port();
        assert!(bind(port).await.is_err());
    }
}
