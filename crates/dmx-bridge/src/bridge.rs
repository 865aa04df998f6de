//! Bridge orchestrator.
//!
//! Startup order:
//!   1. health port bind and event relay (only if `health` is set)
//!   2. connection manager (first connect attempt starts right away)
//!   3. health observer and HTTP server
//!   4. Art-Net socket bind, then the receive loop
//!
//! A failed bind aborts whatever was already spawned and is returned as an
//! error, so no port stays held after a failed start.
//!
//! Shutdown is Ctrl-C: every spawned task is aborted.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinHandle;
use tracing::{error, info};

use dmx_device::DmxDriver;

use crate::artnet_listener::ArtnetListener;
use crate::config::BridgeConfig;
use crate::connection::{self, ConnectionHandle, ConnectionSettings};
use crate::dispatcher::Dispatcher;
use crate::health::{self, HealthState, SharedHealth};
use crate::health_server;
use crate::relay::{EventRelay, RELAY_CAPACITY};

/// A running bridge.
pub struct Bridge {
    artnet_addr: SocketAddr,
    connection: ConnectionHandle,
    health: Option<SharedHealth>,
    tasks: Vec<JoinHandle<()>>,
}

impl Bridge {
    /// Wire everything up and start receiving.
    pub async fn start(config: &BridgeConfig, driver: Arc<dyn DmxDriver>) -> anyhow::Result<Self> {
        let health_listener = match config.health {
            Some(port) => Some(
                health_server::bind(port)
                    .await
                    .with_context(|| format!("failed to bind health port {port}"))?,
            ),
            None => None,
        };
        let relay = match health_listener {
            Some(_) => EventRelay::new(RELAY_CAPACITY),
            None => EventRelay::disabled(),
        };
        // Subscribed before the manager runs so its first events are seen
        let events = relay.subscribe();

        let mut tasks = Vec::new();
        let settings = ConnectionSettings {
            backoff: config.reconnect_backoff(),
            call_timeout: config.call_timeout(),
        };
        let (connection, manager) = connection::spawn(driver, settings, relay.clone());
        tasks.push(manager);

        let health = match (health_listener, events) {
            (Some(listener), Some(events)) => {
                let state = HealthState::new(config.config_echo()).shared();
                tasks.push(tokio::spawn(health::run_observer(
                    events,
                    connection.subscribe_state(),
                    Arc::clone(&state),
                )));
                tasks.push(tokio::spawn(health_server::serve(listener, Arc::clone(&state))));
                Some(state)
            }
            _ => None,
        };

        let listener = match ArtnetListener::bind(config.artnet.port) {
            Ok(l) => l,
            Err(e) => {
                for task in &tasks {
                    task.abort();
                }
                return Err(e).with_context(|| {
                    format!("failed to bind Art-Net port {}", config.artnet.port)
                });
            }
        };
        let artnet_addr = listener.local_addr()?;

        let dispatcher = Dispatcher::new(config.artnet.universe, connection.clone(), relay);
        tasks.push(tokio::spawn(listener.run(dispatcher)));

        info!(
            addr = %artnet_addr,
            universe = config.artnet.universe,
            health = ?config.health,
            "Bridge running"
        );

        Ok(Self {
            artnet_addr,
            connection,
            health,
            tasks,
        })
    }

    /// Local address of the Art-Net socket.
    pub fn artnet_addr(&self) -> SocketAddr {
        self.artnet_addr
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    /// Health state, when health reporting is enabled.
    pub fn health(&self) -> Option<&SharedHealth> {
        self.health.as_ref()
    }

    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

/// Run the bridge until Ctrl-C.
pub async fn run(config: BridgeConfig, driver: Arc<dyn DmxDriver>) -> anyhow::Result<()> {
    info!(driver = %driver.describe(), "Starting dmx-bridge");
    let bridge = Bridge::start(&config, driver).await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
    info!("Shutting down...");
    bridge.shutdown();

    Ok(())
}
