/// Health observer.
///
/// Runs as its own task, fed by the event relay. Keeps:
/// - device connected flag, read from the connection manager's state on every
///   event and after every lag, so dropped events cannot leave it stale
/// - history of received frames, capped at `HISTORY_LIMIT` (oldest evicted)
/// - static echo of the Art-Net settings
///
/// The HTTP handlers read the same state through `SharedHealth`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, RwLock};
use tracing::{debug, info};

use dmx_protocol::events::{BridgeEvent, ConnectionState};
use dmx_protocol::health::{ConfigEcho, HealthReport, WriteRecord, HISTORY_LIMIT};

pub type SharedHealth = Arc<RwLock<HealthState>>;

#[derive(Debug)]
pub struct HealthState {
    connected: bool,
    history: VecDeque<WriteRecord>,
    limit: usize,
    config: ConfigEcho,
}

impl HealthState {
    pub fn new(config: ConfigEcho) -> Self {
        Self::with_limit(config, HISTORY_LIMIT)
    }

    pub fn with_limit(config: ConfigEcho, limit: usize) -> Self {
        Self {
            connected: false,
            history: VecDeque::new(),
            limit,
            config,
        }
    }

    pub fn shared(self) -> SharedHealth {
        Arc::new(RwLock::new(self))
    }

    /// Fold one relay event into the state. `timestamp` is ms since epoch.
    pub fn apply(&mut self, event: BridgeEvent, timestamp: u64) {
        match event {
            BridgeEvent::DeviceConnected => self.connected = true,
            BridgeEvent::DeviceDisconnected => self.connected = false,
            BridgeEvent::FramePayload {
                universe,
                origin,
                data,
            } => {
                if self.history.len() == self.limit {
                    self.history.pop_front();
                }
                self.history.push_back(WriteRecord {
                    timestamp,
                    peer: origin.ip().to_string(),
                    universe,
                    data,
                });
            }
        }
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn report(&self) -> HealthReport {
        HealthReport {
            healthy: self.connected,
            last_write: self.history.back().cloned(),
            connected: self.connected,
        }
    }

    /// Oldest first.
    pub fn history(&self) -> Vec<WriteRecord> {
        self.history.iter().cloned().collect()
    }

    pub fn config(&self) -> ConfigEcho {
        self.config
    }
}

/// Consume relay events until the relay is gone.
pub async fn run_observer(
    mut rx: broadcast::Receiver<BridgeEvent>,
    connection: watch::Receiver<ConnectionState>,
    state: SharedHealth,
) {
    info!("Health observer started");

    loop {
        match rx.recv().await {
            Ok(event) => {
                let now = now_ms();
                let connected = connection.borrow().is_connected();
                let mut state = state.write().await;
                state.apply(event, now);
                state.set_connected(connected);
            }
            Err(RecvError::Lagged(missed)) => {
                debug!(missed, "Health observer lagging, oldest events dropped");
                let connected = connection.borrow().is_connected();
                state.write().await.set_connected(connected);
            }
            Err(RecvError::Closed) => {
                debug!("Event relay closed, health observer stopping");
                break;
            }
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmx_protocol::health::ArtnetEcho;

    fn echo() -> ConfigEcho {
        ConfigEcho {
            artnet: ArtnetEcho {
                port: 6454,
                universe: 0,
            },
        }
    }

    fn payload(universe: u16, first: u8) -> BridgeEvent {
        BridgeEvent::FramePayload {
            universe,
            origin: "192.168.1.20:6454".parse().unwrap(),
            data: vec![first, 0, 0],
        }
    }

    #[test]
    fn starts_unhealthy_without_last_write() {
        let state = HealthState::new(echo());
        let report = state.report();
        assert!(!report.healthy);
        assert!(!report.connected);
        assert!(report.last_write.is_none());
        assert!(state.history().is_empty());
    }

    #[test]
    fn connection_events_drive_healthy() {
        let mut state = HealthState::new(echo());
        state.apply(BridgeEvent::DeviceConnected, 1);
        assert!(state.report().healthy);
        state.apply(BridgeEvent::DeviceDisconnected, 2);
        assert!(!state.report().connected);
    }

    #[test]
    fn frames_are_recorded_with_peer_ip() {
        let mut state = HealthState::new(echo());
        state.apply(payload(0, 1), 100);
        state.apply(payload(3, 2), 200);

        let last = state.report().last_write.unwrap();
        assert_eq!(last.timestamp, 200);
        assert_eq!(last.peer, "192.168.1.20");
        assert_eq!(last.universe, 3);
        assert_eq!(state.history().len(), 2);
    }

    #[test]
    fn history_evicts_oldest_at_limit() {
        let mut state = HealthState::with_limit(echo(), 3);
        for i in 0..5u8 {
            state.apply(payload(0, i), i as u64);
        }
        let firsts: Vec<u8> = state.history().iter().map(|r| r.data[0]).collect();
        assert_eq!(firsts, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn observer_follows_relay_until_closed() {
        let (tx, rx) = broadcast::channel(8);
        let (_conn_tx, conn_rx) = watch::channel(ConnectionState::Connected);
        let state = HealthState::new(echo()).shared();
        let task = tokio::spawn(run_observer(rx, conn_rx, Arc::clone(&state)));

        tx.send(BridgeEvent::DeviceConnected).unwrap();
        tx.send(payload(0, 9)).unwrap();
        drop(tx);
        task.await.unwrap();

        let state = state.read().await;
        assert!(state.report().connected);
        assert_eq!(state.history().len(), 1);
    }

    #[tokio::test]
    async fn observer_survives_lag() {
        let (tx, rx) = broadcast::channel(2);
        let (_conn_tx, conn_rx) = watch::channel(ConnectionState::Disconnected);
        let state = HealthState::new(echo()).shared();

        for i in 0..5u8 {
            tx.send(payload(0, i)).unwrap();
        }
        drop(tx);
        run_observer(rx, conn_rx, Arc::clone(&state)).await;

        let firsts: Vec<u8> = state.read().await.history().iter().map(|r| r.data[0]).collect();
        assert_eq!(firsts, vec![3, 4]);
    }

    #[tokio::test]
    async fn connected_survives_dropped_connect_event() {
        let (tx, rx) = broadcast::channel(2);
        let (_conn_tx, conn_rx) = watch::channel(ConnectionState::Connected);
        let state = HealthState::new(echo()).shared();

        // DeviceConnected is pushed out of the channel by the frames behind it
        tx.send(BridgeEvent::DeviceConnected).unwrap();
        for i in 0..4u8 {
            tx.send(payload(0, i)).unwrap();
        }
        drop(tx);
        run_observer(rx, conn_rx, Arc::clone(&state)).await;

        let report = state.read().await.report();
        assert!(report.healthy);
        assert!(report.connected);
    }

    #[tokio::test]
    async fn stale_connect_event_does_not_override_current_state() {
        let (tx, rx) = broadcast::channel(8);
        let (_conn_tx, conn_rx) = watch::channel(ConnectionState::Disconnected);
        let state = HealthState::new(echo()).shared();

        tx.send(BridgeEvent::DeviceConnected).unwrap();
        drop(tx);
        run_observer(rx, conn_rx, Arc::clone(&state)).await;

        assert!(!state.read().await.report().connected);
    }
}
