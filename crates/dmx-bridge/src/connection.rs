//! DMX device connection manager.
//!
//! Runs as its own task and owns the open device handle. The dispatcher talks
//! to it through a `ConnectionHandle`; commands are processed strictly in
//! arrival order.
//!
//! Lifecycle:
//!   Connecting: open attempt in flight on the blocking pool
//!   Connected: device open and resynced, writes go to USB
//!   Backoff: last attempt or write failed, retry after `backoff`
//!
//! Retry is unbounded and at a fixed interval. Every device call (open or
//! single-channel write) is bounded by `call_timeout`; a timeout counts as a
//! failure and the stuck handle is abandoned.
//!
//! Writes requested while not connected are answered `Skipped` immediately,
//! so a missing or hung device never stalls frame ingestion. Every requested
//! value is recorded in the `intended` mirror, which is what gets replayed to
//! the device (all 512 channels) after each successful open.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use dmx_device::{DeviceError, DmxDriver, DmxOutput};
use dmx_protocol::channels::ChannelBuffer;
use dmx_protocol::events::{BridgeEvent, ConnectionState};
use dmx_protocol::DMX_CHANNELS;

use crate::relay::EventRelay;

/// Pending write commands. The dispatcher awaits each reply, so this only
/// needs headroom for a handful of callers.
const COMMAND_QUEUE: usize = 64;

/// What happened to a single channel write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Written to the device
    Applied,
    /// Device not connected; recorded for the next resync only
    Skipped,
    /// Device call failed or timed out; connection dropped
    Failed,
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Wait between connect attempts
    pub backoff: Duration,
    /// Upper bound for one open or write call
    pub call_timeout: Duration,
}

/// Device call failure as seen by the manager.
#[derive(Error, Debug)]
pub enum CallError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("device call timed out after {0:?}")]
    Timeout(Duration),

    #[error("device call aborted: {0}")]
    Aborted(String),
}

enum Command {
    Write {
        index: usize,
        value: u8,
        reply: oneshot::Sender<WriteOutcome>,
    },
}

/// Cheap, cloneable access to the connection manager.
#[derive(Clone)]
pub struct ConnectionHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    /// Write one channel (`index` is 0-based). Resolves once the manager has
    /// handled it; never returns before the device call finished or timed out.
    pub async fn write(&self, index: usize, value: u8) -> WriteOutcome {
        let (reply, outcome) = oneshot::channel();
        if self
            .commands
            .send(Command::Write { index, value, reply })
            .await
            .is_err()
        {
            return WriteOutcome::Failed;
        }
        outcome.await.unwrap_or(WriteOutcome::Failed)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Follow state changes. The receiver always holds the current state.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the manager reaches `wanted`. Returns false if it stopped.
    pub async fn wait_for(&self, wanted: ConnectionState) -> bool {
        let mut rx = self.state.clone();
        let reached = rx.wait_for(|state| *state == wanted).await.is_ok();
        reached
    }
}

/// Start the connection manager. The first open attempt begins immediately.
pub fn spawn(
    driver: Arc<dyn DmxDriver>,
    settings: ConnectionSettings,
    relay: EventRelay,
) -> (ConnectionHandle, JoinHandle<()>) {
    let (commands, rx) = mpsc::channel(COMMAND_QUEUE);
    let (state_tx, state) = watch::channel(ConnectionState::Disconnected);

    let manager = ConnectionManager {
        driver,
        settings,
        relay,
        state_tx,
        output: None,
        intended: ChannelBuffer::new(),
        reported: None,
        failed_attempts: 0,
    };
    let task = tokio::spawn(manager.run(rx));

    (ConnectionHandle { commands, state }, task)
}

type Opened = Result<Box<dyn DmxOutput>, CallError>;

enum Phase {
    Connecting(JoinHandle<Opened>),
    Backoff(Instant),
    Connected,
}

enum Step {
    Command(Option<Command>),
    Opened(Opened),
    Retry,
}

struct ConnectionManager {
    driver: Arc<dyn DmxDriver>,
    settings: ConnectionSettings,
    relay: EventRelay,
    state_tx: watch::Sender<ConnectionState>,
    /// Present only while connected
    output: Option<Box<dyn DmxOutput>>,
    /// Latest value requested for every channel, connected or not
    intended: ChannelBuffer,
    /// Last state announced on the relay
    reported: Option<ConnectionState>,
    failed_attempts: u32,
}

impl ConnectionManager {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!(
            driver = %self.driver.describe(),
            backoff_ms = self.settings.backoff.as_millis() as u64,
            "Connection manager started"
        );

        let mut phase = self.start_attempt();

        loop {
            let step = match &mut phase {
                Phase::Connecting(attempt) => tokio::select! {
                    cmd = commands.recv() => Step::Command(cmd),
                    joined = attempt => Step::Opened(
                        joined.unwrap_or_else(|e| Err(CallError::Aborted(e.to_string()))),
                    ),
                },
                Phase::Backoff(deadline) => tokio::select! {
                    cmd = commands.recv() => Step::Command(cmd),
                    _ = tokio::time::sleep_until(*deadline) => Step::Retry,
                },
                Phase::Connected => Step::Command(commands.recv().await),
            };

            phase = match step {
                Step::Command(None) => {
                    debug!("All connection handles dropped, manager stopping");
                    if let Phase::Connecting(attempt) = phase {
                        attempt.abort();
                    }
                    return;
                }
                Step::Command(Some(Command::Write { index, value, reply })) => {
                    let (outcome, next) = self.handle_write(index, value, phase).await;
                    let _ = reply.send(outcome);
                    next
                }
                Step::Opened(opened) => self.finish_attempt(opened).await,
                Step::Retry => self.start_attempt(),
            };
        }
    }

    fn start_attempt(&mut self) -> Phase {
        self.set_state(ConnectionState::Connecting);
        debug!("Connecting to DMX device");

        let driver = Arc::clone(&self.driver);
        let limit = self.settings.call_timeout;
        Phase::Connecting(tokio::spawn(async move {
            blocking_call(limit, move || driver.open())
                .await
                .and_then(|opened| opened.map_err(CallError::from))
        }))
    }

    async fn finish_attempt(&mut self, opened: Opened) -> Phase {
        let output = match opened {
            Ok(output) => output,
            Err(e) => {
                self.failed_attempts += 1;
                // First failure is worth a warning; a device that stays away
                // would otherwise flood the log once per backoff interval
                if self.failed_attempts == 1 {
                    warn!(
                        error = %e,
                        retry_ms = self.settings.backoff.as_millis() as u64,
                        "DMX device connection failed, retrying"
                    );
                } else {
                    debug!(attempt = self.failed_attempts, error = %e, "DMX device still unavailable");
                }
                return self.connection_lost();
            }
        };

        info!(device = %output.device_name(), "DMX device opened, resyncing universe");
        self.output = Some(output);

        if let Err(e) = self.resync().await {
            warn!(error = %e, "Resync failed, treating device as disconnected");
            return self.connection_lost();
        }

        self.failed_attempts = 0;
        self.set_state(ConnectionState::Connected);
        self.report(ConnectionState::Connected);
        info!("Connected to DMX device");
        Phase::Connected
    }

    async fn handle_write(&mut self, index: usize, value: u8, phase: Phase) -> (WriteOutcome, Phase) {
        if index >= DMX_CHANNELS {
            warn!(index, "Ignoring write outside the universe");
            return (WriteOutcome::Failed, phase);
        }

        self.intended.apply(index, value);

        if !matches!(phase, Phase::Connected) {
            return (WriteOutcome::Skipped, phase);
        }

        let channel = index as u16 + 1;
        match self.write_channel(channel, value).await {
            Ok(()) => (WriteOutcome::Applied, phase),
            Err(e) => {
                warn!(channel, value, error = %e, "DMX write failed, treating device as disconnected");
                (WriteOutcome::Failed, self.connection_lost())
            }
        }
    }

    /// Replay every channel, 1 through 512, from the intended mirror.
    async fn resync(&mut self) -> Result<(), CallError> {
        let writes: Vec<(u16, u8)> = self.intended.resync_writes().collect();
        for (channel, value) in writes {
            self.write_channel(channel, value).await?;
        }
        Ok(())
    }

    async fn write_channel(&mut self, channel: u16, value: u8) -> Result<(), CallError> {
        let mut output = self
            .output
            .take()
            .ok_or_else(|| DeviceError::Other("device not open".to_string()))?;

        let (output, result) = blocking_call(self.settings.call_timeout, move || {
            let result = output.set_channel(channel, value);
            (output, result)
        })
        .await?;

        // On failure the handle is dropped here and the device closed
        result?;
        self.output = Some(output);
        Ok(())
    }

    fn connection_lost(&mut self) -> Phase {
        self.output = None;
        self.set_state(ConnectionState::Disconnected);
        self.report(ConnectionState::Disconnected);
        Phase::Backoff(Instant::now() + self.settings.backoff)
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    /// Announce a connect/disconnect on the relay, once per transition.
    fn report(&mut self, state: ConnectionState) {
        if self.reported == Some(state) {
            return;
        }
        self.reported = Some(state);
        self.relay.emit(if state.is_connected() {
            BridgeEvent::DeviceConnected
        } else {
            BridgeEvent::DeviceDisconnected
        });
    }
}

/// Run a device call on the blocking pool, bounded by `limit`.
async fn blocking_call<T, F>(limit: Duration, f: F) -> Result<T, CallError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(limit, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(CallError::Aborted(e.to_string())),
        Err(_) => Err(CallError::Timeout(limit)),
    }
}
