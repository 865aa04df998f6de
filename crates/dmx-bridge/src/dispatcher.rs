//! Frame filter and diff dispatcher.
//!
//! Owns the channel buffer. Each frame is announced on the relay first,
//! then filtered by universe, diffed, and the changed channels are written
//! in ascending order, one awaited write at a time. The buffer only moves
//! after the connection manager has answered for that channel.

use tracing::{debug, trace};

use dmx_protocol::channels::ChannelBuffer;
use dmx_protocol::events::{BridgeEvent, LightingFrame};

use crate::connection::{ConnectionHandle, WriteOutcome};
use crate::relay::EventRelay;

/// Log the counters every this many frames.
const STATS_INTERVAL: u64 = 1000;

/// Running counters for the dispatcher.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub frames: u64,
    /// Frames addressed to another universe
    pub ignored: u64,
    pub applied: u64,
    pub skipped: u64,
    pub failed: u64,
}

pub struct Dispatcher {
    universe: u16,
    connection: ConnectionHandle,
    relay: EventRelay,
    buffer: ChannelBuffer,
    stats: FrameStats,
}

impl Dispatcher {
    pub fn new(universe: u16, connection: ConnectionHandle, relay: EventRelay) -> Self {
        Self {
            universe,
            connection,
            relay,
            buffer: ChannelBuffer::new(),
            stats: FrameStats::default(),
        }
    }

    pub fn buffer(&self) -> &ChannelBuffer {
        &self.buffer
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Handle one inbound frame. Returns the number of channels that changed.
    pub async fn on_frame(&mut self, frame: LightingFrame) -> usize {
        self.stats.frames += 1;
        self.relay.emit_with(|| BridgeEvent::frame(&frame));

        if frame.universe != self.universe {
            self.stats.ignored += 1;
            trace!(universe = frame.universe, origin = %frame.origin, "Frame for another universe");
            self.log_stats();
            return 0;
        }

        let changes = self.buffer.diff(&frame.data);
        if !changes.is_empty() {
            debug!(origin = %frame.origin, changed = changes.len(), "Dispatching frame");
        }

        for (done, change) in changes.iter().enumerate() {
            let outcome = self.connection.write(change.index, change.value).await;
            self.buffer.apply(change.index, change.value);
            match outcome {
                WriteOutcome::Applied => self.stats.applied += 1,
                WriteOutcome::Skipped => self.stats.skipped += 1,
                WriteOutcome::Failed => {
                    // Rest of the frame is dropped; the reconnect resync
                    // brings the device back to the buffer state
                    self.stats.failed += 1;
                    debug!(
                        channel = change.channel(),
                        value = change.value,
                        abandoned = changes.len() - done - 1,
                        "Write failed, dropping rest of frame"
                    );
                    break;
                }
            }
        }

        self.log_stats();
        changes.len()
    }

    fn log_stats(&self) {
        if self.stats.frames % STATS_INTERVAL == 0 {
            let s = self.stats;
            debug!(
                frames = s.frames,
                ignored = s.ignored,
                applied = s.applied,
                skipped = s.skipped,
                failed = s.failed,
                "Dispatcher stats"
            );
        }
    }
}
