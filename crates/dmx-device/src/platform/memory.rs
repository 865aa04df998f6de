//! In-memory DMX driver.
//!
//! Records every open and every channel write in order, and can be told to
//! fail opens, fail a write, or stall a write. Clones share the same log, so
//! a test keeps one clone while the bridge owns another.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::{check_channel, DeviceError, DmxDriver, DmxOutput, Result};

/// One observed device operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOp {
    Opened,
    OpenFailed,
    Set { channel: u16, value: u8 },
    SetFailed { channel: u16, value: u8 },
}

#[derive(Default)]
struct MemoryState {
    ops: Vec<DeviceOp>,
    /// Remaining opens that should fail
    failing_opens: u32,
    /// Successful writes left before the next one fails
    write_budget: Option<usize>,
    /// Sleep inside the next write
    stall_next: Option<Duration>,
}

#[derive(Clone, Default)]
pub struct MemoryDriver {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The next `n` calls to `open()` fail.
    pub fn fail_next_opens(&self, n: u32) {
        self.lock().failing_opens = n;
    }

    /// Allow `n` more successful writes, then fail exactly one.
    pub fn fail_write_after(&self, n: usize) {
        self.lock().write_budget = Some(n);
    }

    /// Block the next write for `duration` before it succeeds.
    pub fn stall_next_write(&self, duration: Duration) {
        self.lock().stall_next = Some(duration);
    }

    /// Everything that happened so far.
    pub fn ops(&self) -> Vec<DeviceOp> {
        self.lock().ops.clone()
    }

    /// Successful writes only, as `(channel, value)`.
    pub fn writes(&self) -> Vec<(u16, u8)> {
        self.lock()
            .ops
            .iter()
            .filter_map(|op| match *op {
                DeviceOp::Set { channel, value } => Some((channel, value)),
                _ => None,
            })
            .collect()
    }

    pub fn open_attempts(&self) -> usize {
        self.lock()
            .ops
            .iter()
            .filter(|op| matches!(op, DeviceOp::Opened | DeviceOp::OpenFailed))
            .count()
    }

    pub fn clear(&self) {
        self.lock().ops.clear();
    }
}

impl DmxDriver for MemoryDriver {
    fn open(&self) -> Result<Box<dyn DmxOutput>> {
        let mut state = self.lock();
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            state.ops.push(DeviceOp::OpenFailed);
            return Err(DeviceError::Other("simulated open failure".to_string()));
        }
        state.ops.push(DeviceOp::Opened);
        Ok(Box::new(MemoryOutput {
            state: Arc::clone(&self.state),
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

struct MemoryOutput {
    state: Arc<Mutex<MemoryState>>,
}

impl DmxOutput for MemoryOutput {
    fn set_channel(&mut self, channel: u16, value: u8) -> Result<()> {
        check_channel(channel)?;

        let stall = self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .stall_next
            .take();
        if let Some(duration) = stall {
            std::thread::sleep(duration);
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match state.write_budget {
            Some(0) => {
                state.write_budget = None;
                state.ops.push(DeviceOp::SetFailed { channel, value });
                Err(DeviceError::Other("simulated write failure".to_string()))
            }
            Some(n) => {
                state.write_budget = Some(n - 1);
                state.ops.push(DeviceOp::Set { channel, value });
                Ok(())
            }
            None => {
                state.ops.push(DeviceOp::Set { channel, value });
                Ok(())
            }
        }
    }

    fn device_name(&self) -> &str {
        "memory"
    }
}
