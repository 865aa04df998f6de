//! DMX channel buffer with change detection.
//!
//! Holds the last value written (or intended) for each of the 512 channels of
//! a universe. Incoming frames are diffed against it so only channels that
//! actually changed go out over USB.
//!
//! Indices are 0-based (`0..512`); DMX channel numbers are 1-based (`1..=512`).

use crate::DMX_CHANNELS;

/// One channel whose value differs from the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelChange {
    /// 0-based buffer index
    pub index: usize,
    pub value: u8,
}

impl ChannelChange {
    /// 1-based DMX channel number for this change.
    pub fn channel(&self) -> u16 {
        self.index as u16 + 1
    }
}

/// Compare two full universes and return every index that differs, ascending.
pub fn diff(current: &[u8; DMX_CHANNELS], incoming: &[u8; DMX_CHANNELS]) -> Vec<ChannelChange> {
    diff_slice(current, incoming)
}

fn diff_slice(current: &[u8; DMX_CHANNELS], incoming: &[u8]) -> Vec<ChannelChange> {
    current
        .iter()
        .zip(incoming.iter())
        .enumerate()
        .filter(|(_, (old, new))| old != new)
        .map(|(index, (_, &value))| ChannelChange { index, value })
        .collect()
}

/// Fixed 512-slot channel buffer. Starts all zero.
#[derive(Clone, PartialEq, Eq)]
pub struct ChannelBuffer {
    values: [u8; DMX_CHANNELS],
}

impl Default for ChannelBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChannelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.values.iter().filter(|&&v| v != 0).count();
        f.debug_struct("ChannelBuffer")
            .field("non_zero", &non_zero)
            .finish()
    }
}

impl ChannelBuffer {
    pub fn new() -> Self {
        Self {
            values: [0u8; DMX_CHANNELS],
        }
    }

    /// Changes needed to bring the buffer to `incoming`, in ascending index order.
    ///
    /// Payloads shorter than a universe only cover their own length: channels
    /// past the end are treated as unchanged. Anything past 512 is ignored.
    pub fn diff(&self, incoming: &[u8]) -> Vec<ChannelChange> {
        diff_slice(&self.values, incoming)
    }

    /// Store a single value. Out-of-range indices are ignored.
    pub fn apply(&mut self, index: usize, value: u8) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        self.values.get(index).copied()
    }

    pub fn as_slice(&self) -> &[u8; DMX_CHANNELS] {
        &self.values
    }

    /// Every channel as `(dmx_channel, value)`, channel 1 through 512.
    /// Used to resynchronize a device that lost its state.
    pub fn resync_writes(&self) -> impl Iterator<Item = (u16, u8)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(i, &v)| (i as u16 + 1, v))
    }
}

impl From<[u8; DMX_CHANNELS]> for ChannelBuffer {
    fn from(values: [u8; DMX_CHANNELS]) -> Self {
        Self { values }
    }
}
