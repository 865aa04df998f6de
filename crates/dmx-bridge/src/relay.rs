//! Fire-and-forget event relay.
//!
//! The data path calls `emit()` and moves on: it never waits for, and never
//! learns about, the observer. When health reporting is off the relay is
//! disabled and `emit` does nothing. When on, events go through a broadcast
//! channel; a slow observer loses the oldest events (it sees `Lagged`), the
//! sender is never held up.

use tokio::sync::broadcast;

use dmx_protocol::events::BridgeEvent;

/// Events buffered for the observer before the oldest are dropped.
pub const RELAY_CAPACITY: usize = 1024;

#[derive(Clone, Default)]
pub struct EventRelay {
    tx: Option<broadcast::Sender<BridgeEvent>>,
}

impl EventRelay {
    /// A relay with no observer. Every emit is a no-op.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx: Some(tx) }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Attach an observer. Returns `None` for a disabled relay.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<BridgeEvent>> {
        self.tx.as_ref().map(|tx| tx.subscribe())
    }

    pub fn emit(&self, event: BridgeEvent) {
        if let Some(tx) = &self.tx {
            // No receivers is not an error for the emitter
            let _ = tx.send(event);
        }
    }

    /// Like `emit`, but only builds the event when someone could receive it.
    pub fn emit_with(&self, make: impl FnOnce() -> BridgeEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(make());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broadcast::error::TryRecvError;

    #[test]
    fn disabled_relay_is_a_no_op() {
        let relay = EventRelay::disabled();
        assert!(!relay.is_enabled());
        assert!(relay.subscribe().is_none());
        relay.emit(BridgeEvent::DeviceConnected);

        let mut built = false;
        relay.emit_with(|| {
            built = true;
            BridgeEvent::DeviceConnected
        });
        assert!(!built);
    }

    #[test]
    fn emit_without_subscribers_does_not_fail() {
        let relay = EventRelay::new(4);
        relay.emit(BridgeEvent::DeviceDisconnected);
        relay.emit(BridgeEvent::DeviceConnected);
    }

    #[test]
    fn subscriber_sees_events_in_order() {
        let relay = EventRelay::new(8);
        let mut rx = relay.subscribe().unwrap();
        relay.emit(BridgeEvent::DeviceDisconnected);
        relay.emit(BridgeEvent::DeviceConnected);

        assert_eq!(rx.try_recv().unwrap(), BridgeEvent::DeviceDisconnected);
        assert_eq!(rx.try_recv().unwrap(), BridgeEvent::DeviceConnected);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn overflow_drops_oldest() {
        let relay = EventRelay::new(2);
        let mut rx = relay.subscribe().unwrap();
        relay.emit(BridgeEvent::DeviceDisconnected);
        relay.emit(BridgeEvent::DeviceConnected);
        relay.emit(BridgeEvent::DeviceDisconnected);

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Lagged(1))));
        assert_eq!(rx.try_recv().unwrap(), BridgeEvent::DeviceConnected);
        assert_eq!(rx.try_recv().unwrap(), BridgeEvent::DeviceDisconnected);
    }
}
