//! Typed event bus shared by everything living in one page context
//!
//! One bus per event family, constructed once and handed out by `Arc`.
//! Subscribers get independent streams; emitting with no subscribers
//! drops the event.

use tokio::sync::broadcast;

/// Default buffer size for a bus.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// A typed publish/subscribe channel.
#[derive(Debug)]
pub struct EventBus<E: Clone> {
    tx: broadcast::Sender<E>,
}

impl<E: Clone + std::fmt::Debug> EventBus<E> {
    /// Create a bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: E) {
        tracing::debug!(
            ?event,
            subscriber_count = self.tx.receiver_count(),
            "bus emit"
        );
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<E: Clone + std::fmt::Debug> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// Drain every event currently buffered for a receiver without waiting.
pub fn drain<E: Clone>(rx: &mut broadcast::Receiver<E>) -> Vec<E> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => out.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_events_emitted_after_subscribing() {
        let bus: EventBus<u32> = EventBus::new(8);
        bus.emit(1);
        let mut rx = bus.subscribe();
        bus.emit(2);
        bus.emit(3);
        assert_eq!(drain(&mut rx), vec![2, 3]);
    }

    #[test]
    fn emit_without_subscribers_is_dropped() {
        let bus: EventBus<&'static str> = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit("nobody listening");
    }

    #[test]
    fn each_subscriber_gets_its_own_stream() {
        let bus: EventBus<u8> = EventBus::new(4);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.emit(7);
        assert_eq!(drain(&mut a), vec![7]);
        assert_eq!(drain(&mut b), vec![7]);
    }
}
