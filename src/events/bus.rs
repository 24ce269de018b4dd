//! # Metrics bus.
//!
//! Partner, loader and slot code publish [`Event`]s from plain threads (the serial
//! contexts are not async), so the bus is a [`tokio::sync::broadcast`] sender that
//! never awaits. The mediation instance keeps one listener that forwards into the
//! [`SubscriberSet`](crate::SubscriberSet); tests subscribe directly.
//!
//! Events published while nobody listens are gone. A listener that falls behind
//! the ring buffer skips the oldest events and keeps going.

use tokio::sync::broadcast;

use super::event::Event;

/// Cloneable publishing handle shared by every engine component.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Ring buffer of `capacity` events (at least one).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: Event) {
        if self.tx.send(event).is_err() {
            tracing::trace!("metrics event published with no listener");
        }
    }

    /// Receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn test_publish_reaches_existing_receivers_only() {
        let bus = Bus::new(4);
        bus.publish(Event::new(EventKind::Click));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::Reward));

        let ev = rx.try_recv().expect("event");
        assert_eq!(ev.kind, EventKind::Reward);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let bus = Bus::new(0);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::Click));
        assert!(rx.try_recv().is_ok());
    }
}
