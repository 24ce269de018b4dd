//! # Metrics fan-out.
//!
//! [`SubscriberSet`] gives every [`Subscribe`] implementation its own bounded
//! queue and worker task, so a slow metrics sink never stalls the engine or the
//! other sinks.
//!
//! ```text
//! emit ──┬─► [queue "audit"]  ──► worker ──► audit.on_event
//!        ├─► [queue "log"]    ──► worker ──► log.on_event
//!        └─► [queue full]     ──► dropped ──► SubscriberOverflow on the bus
//! ```
//!
//! ## Rules
//! - A sink sees events in publication order; sinks are not ordered against each other.
//! - `emit` never waits: a full queue drops the event for that sink only.
//! - A panicking `on_event` is reported as `SubscriberPanicked`; its worker keeps going.
//! - Overflow notices are never re-reported, so a stuck sink cannot flood the bus.

use std::sync::Arc;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::dispatch::panic_message;
use crate::events::{Bus, Event};
use crate::subscribers::Subscribe;

struct Sink {
    name: &'static str,
    queue: mpsc::Sender<Arc<Event>>,
}

/// Per-sink queues and workers for metrics events.
pub struct SubscriberSet {
    sinks: Vec<Sink>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber on `runtime`.
    ///
    /// Queue capacity comes from [`Subscribe::queue_capacity`] (at least 1).
    /// Workers stop once the set is dropped.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus, runtime: &Handle) -> Self {
        let sinks = subs
            .into_iter()
            .map(|sub| Sink {
                name: sub.name(),
                queue: spawn_worker(sub, bus.clone(), runtime),
            })
            .collect();
        Self { sinks, bus }
    }

    /// Queues a shared event for every sink.
    pub fn emit_arc(&self, event: Arc<Event>) {
        let report = !event.is_subscriber_overflow();
        for sink in &self.sinks {
            let reason = match sink.queue.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(TrySendError::Full(_)) => "full",
                Err(TrySendError::Closed(_)) => "closed",
            };
            tracing::warn!(subscriber = sink.name, reason, kind = ?event.kind, "metrics event dropped");
            if report {
                self.bus.publish(Event::subscriber_overflow(sink.name, reason));
            }
        }
    }

    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }
}

fn spawn_worker(sub: Arc<dyn Subscribe>, bus: Bus, runtime: &Handle) -> mpsc::Sender<Arc<Event>> {
    let (tx, mut rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));
    drop(runtime.spawn(async move {
        while let Some(event) = rx.recv().await {
            let delivered = std::panic::AssertUnwindSafe(sub.on_event(&event)).catch_unwind().await;
            if let Err(payload) = delivered {
                let info = panic_message(payload.as_ref());
                tracing::error!(subscriber = sub.name(), panic = %info, "metrics subscriber panicked");
                bus.publish(Event::subscriber_panicked(sub.name(), info));
            }
        }
        tracing::trace!(subscriber = sub.name(), "metrics worker stopped");
    }));
    tx
}
