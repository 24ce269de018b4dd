//! # Metrics sink contract.
//!
//! Load attempts, impressions, clicks and initialization results all end up as
//! [`Event`]s. A host app ships them to its analytics backend by implementing
//! [`Subscribe`] and passing it to
//! [`MediationBuilder::with_subscribers`](crate::MediationBuilder::with_subscribers).
//!
//! ```rust
//! use adflow::{Event, EventKind, Subscribe};
//!
//! struct LoadAudit;
//!
//! #[async_trait::async_trait]
//! impl Subscribe for LoadAudit {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::Load {
//!             // ship ev.records somewhere
//!         }
//!     }
//!     fn name(&self) -> &'static str { "load-audit" }
//!     fn queue_capacity(&self) -> usize { 256 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// A metrics sink.
///
/// `on_event` runs on the sink's own worker task on the timer runtime, one event
/// at a time. Blocking there only delays this sink.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    async fn on_event(&self, event: &Event);

    /// Label used in overflow and panic reports.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Events buffered for this sink before new ones are dropped.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
