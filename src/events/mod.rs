//! Metrics events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to metrics emitted by the partner controller, the auction
//! loader, slot controllers and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`MetricsEvent`], [`InitResults`] per-attempt records carried by events
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `PartnerAdapterController` (setup, prebid), `AuctionAdLoader`
//!   (load, auction), `AdSlotController` (show, impressions, clicks, rewards, dismissals),
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the listener spawned by `Mediation`, which fans out to `SubscriberSet`.

mod bus;
mod event;
mod metrics;

pub use bus::Bus;
pub use event::{Event, EventKind};
pub use metrics::{InitResults, MetricsEvent};
