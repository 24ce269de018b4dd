//! # Metrics subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and
//! the built-in [`LogWriter`] for handling events broadcast through the
//! [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   AdSlotController ── publish(Event) ──► Bus ──► listener ──► SubscriberSet::emit_arc
//!                                                                    │
//!                                                       ┌────────────┼────────────┐
//!                                                       ▼            ▼            ▼
//!                                                   LogWriter   MetricsSink    Custom
//! ```

mod set;
mod subscribe;

#[cfg(feature = "logging")]
mod log;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
