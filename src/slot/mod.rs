//! # Ad slots.
//!
//! [`AdSlotController`] owns the load/show life cycle of one ad unit and turns
//! partner callbacks into [`SlotObserver`] calls and metrics events.

mod controller;
mod observer;

pub(crate) use controller::SlotParts;
pub use controller::{AdSlotController, ShowResult};
pub use observer::{FullscreenShowObserver, InitializationStatus, SlotObserver};
