//! # Partner adapters and the controller that routes to them.
//!
//! - [`PartnerAdapter`] / [`PartnerAd`]: contracts implemented per ad network.
//! - [`PartnerAdHandle`]: identity-compared handle to a created ad.
//! - [`PartnerAdEvents`] / [`PartnerAdDelegate`]: partner-driven life-cycle callbacks.
//! - [`PartnerController`] / [`PartnerAdapterController`]: setup, token fetch,
//!   load, show and invalidate routing.
//! - [`ConsentSettings`]: privacy state replayed to adapters.
//! - [`AdapterFactory`]: adapter instances by name.

mod adapter;
mod consent;
mod controller;
mod factory;
mod handle;
mod storage;

pub use adapter::{
    BidderTokens, Completion, PartnerAd, PartnerAdapter, PartnerConfiguration, PartnerId, PartnerInfo,
};
pub use consent::{ConsentObserver, ConsentSettings};
pub use controller::{CancelAction, PartnerAdapterController, PartnerController};
pub use factory::AdapterFactory;
pub use handle::{AdId, PartnerAdDelegate, PartnerAdEvents, PartnerAdHandle};
