//! Ad data model.
//!
//! ## Contents
//! - [`AdFormat`], [`BannerSize`], [`Viewport`] what is loaded and where it is presented
//! - [`LoadRequest`], [`PreBidRequest`], [`PartnerAdLoadRequest`] requests flowing down
//!   the pipeline
//! - [`Bid`] auction output, consumed read-only by the waterfall
//! - [`LoadedAd`] waterfall output, owned by a slot
//!
//! ```text
//! LoadRequest ──► auction ──► [Bid] ──► PartnerAdLoadRequest (one per attempt)
//!                                            │
//!                                            ▼
//!                                  LoadedAd { bid, ad, size, request }
//! ```

mod bid;
mod format;
mod loaded;
mod request;

pub use bid::{Bid, NetworkType, RewardedCallback};
pub use format::{AdFormat, BannerKind, BannerSize, Size, Viewport};
pub use loaded::LoadedAd;
pub use request::{
    LoadId, LoadRequest, MAX_KEYWORD_KEY_LEN, MAX_KEYWORD_VALUE_LEN, PartnerAdLoadRequest,
    PreBidRequest,
};
