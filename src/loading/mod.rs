//! # Loading pipeline.
//!
//! - [`LoadRateLimiter`]: per-placement cool-down table.
//! - [`BidFulfillOperation`]: the bid waterfall.
//! - [`AdLoader`] / [`AuctionAdLoader`]: load-result producers used by slots.

mod fulfill;
mod loader;
mod rate_limiter;

pub use fulfill::{BidFulfillOperation, BidFulfillResult, FulfilledBid};
pub use loader::{AdLoadResult, AdLoader, AuctionAdLoader, AuctionResponse, AuctionService};
pub use rate_limiter::{LoadRateLimiter, LoadRateLimiting};
