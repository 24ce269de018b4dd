//! # Mediation configuration.
//!
//! Provides [`MediationConfig`], centralized timeouts and switches consumed by the
//! partner controller, the waterfall and slot controllers.
//!
//! Config is passed once, at construction time:
//! `Mediation::builder(config)`. Nothing reads process-wide flags.
//!
//! ## Sentinel values
//! - any timeout of `0s` fires on the next timer tick (effectively "do not wait")
//! - `bus_capacity = 0` is clamped to `1`

use std::time::Duration;

use crate::ads::AdFormat;

/// Global configuration for the mediation engine.
///
/// Defines:
/// - **Load timeouts**: per attempt, split by ad format
/// - **Show timeout**: how long a partner may take to present a full-screen ad
/// - **Fan-out timeouts**: adapter setup and bidder token collection
/// - **Switches**: oversized banner discarding and load rate limiting
/// - **Event system**: bus capacity for metrics delivery
///
/// ## Notes
/// All fields are public for flexibility. Prefer the helper accessors to avoid
/// sprinkling format checks across the codebase.
#[derive(Clone, Debug)]
pub struct MediationConfig {
    /// Time a partner gets to load a full-screen bid before the waterfall moves on.
    pub fullscreen_load_timeout: Duration,

    /// Time a partner gets to load a banner bid before the waterfall moves on.
    pub banner_load_timeout: Duration,

    /// Time a partner gets to present a full-screen ad.
    ///
    /// On expiry the show fails, the partner ad is invalidated and the slot
    /// stops retaining its observer.
    pub show_timeout: Duration,

    /// Upper bound on bidder token collection across all initialized adapters.
    pub prebid_fetch_timeout: Duration,

    /// Upper bound on adapter setup before initialization results are reported.
    ///
    /// Adapters still pending at that point are reported as timed out.
    pub init_metrics_post_timeout: Duration,

    /// Fail banner loads whose delivered creative is larger than requested.
    pub discard_oversized_ads: bool,

    /// Honor load rate limits reported by the auction service.
    pub rate_limiting_enabled: bool,

    /// Capacity of the metrics event bus ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` messages skip
    /// older items. Minimum value is 1 (enforced by Bus).
    pub bus_capacity: usize,
}

impl MediationConfig {
    /// Returns the per-attempt load timeout for `format`.
    #[inline]
    pub fn load_timeout(&self, format: AdFormat) -> Duration {
        if format.is_banner() {
            self.banner_load_timeout
        } else {
            self.fullscreen_load_timeout
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for MediationConfig {
    /// Default configuration:
    ///
    /// - `fullscreen_load_timeout = 30s`
    /// - `banner_load_timeout = 15s`
    /// - `show_timeout = 5s`
    /// - `prebid_fetch_timeout = 5s`
    /// - `init_metrics_post_timeout = 10s`
    /// - `discard_oversized_ads = false`
    /// - `rate_limiting_enabled = true`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            fullscreen_load_timeout: Duration::from_secs(30),
            banner_load_timeout: Duration::from_secs(15),
            show_timeout: Duration::from_secs(5),
            prebid_fetch_timeout: Duration::from_secs(5),
            init_metrics_post_timeout: Duration::from_secs(10),
            discard_oversized_ads: false,
            rate_limiting_enabled: true,
            bus_capacity: 1024,
        }
    }
}
