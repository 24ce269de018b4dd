//! # LogWriter: metrics events rendered through `tracing`
//!
//! A minimal subscriber that logs incoming [`Event`]s under the `adflow::metrics`
//! target. Use it for tests, demos, or as a template for real sinks.
//!
//! ## Example output
//! ```text
//! INFO adflow::metrics: [load] placement="startup" auction="a-1" attempts=3 error=None
//! INFO adflow::metrics: [show] placement="startup" partner="alpha" duration=412ms error=None
//! WARN adflow::metrics: [subscriber-overflow] subscriber="audit" reason="full"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let err = e.error.as_ref().map(|err| err.as_label());
        match e.kind {
            EventKind::Initialization => {
                let failed = e.records.iter().filter(|r| !r.is_success()).count();
                tracing::info!(target: "adflow::metrics", "[initialization] adapters={} failed={}", e.records.len(), failed);
            }
            EventKind::InitResults => {
                if let Some(r) = &e.init_results {
                    tracing::info!(
                        target: "adflow::metrics",
                        "[init-results] succeeded={} failed={} skipped={:?} in_progress={:?}",
                        r.succeeded.len(),
                        r.failed.len(),
                        r.skipped,
                        r.in_progress,
                    );
                }
            }
            EventKind::Prebid => {
                tracing::info!(target: "adflow::metrics", "[prebid] placement={:?} partners={}", e.placement, e.records.len());
            }
            EventKind::Load => {
                tracing::info!(
                    target: "adflow::metrics",
                    "[load] placement={:?} auction={:?} attempts={} error={:?}",
                    e.placement,
                    e.auction_id,
                    e.records.len(),
                    err,
                );
            }
            EventKind::AuctionCompleted => {
                tracing::info!(target: "adflow::metrics", "[auction-completed] placement={:?} winner={:?}", e.placement, e.partner);
            }
            EventKind::Show => {
                tracing::info!(
                    target: "adflow::metrics",
                    "[show] placement={:?} partner={:?} duration={:?} error={:?}",
                    e.placement,
                    e.partner,
                    e.duration,
                    err,
                );
            }
            EventKind::MediationImpression | EventKind::PartnerImpression => {
                tracing::info!(target: "adflow::metrics", "[impression] kind={:?} placement={:?} partner={:?}", e.kind, e.placement, e.partner);
            }
            EventKind::Click | EventKind::Reward | EventKind::Expiration => {
                tracing::info!(target: "adflow::metrics", "[{:?}] placement={:?} partner={:?}", e.kind, e.placement, e.partner);
            }
            EventKind::RewardedCallback => {
                tracing::info!(
                    target: "adflow::metrics",
                    "[rewarded-callback] url={:?} custom_data={:?}",
                    e.rewarded_callback.as_ref().map(|c| c.url.as_str()),
                    e.custom_data,
                );
            }
            EventKind::Dismiss => {
                tracing::info!(target: "adflow::metrics", "[dismiss] placement={:?} error={:?}", e.placement, err);
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(target: "adflow::metrics", "[subscriber-overflow] subscriber={:?} reason={:?}", e.partner, e.reason);
            }
            EventKind::SubscriberPanicked => {
                tracing::warn!(
                    target: "adflow::metrics",
                    "[subscriber-panicked] subscriber={} info={}",
                    e.partner.as_deref().unwrap_or("unknown"),
                    e.reason.as_deref().unwrap_or("unknown"),
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
