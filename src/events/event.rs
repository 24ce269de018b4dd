//! # Metrics events emitted by the mediation engine.
//!
//! Kinds fall into setup (adapter initialization), loading (bidder tokens,
//! waterfall attempts, auction outcome), the ad life cycle (show, impression,
//! click, reward, expiration, dismissal) and metrics plumbing (sink overflow
//! and panics). [`Event`] carries the placement, partner, error and per-attempt
//! records relevant to its kind.
//!
//! Events from different contexts can reach a sink interleaved; sort by `seq`
//! when publication order matters.
//!
//! ```rust
//! use adflow::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::Click)
//!     .with_placement("startup")
//!     .with_partner("alpha");
//!
//! assert_eq!(ev.kind, EventKind::Click);
//! assert_eq!(ev.placement.as_deref(), Some("startup"));
//! assert_eq!(ev.partner.as_deref(), Some("alpha"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use super::metrics::{InitResults, MetricsEvent};
use crate::ads::{AdFormat, LoadedAd, RewardedCallback};
use crate::error::MediationError;

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of metrics events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Setup events ===
    /// Adapter setup finished (or reached its timeout).
    ///
    /// Sets:
    /// - `records`: one record per adapter (success, failure, skipped, timed out)
    Initialization,

    /// Aggregated setup results at the timeout boundary.
    ///
    /// Sets:
    /// - `init_results`
    InitResults,

    // === Load events ===
    /// Bidder tokens collected.
    ///
    /// Sets:
    /// - `placement`, `load_id`
    /// - `records`: one record per adapter that answered in time
    Prebid,

    /// Waterfall finished.
    ///
    /// Sets:
    /// - `placement`, `load_id`, `auction_id`, `format`
    /// - `records`: one record per attempted bid
    /// - `error`: terminal load error, if any
    Load,

    /// Auction winner loaded.
    ///
    /// Sets:
    /// - `placement`, `load_id`, `auction_id`, `partner`
    AuctionCompleted,

    // === Ad life-cycle events ===
    /// Full-screen show finished.
    ///
    /// Sets:
    /// - `placement`, `load_id`, `auction_id`, `partner`, `format`
    /// - `duration`: time from show start to partner answer or timeout
    /// - `error`: show failure, if any
    Show,

    /// Impression counted by mediation (show succeeded or banner marked shown).
    MediationImpression,

    /// Impression reported by the partner.
    PartnerImpression,

    Click,

    Reward,

    /// Server-side reward notification requested.
    ///
    /// Sets:
    /// - `rewarded_callback`, `custom_data`
    RewardedCallback,

    Expiration,

    /// Full-screen ad dismissed.
    ///
    /// Sets:
    /// - `error`: dismissal error, if any
    Dismiss,

    // === Metrics plumbing ===
    /// A sink's `on_event` panicked; `partner` names the sink, `reason` holds the message.
    SubscriberPanicked,

    /// A sink missed an event; `reason` says whether its queue was full or closed.
    SubscriberOverflow,
}

/// One metrics record. Which optional fields are filled depends on `kind`.
#[derive(Clone, Debug)]
pub struct Event {
    /// Process-wide publication counter.
    pub seq: u64,
    pub at: SystemTime,
    pub kind: EventKind,

    /// Mediation placement.
    pub placement: Option<Arc<str>>,
    pub load_id: Option<Arc<str>>,
    pub auction_id: Option<Arc<str>>,
    /// Partner (or subscriber, for subscriber events) name.
    pub partner: Option<Arc<str>>,
    pub format: Option<AdFormat>,
    pub duration: Option<Duration>,
    pub error: Option<MediationError>,
    /// Human-readable reason (overflow details, panic messages).
    pub reason: Option<Arc<str>>,
    /// Per-attempt records.
    pub records: Arc<[MetricsEvent]>,
    pub init_results: Option<Arc<InitResults>>,
    pub rewarded_callback: Option<RewardedCallback>,
    pub custom_data: Option<Arc<str>>,
}

impl Event {
    /// Bare event stamped with the next `seq` and the current time.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            placement: None,
            load_id: None,
            auction_id: None,
            partner: None,
            format: None,
            duration: None,
            error: None,
            reason: None,
            records: Arc::from(Vec::new()),
            init_results: None,
            rewarded_callback: None,
            custom_data: None,
        }
    }

    /// Event about `ad`: placement, load id, auction, partner and format.
    pub fn for_ad(kind: EventKind, ad: &LoadedAd) -> Self {
        Event::new(kind)
            .with_placement(ad.request.placement.clone())
            .with_load_id(ad.request.load_id.as_str())
            .with_auction_id(ad.bid.auction_id.clone())
            .with_partner(ad.bid.partner_id.clone())
            .with_format(ad.request.format)
    }

    #[inline]
    pub fn with_placement(mut self, placement: impl Into<Arc<str>>) -> Self {
        self.placement = Some(placement.into());
        self
    }

    #[inline]
    pub fn with_load_id(mut self, load_id: impl Into<Arc<str>>) -> Self {
        self.load_id = Some(load_id.into());
        self
    }

    #[inline]
    pub fn with_auction_id(mut self, auction_id: impl Into<Arc<str>>) -> Self {
        self.auction_id = Some(auction_id.into());
        self
    }

    #[inline]
    pub fn with_partner(mut self, partner: impl Into<Arc<str>>) -> Self {
        self.partner = Some(partner.into());
        self
    }

    #[inline]
    pub fn with_format(mut self, format: AdFormat) -> Self {
        self.format = Some(format);
        self
    }

    #[inline]
    pub fn with_duration(mut self, d: Duration) -> Self {
        self.duration = Some(d);
        self
    }

    #[inline]
    pub fn with_error(mut self, error: Option<MediationError>) -> Self {
        self.error = error;
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_records(mut self, records: Vec<MetricsEvent>) -> Self {
        self.records = Arc::from(records);
        self
    }

    #[inline]
    pub fn with_init_results(mut self, results: InitResults) -> Self {
        self.init_results = Some(Arc::new(results));
        self
    }

    #[inline]
    pub fn with_rewarded_callback(mut self, callback: RewardedCallback, custom_data: Option<Arc<str>>) -> Self {
        self.rewarded_callback = Some(callback);
        self.custom_data = custom_data;
        self
    }

    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_partner(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_partner(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}
