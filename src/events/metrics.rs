//! Per-attempt metrics records carried by [`Event`](super::Event)s.

use std::time::{Duration, Instant};

use crate::ads::{Bid, NetworkType};
use crate::error::MediationError;
use crate::partners::{PartnerId, PartnerInfo};

/// One partner attempt: setup, token fetch or bid load.
#[derive(Debug, Clone)]
pub struct MetricsEvent {
    pub start: Instant,
    pub end: Instant,
    pub partner_id: PartnerId,
    pub partner_placement: Option<String>,
    /// `None` on success.
    pub error: Option<MediationError>,
    pub network_type: Option<NetworkType>,
    pub line_item_id: Option<String>,
    pub partner_sdk_version: Option<String>,
    pub adapter_version: Option<String>,
}

impl MetricsEvent {
    /// Record ending now.
    pub fn new(start: Instant, partner_id: PartnerId, error: Option<MediationError>) -> Self {
        Self {
            start,
            end: Instant::now(),
            partner_id,
            partner_placement: None,
            error,
            network_type: None,
            line_item_id: None,
            partner_sdk_version: None,
            adapter_version: None,
        }
    }

    /// Record of one waterfall attempt for `bid`.
    pub fn for_bid(bid: &Bid, start: Instant, error: Option<MediationError>) -> Self {
        Self {
            partner_placement: Some(bid.partner_placement.clone()),
            network_type: Some(bid.network_type()),
            line_item_id: bid.line_item_id.clone(),
            ..Self::new(start, bid.partner_id.clone(), error)
        }
    }

    /// Record of one adapter setup.
    pub fn for_adapter(info: &PartnerInfo, start: Instant, error: Option<MediationError>) -> Self {
        Self {
            partner_sdk_version: Some(info.partner_sdk_version.clone()),
            adapter_version: Some(info.adapter_version.clone()),
            ..Self::new(start, info.partner_id.clone(), error)
        }
    }

    #[inline]
    pub fn duration(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of adapter setup, reported once the setup timeout boundary is reached.
#[derive(Debug, Clone, Default)]
pub struct InitResults {
    /// Adapters skipped on request.
    pub skipped: Vec<PartnerId>,
    pub succeeded: Vec<MetricsEvent>,
    /// Every record carrying an error, skipped adapters included.
    pub failed: Vec<MetricsEvent>,
    /// Adapters still setting up at the boundary (reported as timed out afterwards).
    pub in_progress: Vec<PartnerId>,
}
