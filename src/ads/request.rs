//! Load, prebid and per-partner load requests.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rand::Rng;

use super::bid::Bid;
use super::format::{AdFormat, BannerSize};
use crate::partners::PartnerId;

/// Longest keyword key forwarded to partners.
pub const MAX_KEYWORD_KEY_LEN: usize = 64;
/// Longest keyword value forwarded to partners.
pub const MAX_KEYWORD_VALUE_LEN: usize = 256;

/// Identifier generated for every load attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadId(Arc<str>);

impl LoadId {
    /// Random 128-bit id rendered as a hyphenated hex string.
    pub fn generate() -> Self {
        let v: u128 = rand::rng().random();
        let hex = format!("{v:032x}");
        Self(Arc::from(format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LoadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Description of one load attempt.
///
/// Immutable once built; a fresh [`LoadId`] is generated by [`LoadRequest::new`].
#[derive(Debug, Clone)]
pub struct LoadRequest {
    /// Mediation placement name.
    pub placement: Arc<str>,
    pub format: AdFormat,
    /// Requested banner size. `None` for full-screen formats.
    pub size: Option<BannerSize>,
    /// Publisher keywords, already filtered to the forwarded limits.
    pub keywords: HashMap<String, String>,
    pub load_id: LoadId,
    /// Identifier of the queue that issued this load, if any.
    pub queue_id: Option<Arc<str>>,
}

impl LoadRequest {
    pub fn new(placement: impl Into<Arc<str>>, format: AdFormat) -> Self {
        Self {
            placement: placement.into(),
            format,
            size: None,
            keywords: HashMap::new(),
            load_id: LoadId::generate(),
            queue_id: None,
        }
    }

    #[inline]
    pub fn with_size(mut self, size: BannerSize) -> Self {
        self.size = Some(size);
        self
    }

    /// Attaches keywords, dropping entries whose key or value is too long.
    pub fn with_keywords(mut self, keywords: HashMap<String, String>) -> Self {
        self.keywords = keywords
            .into_iter()
            .filter(|(key, value)| {
                let keep = key.chars().count() <= MAX_KEYWORD_KEY_LEN
                    && value.chars().count() <= MAX_KEYWORD_VALUE_LEN;
                if !keep {
                    tracing::warn!(keyword = %key, "dropping keyword exceeding length limits");
                }
                keep
            })
            .collect();
        self
    }

    #[inline]
    pub fn with_queue_id(mut self, queue_id: impl Into<Arc<str>>) -> Self {
        self.queue_id = Some(queue_id.into());
        self
    }
}

/// Bidder token request fanned out to every initialized adapter.
#[derive(Debug, Clone)]
pub struct PreBidRequest {
    pub placement: Arc<str>,
    pub format: AdFormat,
    pub size: Option<BannerSize>,
    pub load_id: LoadId,
    pub keywords: HashMap<String, String>,
}

impl From<&LoadRequest> for PreBidRequest {
    fn from(request: &LoadRequest) -> Self {
        Self {
            placement: request.placement.clone(),
            format: request.format,
            size: request.size,
            load_id: request.load_id.clone(),
            keywords: request.keywords.clone(),
        }
    }
}

/// Request handed to one partner to load the creative of one bid.
#[derive(Debug, Clone)]
pub struct PartnerAdLoadRequest {
    pub partner_id: PartnerId,
    /// Mediation placement name.
    pub placement: Arc<str>,
    pub partner_placement: String,
    pub banner_size: Option<BannerSize>,
    pub adm: Option<String>,
    pub keywords: HashMap<String, String>,
    pub partner_settings: HashMap<String, String>,
    pub load_id: LoadId,
    pub auction_id: Arc<str>,
    pub format: AdFormat,
}

impl PartnerAdLoadRequest {
    /// Builds the partner request for `bid`.
    ///
    /// The banner size falls back to the requested size when the bid carries none.
    pub fn for_bid(bid: &Bid, request: &LoadRequest) -> Self {
        Self {
            partner_id: bid.partner_id.clone(),
            placement: request.placement.clone(),
            partner_placement: bid.partner_placement.clone(),
            banner_size: request.size.map(|requested| BannerSize {
                size: bid.size.unwrap_or(requested.size),
                kind: requested.kind,
            }),
            adm: bid.adm.clone(),
            keywords: request.keywords.clone(),
            partner_settings: bid.partner_details.clone(),
            load_id: request.load_id.clone(),
            auction_id: bid.auction_id.clone(),
            format: request.format,
        }
    }
}
