use std::collections::HashMap;
use std::sync::Arc;

use super::format::Size;
use crate::partners::PartnerId;

/// How the bid was won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkType {
    /// Real-time bidding.
    Bidding,
    /// Traditional line item.
    Mediation,
}

/// Server-to-server notification sent when the user earns a reward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardedCallback {
    pub url: String,
    pub method: String,
    pub body: Option<String>,
    pub max_retries: u32,
}

/// One partner's candidate to fulfill a load, produced by the auction.
///
/// Bids are never mutated after the auction returns them.
#[derive(Debug, Clone)]
pub struct Bid {
    /// Unique within its auction.
    pub id: Arc<str>,
    pub partner_id: PartnerId,
    pub partner_placement: String,
    /// Creative markup. `None` for non-programmatic line items.
    pub adm: Option<String>,
    pub partner_details: HashMap<String, String>,
    pub line_item_id: Option<String>,
    pub price: Option<f64>,
    /// Shared by every bid of the same auction.
    pub auction_id: Arc<str>,
    /// Creative size, when the auction knows it.
    pub size: Option<Size>,
    pub rewarded_callback: Option<RewardedCallback>,
}

impl Bid {
    /// Minimal bid; the remaining fields default to empty.
    pub fn new(
        id: impl Into<Arc<str>>,
        partner_id: impl Into<PartnerId>,
        partner_placement: impl Into<String>,
        auction_id: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            id: id.into(),
            partner_id: partner_id.into(),
            partner_placement: partner_placement.into(),
            adm: None,
            partner_details: HashMap::new(),
            line_item_id: None,
            price: None,
            auction_id: auction_id.into(),
            size: None,
            rewarded_callback: None,
        }
    }

    pub fn network_type(&self) -> NetworkType {
        if self.line_item_id.is_some() {
            NetworkType::Mediation
        } else {
            NetworkType::Bidding
        }
    }
}
