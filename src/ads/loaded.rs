use std::collections::HashMap;

use super::bid::Bid;
use super::format::BannerSize;
use super::request::LoadRequest;
use crate::partners::PartnerAdHandle;

/// Winning bid, the partner creative that fulfilled it and the request it answers.
///
/// Owned by a slot while loaded, then while showing; the partner ad is
/// invalidated when the slot lets go of it.
#[derive(Debug, Clone)]
pub struct LoadedAd {
    pub bid: Bid,
    pub ad: PartnerAdHandle,
    /// Delivered banner size, `None` for full-screen formats.
    pub size: Option<BannerSize>,
    pub request: LoadRequest,
    /// Public summary of the winning bid (`auction_id`, `partner_id`, `price`, `line_item_id`).
    pub bid_info: HashMap<String, String>,
}

impl LoadedAd {
    pub fn new(bid: Bid, ad: PartnerAdHandle, size: Option<BannerSize>, request: LoadRequest) -> Self {
        let mut bid_info = HashMap::new();
        bid_info.insert("auction_id".to_string(), bid.auction_id.to_string());
        bid_info.insert("partner_id".to_string(), bid.partner_id.to_string());
        if let Some(price) = bid.price {
            bid_info.insert("price".to_string(), price.to_string());
        }
        if let Some(line_item) = &bid.line_item_id {
            bid_info.insert("line_item_id".to_string(), line_item.clone());
        }
        Self {
            bid,
            ad,
            size,
            request,
            bid_info,
        }
    }
}
