//! Live partner ads, grouped by partner.

use std::collections::HashMap;

use super::adapter::PartnerId;
use super::handle::{AdId, PartnerAdHandle};

/// Ads that were created and not invalidated yet.
///
/// Presence in storage is the liveness guard for late partner callbacks: a
/// load completion for an ad that is no longer stored is discarded.
#[derive(Default)]
pub(crate) struct AdStorage {
    ads: HashMap<PartnerId, HashMap<AdId, PartnerAdHandle>>,
}

impl AdStorage {
    pub(crate) fn insert(&mut self, ad: PartnerAdHandle) {
        self.ads
            .entry(ad.partner_id().clone())
            .or_default()
            .insert(ad.id(), ad);
    }

    pub(crate) fn remove(&mut self, ad: &PartnerAdHandle) -> Option<PartnerAdHandle> {
        let partner = self.ads.get_mut(ad.partner_id())?;
        let removed = partner.remove(&ad.id());
        if partner.is_empty() {
            self.ads.remove(ad.partner_id());
        }
        removed
    }

    pub(crate) fn contains(&self, ad: &PartnerAdHandle) -> bool {
        self.ads
            .get(ad.partner_id())
            .is_some_and(|partner| partner.contains_key(&ad.id()))
    }

    pub(crate) fn len(&self) -> usize {
        self.ads.values().map(HashMap::len).sum()
    }
}
