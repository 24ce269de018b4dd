//! Stable handles to partner ads and the event sink adapters report through.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock, Weak};

use super::adapter::{PartnerAd, PartnerAdapter, PartnerId};
use crate::ads::PartnerAdLoadRequest;
use crate::error::PartnerError;

static AD_IDS: AtomicU64 = AtomicU64::new(1);

/// Identity of one partner ad, independent of its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AdId(u64);

impl AdId {
    pub(crate) fn next() -> Self {
        AdId(AD_IDS.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

impl fmt::Display for AdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ad#{}", self.0)
    }
}

/// Shared handle to a partner ad plus the adapter that created it.
///
/// Equality is identity: two handles are equal only if they refer to the same
/// created ad, whatever the ad's contents.
#[derive(Clone)]
pub struct PartnerAdHandle {
    id: AdId,
    partner_id: PartnerId,
    ad: Arc<dyn PartnerAd>,
    adapter: Arc<dyn PartnerAdapter>,
}

impl PartnerAdHandle {
    /// Wraps `ad` under a fresh identity.
    pub fn new(partner_id: PartnerId, ad: Arc<dyn PartnerAd>, adapter: Arc<dyn PartnerAdapter>) -> Self {
        Self::with_id(AdId::next(), partner_id, ad, adapter)
    }

    pub(crate) fn with_id(
        id: AdId,
        partner_id: PartnerId,
        ad: Arc<dyn PartnerAd>,
        adapter: Arc<dyn PartnerAdapter>,
    ) -> Self {
        Self {
            id,
            partner_id,
            ad,
            adapter,
        }
    }

    pub fn id(&self) -> AdId {
        self.id
    }

    pub fn partner_id(&self) -> &PartnerId {
        &self.partner_id
    }

    pub fn ad(&self) -> &Arc<dyn PartnerAd> {
        &self.ad
    }

    pub fn adapter(&self) -> &Arc<dyn PartnerAdapter> {
        &self.adapter
    }

    pub fn request(&self) -> &PartnerAdLoadRequest {
        self.ad.request()
    }
}

impl PartialEq for PartnerAdHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PartnerAdHandle {}

impl fmt::Debug for PartnerAdHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartnerAdHandle")
            .field("id", &self.id)
            .field("partner_id", &self.partner_id)
            .finish()
    }
}

/// Receiver of partner-driven ad life-cycle callbacks.
pub trait PartnerAdDelegate: Send + Sync + 'static {
    fn did_track_impression(&self, ad: &PartnerAdHandle);
    fn did_click(&self, ad: &PartnerAdHandle);
    fn did_reward(&self, ad: &PartnerAdHandle);
    fn did_dismiss(&self, ad: &PartnerAdHandle, error: Option<PartnerError>);
    fn did_expire(&self, ad: &PartnerAdHandle);
}

struct WeakHandle {
    id: AdId,
    partner_id: PartnerId,
    ad: Weak<dyn PartnerAd>,
    adapter: Weak<dyn PartnerAdapter>,
}

/// Event sink given to an adapter when its ad is created.
///
/// Forwards to the load's delegate together with the ad's handle. Events
/// raised after the ad or the delegate is gone are dropped.
#[derive(Clone)]
pub struct PartnerAdEvents {
    id: AdId,
    bound: Arc<OnceLock<WeakHandle>>,
    delegate: Weak<dyn PartnerAdDelegate>,
}

impl PartnerAdEvents {
    pub(crate) fn new(id: AdId, delegate: Weak<dyn PartnerAdDelegate>) -> Self {
        Self {
            id,
            bound: Arc::new(OnceLock::new()),
            delegate,
        }
    }

    /// Sink bound to nothing; every event is dropped. Useful for adapter tests.
    pub fn detached() -> Self {
        struct Nobody;
        impl PartnerAdDelegate for Nobody {
            fn did_track_impression(&self, _: &PartnerAdHandle) {}
            fn did_click(&self, _: &PartnerAdHandle) {}
            fn did_reward(&self, _: &PartnerAdHandle) {}
            fn did_dismiss(&self, _: &PartnerAdHandle, _: Option<PartnerError>) {}
            fn did_expire(&self, _: &PartnerAdHandle) {}
        }
        Self::new(AdId::next(), Weak::<Nobody>::new())
    }

    pub(crate) fn bind(&self, handle: &PartnerAdHandle) {
        let _ = self.bound.set(WeakHandle {
            id: handle.id,
            partner_id: handle.partner_id.clone(),
            ad: Arc::downgrade(&handle.ad),
            adapter: Arc::downgrade(&handle.adapter),
        });
    }

    pub fn ad_id(&self) -> AdId {
        self.id
    }

    pub fn impression(&self) {
        self.forward("impression", |d, h| d.did_track_impression(h));
    }

    pub fn click(&self) {
        self.forward("click", |d, h| d.did_click(h));
    }

    pub fn reward(&self) {
        self.forward("reward", |d, h| d.did_reward(h));
    }

    pub fn dismiss(&self, error: Option<PartnerError>) {
        self.forward("dismiss", move |d, h| d.did_dismiss(h, error));
    }

    pub fn expire(&self) {
        self.forward("expire", |d, h| d.did_expire(h));
    }

    fn forward(&self, what: &'static str, f: impl FnOnce(&dyn PartnerAdDelegate, &PartnerAdHandle)) {
        let handle = self.bound.get().and_then(|weak| {
            Some(PartnerAdHandle::with_id(
                weak.id,
                weak.partner_id.clone(),
                weak.ad.upgrade()?,
                weak.adapter.upgrade()?,
            ))
        });
        match (self.delegate.upgrade(), handle) {
            (Some(delegate), Some(handle)) => f(delegate.as_ref(), &handle),
            _ => tracing::debug!(ad = %self.id, event = what, "dropping partner event for released ad"),
        }
    }
}
