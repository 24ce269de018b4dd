//! Observers a slot reports to.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use crate::ads::LoadedAd;
use crate::error::MediationError;

/// Life-cycle callbacks of a slot's ad. All methods default to no-ops.
///
/// Called on the slot's background context.
pub trait SlotObserver: Send + Sync + 'static {
    fn did_record_impression(&self, _ad: &LoadedAd) {}
    fn did_click(&self, _ad: &LoadedAd) {}
    fn did_reward(&self, _ad: &LoadedAd) {}
    fn did_dismiss(&self, _ad: &LoadedAd, _error: Option<MediationError>) {}
    fn did_expire(&self, _ad: &LoadedAd) {}
}

/// Told when any full-screen ad appears or goes away.
pub trait FullscreenShowObserver: Send + Sync + 'static {
    fn did_show_fullscreen_ad(&self);
    fn did_close_fullscreen_ad(&self);
}

/// Answers whether the engine finished initializing.
pub trait InitializationStatus: Send + Sync + 'static {
    fn is_initialized(&self) -> bool;
}

impl InitializationStatus for AtomicBool {
    fn is_initialized(&self) -> bool {
        self.load(AtomicOrdering::Acquire)
    }
}
