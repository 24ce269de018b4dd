//! # Ad slot controller.
//!
//! One [`AdSlotController`] drives one ad unit through
//! `empty → loading → loaded → showing → empty`. Every state change happens on
//! the background context.
//!
//! ## Rules
//! - A load while another is in flight is dropped: its completion never runs.
//! - A load while an ad is loaded returns that ad without a new auction.
//! - `show_ad` moves the ad from `loaded` to `showing` before the partner is
//!   called, so a second show cannot reuse it.
//! - The observer is held strongly while an ad is showing and released once,
//!   on dismiss or show failure.
//!
//! ```text
//! show_ad ──► loaded → showing, retain observer, arm show timeout
//!               ├─ partner ok first ──► impression, fullscreen observer, Ok
//!               ├─ partner err first ─► invalidate, release observer, Err
//!               └─ timeout first ─────► invalidate, release observer, ShowFailureTimeout
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;

use super::observer::{FullscreenShowObserver, InitializationStatus, SlotObserver};
use crate::ads::{LoadRequest, LoadedAd, Viewport};
use crate::core::MediationConfig;
use crate::dispatch::{Context, DispatchTask, Dispatcher};
use crate::error::{ErrorCode, MediationError, PartnerError};
use crate::events::{Bus, Event, EventKind};
use crate::loading::{AdLoadResult, AdLoader};
use crate::partners::{Completion, PartnerAdDelegate, PartnerAdHandle, PartnerController};

/// Outcome of [`AdSlotController::show_ad`].
pub type ShowResult = Result<(), MediationError>;

static SHOW_IDS: AtomicU64 = AtomicU64::new(1);

struct ShowAttempt {
    id: u64,
    ad: Arc<LoadedAd>,
    start: Instant,
    timeout: DispatchTask,
    completion: Completion<ShowResult>,
}

#[derive(Default)]
struct SlotState {
    pending_load: Option<Completion<AdLoadResult>>,
    loaded: Option<Arc<LoadedAd>>,
    showing: Option<Arc<LoadedAd>>,
    show: Option<ShowAttempt>,
    observer: Option<Weak<dyn SlotObserver>>,
    retained_observer: Option<Arc<dyn SlotObserver>>,
    custom_data: Option<Arc<str>>,
}

impl SlotState {
    fn observer(&self) -> Option<Arc<dyn SlotObserver>> {
        self.retained_observer
            .clone()
            .or_else(|| self.observer.as_ref().and_then(Weak::upgrade))
    }

    fn find(&self, ad: &PartnerAdHandle) -> Option<Arc<LoadedAd>> {
        [&self.showing, &self.loaded]
            .into_iter()
            .flatten()
            .find(|candidate| candidate.ad == *ad)
            .cloned()
    }
}

/// Collaborators a slot is built from.
pub(crate) struct SlotParts {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) config: MediationConfig,
    pub(crate) bus: Bus,
    pub(crate) loader: Arc<dyn AdLoader>,
    pub(crate) partners: Arc<dyn PartnerController>,
    pub(crate) status: Arc<dyn InitializationStatus>,
    pub(crate) fullscreen_observer: Option<Arc<dyn FullscreenShowObserver>>,
}

struct Slot {
    me: Weak<Slot>,
    parts: SlotParts,
    state: Mutex<SlotState>,
}

/// Handle to one ad slot. Cheap to clone; the loaded ad is invalidated when the
/// last clone is dropped.
#[derive(Clone)]
pub struct AdSlotController {
    slot: Arc<Slot>,
}

impl AdSlotController {
    pub(crate) fn new(parts: SlotParts) -> Self {
        Self {
            slot: Arc::new_cyclic(|me| Slot {
                me: me.clone(),
                parts,
                state: Mutex::new(SlotState::default()),
            }),
        }
    }

    /// Loads an ad, or returns the one already loaded.
    ///
    /// ### Errors (through `completion`)
    /// - `LoadFailureMediationNotInitialized` before initialization completed
    /// - `LoadFailureInvalidBannerSize` for a banner size outside the allowed range
    /// - whatever the loader reports
    ///
    /// ### Notes
    /// While a load is in flight further calls are dropped without invoking their completion.
    pub fn load_ad(
        &self,
        request: LoadRequest,
        viewport: Option<Viewport>,
        observer: Weak<dyn SlotObserver>,
        completion: impl FnOnce(AdLoadResult) + Send + 'static,
    ) {
        let slot = Arc::clone(&self.slot);
        self.slot.parts.dispatcher.dispatch(Context::Background, move || {
            slot.load(request, viewport, observer, Box::new(completion));
        });
    }

    /// Shows the loaded full-screen ad.
    pub fn show_ad(&self, viewport: Viewport, completion: impl FnOnce(ShowResult) + Send + 'static) {
        let slot = Arc::clone(&self.slot);
        self.slot.parts.dispatcher.dispatch(Context::Background, move || {
            slot.show(viewport, Box::new(completion));
        });
    }

    /// Banner flow: the caller displayed the loaded ad itself.
    pub fn mark_loaded_ad_as_shown(&self) {
        let slot = Arc::clone(&self.slot);
        self.slot.parts.dispatcher.dispatch(Context::Background, move || {
            let ad = {
                let mut state = slot.state.lock();
                let Some(ad) = state.loaded.take() else {
                    drop(state);
                    tracing::warn!("no loaded ad to mark as shown");
                    return;
                };
                state.showing = Some(Arc::clone(&ad));
                ad
            };
            slot.record_impression(&ad);
        });
    }

    /// Drops the loaded ad. Always succeeds; invalidation failures are only logged.
    pub fn clear_loaded_ad(&self) {
        let slot = Arc::clone(&self.slot);
        self.slot.parts.dispatcher.dispatch(Context::Background, move || {
            let loaded = slot.state.lock().loaded.take();
            if let Some(ad) = loaded {
                slot.invalidate(&ad, Box::new(|_| {}));
            }
        });
    }

    /// Drops the showing ad and reports the partner's invalidate result.
    pub fn clear_showing_ad(&self, completion: impl FnOnce(Result<(), MediationError>) + Send + 'static) {
        let slot = Arc::clone(&self.slot);
        self.slot.parts.dispatcher.dispatch(Context::Background, move || {
            let showing = {
                let mut state = slot.state.lock();
                state.retained_observer = None;
                state.showing.take()
            };
            match showing {
                Some(ad) => slot.invalidate(&ad, Box::new(completion)),
                None => completion(Ok(())),
            }
        });
    }

    /// Runs the expiration path for the loaded ad as if its partner had reported it.
    pub fn force_internal_expiration(&self) {
        let slot = Arc::clone(&self.slot);
        self.slot.parts.dispatcher.dispatch(Context::Background, move || {
            let loaded = slot.state.lock().loaded.clone();
            match loaded {
                Some(ad) => slot.expired(&ad.ad),
                None => tracing::debug!("no loaded ad to expire"),
            }
        });
    }

    /// Whether an ad is loaded and not shown yet.
    pub fn is_ready_to_show(&self) -> bool {
        self.slot.state.lock().loaded.is_some()
    }

    /// Sent along with the rewarded callback event.
    pub fn set_custom_data(&self, custom_data: Option<String>) {
        self.slot.state.lock().custom_data = custom_data.map(Arc::from);
    }

    pub fn custom_data(&self) -> Option<Arc<str>> {
        self.slot.state.lock().custom_data.clone()
    }

    /// The loaded ad, if any.
    pub fn loaded_ad(&self) -> Option<Arc<LoadedAd>> {
        self.slot.state.lock().loaded.clone()
    }

    /// The showing ad, if any.
    pub fn showing_ad(&self) -> Option<Arc<LoadedAd>> {
        self.slot.state.lock().showing.clone()
    }
}

impl Slot {
    /// Background context only.
    fn load(
        self: &Arc<Self>,
        request: LoadRequest,
        viewport: Option<Viewport>,
        observer: Weak<dyn SlotObserver>,
        completion: Completion<AdLoadResult>,
    ) {
        if !self.parts.status.is_initialized() {
            tracing::error!(placement = %request.placement, "load requested before initialization");
            completion(Err(MediationError::new(ErrorCode::LoadFailureMediationNotInitialized)));
            return;
        }
        let mut state = self.state.lock();
        if state.pending_load.is_some() {
            tracing::warn!(placement = %request.placement, "load already in progress; dropping duplicate");
            return;
        }
        if let Some(loaded) = state.loaded.clone() {
            drop(state);
            tracing::info!(placement = %request.placement, "ad already loaded");
            completion(Ok(loaded));
            return;
        }
        if request.format.is_banner() && request.size.is_some_and(|size| !size.is_valid()) {
            drop(state);
            tracing::error!(placement = %request.placement, size = ?request.size, "invalid banner size");
            completion(Err(MediationError::new(ErrorCode::LoadFailureInvalidBannerSize)));
            return;
        }
        state.observer = Some(observer);
        state.pending_load = Some(completion);
        drop(state);

        tracing::debug!(placement = %request.placement, load_id = %request.load_id, "loading ad");
        let slot = Arc::clone(self);
        let weak: Weak<Slot> = Arc::downgrade(self);
        let delegate: Weak<dyn PartnerAdDelegate> = weak;
        self.parts.loader.load(
            request,
            viewport,
            delegate,
            Box::new(move |result| {
                let dispatcher = slot.parts.dispatcher.clone();
                dispatcher.dispatch(Context::Background, move || slot.load_finished(result));
            }),
        );
    }

    /// Background context only.
    fn load_finished(&self, result: AdLoadResult) {
        let completion = {
            let mut state = self.state.lock();
            if let Ok(ad) = &result {
                state.loaded = Some(Arc::clone(ad));
            }
            state.pending_load.take()
        };
        match &result {
            Ok(ad) => tracing::info!(placement = %ad.request.placement, partner = %ad.bid.partner_id, "ad loaded"),
            Err(error) => tracing::error!(error = %error, "ad load failed"),
        }
        if let Some(completion) = completion {
            completion(result);
        }
    }

    /// Background context only.
    fn show(self: &Arc<Self>, viewport: Viewport, completion: Completion<ShowResult>) {
        let mut state = self.state.lock();
        let banner = match &state.loaded {
            Some(ad) => ad.request.format.is_banner(),
            None => {
                drop(state);
                tracing::error!("show requested without a loaded ad");
                completion(Err(MediationError::new(ErrorCode::ShowFailureAdNotReady)));
                return;
            }
        };
        if banner {
            drop(state);
            tracing::error!("banner ads are displayed by the caller; use mark_loaded_ad_as_shown");
            completion(Err(MediationError::new(ErrorCode::ShowFailureWrongResourceType)));
            return;
        }
        let Some(ad) = state.loaded.take() else {
            return;
        };

        let id = SHOW_IDS.fetch_add(1, AtomicOrdering::Relaxed);
        let slot = Arc::clone(self);
        let timeout = self
            .parts
            .dispatcher
            .schedule(Context::Background, self.parts.config.show_timeout, move || {
                slot.show_timed_out(id);
            });
        state.showing = Some(Arc::clone(&ad));
        state.retained_observer = state.observer();
        state.show = Some(ShowAttempt {
            id,
            ad: Arc::clone(&ad),
            start: Instant::now(),
            timeout,
            completion,
        });
        drop(state);

        tracing::debug!(placement = %ad.request.placement, partner = %ad.bid.partner_id, "showing ad");
        let slot = Arc::clone(self);
        self.parts.partners.route_show(
            &ad.ad,
            viewport,
            Box::new(move |result| {
                let dispatcher = slot.parts.dispatcher.clone();
                dispatcher.dispatch(Context::Background, move || slot.show_finished(id, result));
            }),
        );
    }

    fn take_show(&self, id: u64) -> Option<ShowAttempt> {
        let mut state = self.state.lock();
        match &state.show {
            Some(attempt) if attempt.id == id => state.show.take(),
            _ => None,
        }
    }

    /// Background context only.
    fn show_finished(&self, id: u64, result: ShowResult) {
        let Some(attempt) = self.take_show(id) else {
            tracing::warn!("discarding show result that arrived after the show timed out");
            return;
        };
        attempt.timeout.cancel();
        self.parts.bus.publish(
            Event::for_ad(EventKind::Show, &attempt.ad)
                .with_duration(attempt.start.elapsed())
                .with_error(result.as_ref().err().cloned()),
        );
        match result {
            Ok(()) => {
                tracing::info!(placement = %attempt.ad.request.placement, "ad shown");
                self.record_impression(&attempt.ad);
                if let Some(observer) = &self.parts.fullscreen_observer {
                    observer.did_show_fullscreen_ad();
                }
                (attempt.completion)(Ok(()));
            }
            Err(error) => {
                tracing::error!(placement = %attempt.ad.request.placement, error = %error, "ad show failed");
                self.abandon_show(&attempt.ad);
                (attempt.completion)(Err(error));
            }
        }
    }

    /// Background context only.
    fn show_timed_out(&self, id: u64) {
        let Some(attempt) = self.take_show(id) else {
            return;
        };
        tracing::error!(
            placement = %attempt.ad.request.placement,
            partner = %attempt.ad.bid.partner_id,
            "ad show timed out"
        );
        let error = MediationError::new(ErrorCode::ShowFailureTimeout);
        self.parts.bus.publish(
            Event::for_ad(EventKind::Show, &attempt.ad)
                .with_duration(attempt.start.elapsed())
                .with_error(Some(error.clone())),
        );
        self.abandon_show(&attempt.ad);
        (attempt.completion)(Err(error));
    }

    /// Failed show: the ad is invalidated and the retained observer released.
    fn abandon_show(&self, ad: &Arc<LoadedAd>) {
        {
            let mut state = self.state.lock();
            if state.showing.as_ref().is_some_and(|showing| Arc::ptr_eq(showing, ad)) {
                state.showing = None;
            }
            state.retained_observer = None;
        }
        self.invalidate(ad, Box::new(|_| {}));
    }

    fn record_impression(&self, ad: &LoadedAd) {
        self.parts.bus.publish(Event::for_ad(EventKind::MediationImpression, ad));
        let observer = self.state.lock().observer();
        if let Some(observer) = observer {
            observer.did_record_impression(ad);
        }
    }

    fn invalidate(&self, ad: &LoadedAd, completion: Completion<Result<(), MediationError>>) {
        let placement = ad.request.placement.clone();
        self.parts.partners.route_invalidate(
            &ad.ad,
            Box::new(move |result| {
                if let Err(error) = &result {
                    tracing::warn!(placement = %placement, error = %error, "partner ad invalidation failed");
                }
                completion(result);
            }),
        );
    }

    /// Background context only.
    fn expired(&self, handle: &PartnerAdHandle) {
        let (ad, observer) = {
            let state = self.state.lock();
            (state.find(handle), state.observer())
        };
        let Some(ad) = ad else {
            tracing::debug!(ad = %handle.id(), "expiration for an ad this slot no longer holds");
            return;
        };
        tracing::info!(placement = %ad.request.placement, "ad expired");
        self.parts.bus.publish(Event::for_ad(EventKind::Expiration, &ad));
        if let Some(observer) = observer {
            observer.did_expire(&ad);
        }
    }

    /// Background context only.
    fn dismissed(&self, handle: &PartnerAdHandle, error: Option<PartnerError>) {
        let (ad, observer) = {
            let mut state = self.state.lock();
            let ad = state.find(handle);
            let observer = state.observer();
            if ad.as_ref().is_some_and(|ad| state.showing.as_ref().is_some_and(|s| Arc::ptr_eq(s, ad))) {
                state.showing = None;
            }
            state.retained_observer = None;
            (ad, observer)
        };
        let Some(ad) = ad else {
            tracing::debug!(ad = %handle.id(), "dismiss for an ad this slot no longer holds");
            self.parts.partners.route_invalidate(
                handle,
                Box::new(|result| {
                    if let Err(error) = result {
                        tracing::warn!(error = %error, "partner ad invalidation failed");
                    }
                }),
            );
            return;
        };
        if let (true, Some(fullscreen)) = (ad.request.format.is_fullscreen(), &self.parts.fullscreen_observer) {
            fullscreen.did_close_fullscreen_ad();
        }
        self.invalidate(&ad, Box::new(|_| {}));

        let error = error.map(|e| MediationError::from_partner(e, None, ErrorCode::PartnerError));
        tracing::info!(placement = %ad.request.placement, error = ?error.as_ref().map(MediationError::as_label), "ad dismissed");
        self.parts
            .bus
            .publish(Event::for_ad(EventKind::Dismiss, &ad).with_error(error.clone()));
        if let Some(observer) = observer {
            observer.did_dismiss(&ad, error);
        }
    }

    /// Re-dispatches a partner callback onto the background context.
    fn on_background(&self, handle: &PartnerAdHandle, work: impl FnOnce(&Slot, &PartnerAdHandle) + Send + 'static) {
        let Some(slot) = self.me.upgrade() else { return };
        let handle = handle.clone();
        self.parts
            .dispatcher
            .dispatch(Context::Background, move || work(&*slot, &handle));
    }

    /// Background context only.
    fn clicked(&self, handle: &PartnerAdHandle) {
        let (ad, observer) = {
            let state = self.state.lock();
            (state.find(handle), state.observer())
        };
        let Some(ad) = ad else { return };
        self.parts.bus.publish(Event::for_ad(EventKind::Click, &ad));
        if let Some(observer) = observer {
            observer.did_click(&ad);
        }
    }

    /// Background context only.
    fn rewarded(&self, handle: &PartnerAdHandle) {
        let (ad, observer, custom_data) = {
            let state = self.state.lock();
            (state.find(handle), state.observer(), state.custom_data.clone())
        };
        let Some(ad) = ad else { return };
        tracing::info!(placement = %ad.request.placement, "reward earned");
        self.parts.bus.publish(Event::for_ad(EventKind::Reward, &ad));
        if let Some(callback) = &ad.bid.rewarded_callback {
            self.parts.bus.publish(
                Event::for_ad(EventKind::RewardedCallback, &ad).with_rewarded_callback(callback.clone(), custom_data),
            );
        }
        if let Some(observer) = observer {
            observer.did_reward(&ad);
        }
    }

    /// Background context only.
    fn impression_tracked(&self, handle: &PartnerAdHandle) {
        let ad = self.state.lock().find(handle);
        if let Some(ad) = ad {
            self.parts.bus.publish(Event::for_ad(EventKind::PartnerImpression, &ad));
        }
    }
}

impl PartnerAdDelegate for Slot {
    fn did_track_impression(&self, ad: &PartnerAdHandle) {
        self.on_background(ad, |slot, ad| slot.impression_tracked(ad));
    }

    fn did_click(&self, ad: &PartnerAdHandle) {
        self.on_background(ad, |slot, ad| slot.clicked(ad));
    }

    fn did_reward(&self, ad: &PartnerAdHandle) {
        self.on_background(ad, |slot, ad| slot.rewarded(ad));
    }

    fn did_dismiss(&self, ad: &PartnerAdHandle, error: Option<PartnerError>) {
        self.on_background(ad, move |slot, ad| slot.dismissed(ad, error));
    }

    fn did_expire(&self, ad: &PartnerAdHandle) {
        self.on_background(ad, |slot, ad| slot.expired(ad));
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        if let Some(ad) = self.state.get_mut().loaded.take() {
            tracing::debug!(placement = %ad.request.placement, "slot dropped; invalidating loaded ad");
            self.parts.partners.route_invalidate(&ad.ad, Box::new(|_| {}));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    use crate::Mediation;
    use crate::ads::BannerSize;
    use crate::test_support::{
        MockAd, MockAdapter, MockLoader, Outcome, RecordingObserver, WAIT, banner_request, completion_channel,
        fast_config, fullscreen_request, init_test_logging, next_event, wait_until,
    };

    struct Fixture {
        mediation: Mediation,
        adapter: Arc<MockAdapter>,
        loader: Arc<MockLoader>,
        fullscreen: RecordingObserver,
        observer: Arc<RecordingObserver>,
        slot: AdSlotController,
    }

    impl Fixture {
        fn new(adapter: MockAdapter, holding: bool) -> Self {
            let fixture = Self::uninitialized(adapter, holding);
            let (done, rx) = completion_channel();
            fixture
                .mediation
                .initialize(HashMap::new(), HashSet::new(), HashSet::new(), done);
            rx.recv_timeout(WAIT).expect("initialized");
            fixture
        }

        fn uninitialized(adapter: MockAdapter, holding: bool) -> Self {
            init_test_logging();
            let adapter = Arc::new(adapter);
            let loader = Arc::new(if holding {
                MockLoader::holding(Arc::clone(&adapter))
            } else {
                MockLoader::immediate(Arc::clone(&adapter))
            });
            let fullscreen = RecordingObserver::default();
            let mediation = Mediation::builder(fast_config())
                .with_loader(loader.clone())
                .with_fullscreen_observer(Arc::new(fullscreen.clone()))
                .build()
                .expect("mediation");
            let slot = mediation.make_slot();
            Self {
                mediation,
                adapter,
                loader,
                fullscreen,
                observer: Arc::new(RecordingObserver::default()),
                slot,
            }
        }

        fn observer(&self) -> Weak<dyn SlotObserver> {
            let observer: Arc<dyn SlotObserver> = self.observer.clone();
            Arc::downgrade(&observer)
        }

        fn load(&self, request: LoadRequest) -> AdLoadResult {
            let (done, rx) = completion_channel();
            self.slot.load_ad(request, None, self.observer(), done);
            rx.recv_timeout(WAIT).expect("load answered")
        }

        fn show(&self) -> ShowResult {
            let (done, rx) = completion_channel();
            self.slot.show_ad(Viewport::new(()), done);
            rx.recv_timeout(WAIT).expect("show answered")
        }

        fn flush(&self) {
            self.mediation
                .dispatcher()
                .sync(Context::Background, || ())
                .expect("background alive");
        }

        fn ad(&self) -> Arc<MockAd> {
            self.adapter.last_ad().expect("partner ad created")
        }

        fn handle(&self) -> PartnerAdHandle {
            self.slot
                .loaded_ad()
                .or_else(|| self.slot.showing_ad())
                .expect("slot holds an ad")
                .ad
                .clone()
        }

        fn partner_delegate(&self) -> Arc<dyn PartnerAdDelegate> {
            self.loader.delegate().expect("slot is the delegate")
        }
    }

    #[test]
    fn test_load_before_initialization_fails() {
        let f = Fixture::uninitialized(MockAdapter::new("mock"), false);
        let error = f.load(fullscreen_request()).expect_err("not initialized");
        assert_eq!(error.code, ErrorCode::LoadFailureMediationNotInitialized);
        assert_eq!(f.loader.calls(), 0);
    }

    #[test]
    fn test_load_while_loading_is_dropped() {
        let f = Fixture::new(MockAdapter::new("mock"), true);
        let (first, first_rx) = completion_channel();
        let (second, second_rx) = completion_channel::<AdLoadResult>();
        f.slot.load_ad(fullscreen_request(), None, f.observer(), first);
        f.slot.load_ad(fullscreen_request(), None, f.observer(), second);
        f.flush();
        assert_eq!(f.loader.calls(), 1);

        assert!(f.loader.release());
        assert!(first_rx.recv_timeout(WAIT).expect("first answered").is_ok());
        assert!(second_rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert!(f.slot.is_ready_to_show());
    }

    #[test]
    fn test_loaded_ad_is_reused() {
        let f = Fixture::new(MockAdapter::new("mock"), false);
        let first = f.load(fullscreen_request()).expect("loaded");
        let second = f.load(fullscreen_request()).expect("cached");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(f.loader.calls(), 1);
    }

    #[test]
    fn test_invalid_banner_size_is_rejected() {
        let f = Fixture::new(MockAdapter::new("mock"), false);
        let error = f
            .load(banner_request(BannerSize::fixed(20, 20)))
            .expect_err("invalid size");
        assert_eq!(error.code, ErrorCode::LoadFailureInvalidBannerSize);
        assert_eq!(f.loader.calls(), 0);
    }

    #[test]
    fn test_show_without_loaded_ad() {
        let f = Fixture::new(MockAdapter::new("mock"), false);
        assert_eq!(f.show().expect_err("nothing loaded").code, ErrorCode::ShowFailureAdNotReady);
    }

    #[test]
    fn test_show_records_impression() {
        let f = Fixture::new(MockAdapter::new("mock"), false);
        let mut events = f.mediation.subscribe();
        f.load(fullscreen_request()).expect("loaded");

        f.show().expect("shown");
        assert!(!f.slot.is_ready_to_show());
        assert!(f.slot.showing_ad().is_some());
        assert_eq!(f.observer.entries(), vec!["impression"]);
        assert_eq!(f.fullscreen.entries(), vec!["fullscreen-show"]);

        let show = next_event(&mut events, EventKind::Show).expect("show event");
        assert!(show.error.is_none());
        assert!(next_event(&mut events, EventKind::MediationImpression).is_some());
    }

    #[test]
    fn test_show_timeout_invalidates_ad() {
        let f = Fixture::new(MockAdapter::new("mock").with_show(Outcome::Hold), false);
        f.load(fullscreen_request()).expect("loaded");

        let error = f.show().expect_err("timed out");
        assert_eq!(error.code, ErrorCode::ShowFailureTimeout);
        let ad = f.ad();
        assert!(wait_until(|| ad.invalidated() == 1));
        assert!(f.slot.showing_ad().is_none());

        assert!(ad.release_show(Ok(())));
        f.flush();
        assert!(f.observer.entries().is_empty(), "late show success is ignored");
    }

    #[test]
    fn test_show_failure_is_reported() {
        let f = Fixture::new(MockAdapter::new("mock").with_show(Outcome::Fail(9)), false);
        f.load(fullscreen_request()).expect("loaded");
        assert_eq!(f.show().expect_err("failed").code, ErrorCode::ShowFailureUnknown);
        assert!(wait_until(|| f.ad().invalidated() == 1));
        assert!(f.slot.showing_ad().is_none());
    }

    #[test]
    fn test_observer_is_retained_until_dismiss() {
        let mut f = Fixture::new(MockAdapter::new("mock"), false);
        f.load(fullscreen_request()).expect("loaded");
        f.show().expect("shown");
        let handle = f.handle();

        let log = f.observer.log.clone();
        let retained = Arc::downgrade(&f.observer);
        f.observer = Arc::new(RecordingObserver::default());
        assert!(retained.upgrade().is_some(), "showing slot keeps its observer");

        f.partner_delegate().did_dismiss(&handle, None);
        assert!(wait_until(|| log.lock().iter().any(|e| e == "dismiss")));
        assert!(wait_until(|| retained.upgrade().is_none()), "observer released after dismiss");
        assert!(f.slot.showing_ad().is_none());
        assert!(f.fullscreen.entries().contains(&"fullscreen-close".to_string()));
        assert!(wait_until(|| f.ad().invalidated() == 1));
    }

    #[test]
    fn test_dismiss_error_reaches_observer() {
        let f = Fixture::new(MockAdapter::new("mock"), false);
        f.load(fullscreen_request()).expect("loaded");
        f.show().expect("shown");
        let handle = f.handle();

        f.partner_delegate()
            .did_dismiss(&handle, Some(PartnerError::native(3, "closed early")));
        assert!(wait_until(|| f.observer.entries().iter().any(|e| e.starts_with("dismiss:"))));
    }

    #[test]
    fn test_banner_marked_as_shown() {
        let f = Fixture::new(MockAdapter::new("mock"), false);
        f.load(banner_request(BannerSize::STANDARD)).expect("loaded");
        f.slot.mark_loaded_ad_as_shown();
        f.flush();
        assert!(f.slot.loaded_ad().is_none());
        assert!(f.slot.showing_ad().is_some());
        assert_eq!(f.observer.count("impression"), 1);
    }

    #[test]
    fn test_banner_show_is_rejected() {
        let f = Fixture::new(MockAdapter::new("mock"), false);
        f.load(banner_request(BannerSize::STANDARD)).expect("loaded");

        let error = f.show().expect_err("banners are not shown by the slot");
        assert_eq!(error.code, ErrorCode::ShowFailureWrongResourceType);
        assert!(f.slot.is_ready_to_show(), "banner stays loaded");
        assert!(f.slot.showing_ad().is_none());
        assert_eq!(f.ad().invalidated(), 0);
    }

    #[test]
    fn test_dismiss_of_replaced_ad_still_invalidates_it() {
        let f = Fixture::new(MockAdapter::new("mock"), false);
        f.load(fullscreen_request()).expect("first loaded");
        f.show().expect("first shown");
        let first = f.ad();
        let first_handle = f.handle();

        f.load(fullscreen_request()).expect("second loaded");
        f.show().expect("second shown");
        let second = f.ad();
        assert!(!Arc::ptr_eq(&first, &second));

        f.partner_delegate().did_dismiss(&first_handle, None);
        assert!(wait_until(|| first.invalidated() == 1));
        f.flush();
        assert!(f.slot.showing_ad().is_some(), "second ad still showing");
        assert_eq!(second.invalidated(), 0);
    }

    #[test]
    fn test_clear_loaded_ad_invalidates() {
        let f = Fixture::new(MockAdapter::new("mock"), false);
        f.load(fullscreen_request()).expect("loaded");
        f.slot.clear_loaded_ad();
        assert!(wait_until(|| f.ad().invalidated() == 1));
        assert!(!f.slot.is_ready_to_show());
    }

    #[test]
    fn test_clear_showing_ad_reports_invalidation() {
        let f = Fixture::new(MockAdapter::new("mock"), false);
        f.load(fullscreen_request()).expect("loaded");
        f.show().expect("shown");

        let (done, rx) = completion_channel();
        f.slot.clear_showing_ad(done);
        assert!(rx.recv_timeout(WAIT).expect("answered").is_ok());
        assert!(f.slot.showing_ad().is_none());
        assert_eq!(f.ad().invalidated(), 1);
    }

    #[test]
    fn test_forced_expiration_keeps_ad() {
        let f = Fixture::new(MockAdapter::new("mock"), false);
        f.load(fullscreen_request()).expect("loaded");
        f.slot.force_internal_expiration();
        assert!(wait_until(|| f.observer.count("expire") == 1));
        assert!(f.slot.is_ready_to_show());
    }

    #[test]
    fn test_reward_sends_callback_with_custom_data() {
        let f = Fixture::new(MockAdapter::new("mock"), false);
        let mut events = f.mediation.subscribe();
        f.load(LoadRequest::new("rewarded-1", crate::ads::AdFormat::Rewarded))
            .expect("loaded");
        f.slot.set_custom_data(Some("user-7".to_string()));
        f.show().expect("shown");

        f.partner_delegate().did_reward(&f.handle());
        let callback = next_event(&mut events, EventKind::RewardedCallback).expect("rewarded callback");
        assert_eq!(callback.custom_data.as_deref(), Some("user-7"));
        assert!(callback.rewarded_callback.is_some());
        assert!(wait_until(|| f.observer.count("reward") == 1));
    }

    #[test]
    fn test_dropping_slot_invalidates_loaded_ad() {
        let f = Fixture::new(MockAdapter::new("mock"), false);
        f.load(fullscreen_request()).expect("loaded");
        let ad = f.ad();
        let Fixture { mediation, slot, .. } = f;
        drop(slot);
        assert!(wait_until(|| ad.invalidated() == 1));
        drop(mediation);
    }
}
