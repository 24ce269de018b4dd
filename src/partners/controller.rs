//! # Partner adapter controller.
//!
//! [`PartnerAdapterController`] owns every adapter and every live partner ad.
//! Its state is only touched from the background context; partner callbacks are
//! re-dispatched there before they look at it.
//!
//! ## Setup
//! ```text
//! set_up_adapters(credentials, enabled, skip)
//!   └─► [background] one unit per adapter ──► adapter.set_up(..) ──► [background] record
//!                                                                   ├─ ok: register + replay consent diff
//!                                                                   └─ err: mapped failure record
//!       on_all_finished(init_metrics_post_timeout)
//!         └─► InitResults published, pending adapters recorded as timed out, completion(records)
//! ```
//!
//! ## Load routing
//! ```text
//! route_load ── sync(background) ──► adapter known? ── no ──► PartnerNotInitialized
//!                                         │ yes
//!                                         ▼
//!                      make_ad (main for banners) ──► storage.insert ──► ad.load (main | background)
//!                                                                           │ any thread
//!                                                                           ▼
//!                                             [background] still stored? ── no ──► discarded
//!                                                         │ yes
//!                                                         ├─ ok ──► completion(handle)
//!                                                         └─ err ─► invalidate + completion(err)
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;

use super::adapter::{BidderTokens, Completion, PartnerAdapter, PartnerConfiguration, PartnerId, PartnerInfo};
use super::consent::{ConsentObserver, ConsentSettings, modified_keys};
use super::factory::AdapterFactory;
use super::handle::{AdId, PartnerAdDelegate, PartnerAdEvents, PartnerAdHandle};
use super::storage::AdStorage;
use crate::ads::{PartnerAdLoadRequest, PreBidRequest, Viewport};
use crate::core::MediationConfig;
use crate::dispatch::{Context, Dispatcher};
use crate::error::{ErrorCode, MediationError, PartnerError};
use crate::events::{Bus, Event, EventKind, InitResults, MetricsEvent};

/// Undoes an in-flight load: the partner ad is invalidated and dropped from storage.
pub type CancelAction = Box<dyn FnOnce() + Send + 'static>;

/// Routes ad operations to the adapter of the partner that owns them.
pub trait PartnerController: Send + Sync + 'static {
    /// Collects bidder tokens from every initialized adapter.
    ///
    /// Completes at most after the pre-bid timeout with whatever arrived by then.
    fn route_fetch_bidder_information(&self, request: PreBidRequest, completion: Completion<BidderTokens>);

    /// Creates and loads the partner ad for one bid.
    ///
    /// The returned action cancels the load. The completion is not invoked for
    /// an ad that was invalidated before its load finished.
    ///
    /// Blocks until the ad is registered, and banner ads are created on the
    /// main context, so calling this from [`Context::Main`] fails with
    /// [`ErrorCode::Internal`].
    fn route_load(
        &self,
        request: PartnerAdLoadRequest,
        viewport: Option<Viewport>,
        delegate: Weak<dyn PartnerAdDelegate>,
        completion: Completion<Result<PartnerAdHandle, MediationError>>,
    ) -> CancelAction;

    /// Shows a full-screen ad on the main context.
    fn route_show(&self, ad: &PartnerAdHandle, viewport: Viewport, completion: Completion<Result<(), MediationError>>);

    /// Drops the ad from storage, then invalidates it.
    fn route_invalidate(&self, ad: &PartnerAdHandle, completion: Completion<Result<(), MediationError>>);
}

struct State {
    initialized: bool,
    adapters: HashMap<PartnerId, Arc<dyn PartnerAdapter>>,
    storage: AdStorage,
}

struct Inner {
    dispatcher: Dispatcher,
    config: MediationConfig,
    bus: Bus,
    consent: Arc<ConsentSettings>,
    factory: AdapterFactory,
    state: Mutex<State>,
}

/// The engine's [`PartnerController`]. Cheap to clone.
#[derive(Clone)]
pub struct PartnerAdapterController {
    inner: Arc<Inner>,
}

impl PartnerAdapterController {
    /// Creates the controller and subscribes it to `consent` changes.
    pub fn new(
        dispatcher: Dispatcher,
        config: MediationConfig,
        bus: Bus,
        consent: Arc<ConsentSettings>,
        factory: AdapterFactory,
    ) -> Self {
        let controller = Self {
            inner: Arc::new(Inner {
                dispatcher,
                config,
                bus,
                consent: Arc::clone(&consent),
                factory,
                state: Mutex::new(State {
                    initialized: false,
                    adapters: HashMap::new(),
                    storage: AdStorage::default(),
                }),
            }),
        };
        consent.set_observer(Arc::new(ConsentRelay(Arc::downgrade(&controller.inner))));
        controller
    }

    /// Sets up every enabled adapter that has credentials. Runs once; later calls are ignored.
    ///
    /// Adapters in `skip` are not set up and get an `InitializationSkipped`
    /// record. Adapters that have not answered when the
    /// `init_metrics_post_timeout` boundary is reached get an
    /// `InitializationFailureTimeout` record.
    pub fn set_up_adapters(
        &self,
        credentials: HashMap<PartnerId, HashMap<String, String>>,
        enabled: HashSet<String>,
        skip: HashSet<PartnerId>,
        completion: Completion<Vec<MetricsEvent>>,
    ) {
        let this = self.clone();
        self.inner.dispatcher.dispatch(Context::Background, move || {
            this.set_up_on_background(credentials, enabled, skip, completion);
        });
    }

    /// Info of every adapter whose setup succeeded.
    pub fn initialized_adapter_info(&self) -> HashMap<PartnerId, PartnerInfo> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .dispatcher
            .sync(Context::Background, move || {
                inner
                    .state
                    .lock()
                    .adapters
                    .iter()
                    .map(|(id, adapter)| (id.clone(), adapter.info()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `ad` is still live.
    pub fn is_in_storage(&self, ad: &PartnerAdHandle) -> bool {
        let inner = Arc::clone(&self.inner);
        let ad = ad.clone();
        self.inner
            .dispatcher
            .sync(Context::Background, move || inner.state.lock().storage.contains(&ad))
            .unwrap_or(false)
    }

    /// Number of live partner ads.
    pub fn stored_ad_count(&self) -> usize {
        let inner = Arc::clone(&self.inner);
        self.inner
            .dispatcher
            .sync(Context::Background, move || inner.state.lock().storage.len())
            .unwrap_or(0)
    }

    fn set_up_on_background(
        &self,
        credentials: HashMap<PartnerId, HashMap<String, String>>,
        enabled: HashSet<String>,
        skip: HashSet<PartnerId>,
        completion: Completion<Vec<MetricsEvent>>,
    ) {
        if std::mem::replace(&mut self.inner.state.lock().initialized, true) {
            tracing::error!("partner adapters were already set up; ignoring");
            return;
        }

        let start = Instant::now();
        let (consents, is_user_underage) = self.inner.consent.snapshot();
        let records: Arc<Mutex<Vec<MetricsEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let mut pending: Vec<PartnerInfo> = Vec::new();
        let group = self.inner.dispatcher.group(Context::Background);

        for adapter in self.inner.factory.adapters(&enabled) {
            let info = adapter.info();
            let Some(partner_credentials) = credentials.get(&info.partner_id) else {
                tracing::warn!(partner = %info.partner_id, "no credentials for adapter; not setting it up");
                continue;
            };
            if skip.contains(&info.partner_id) {
                tracing::info!(partner = %info.partner_id, "adapter setup skipped");
                records.lock().push(MetricsEvent::for_adapter(
                    &info,
                    start,
                    Some(MediationError::new(ErrorCode::InitializationSkipped)),
                ));
                continue;
            }

            pending.push(info.clone());
            let configuration = PartnerConfiguration {
                credentials: partner_credentials.clone(),
                consents: consents.clone(),
                is_user_underage,
            };
            let weak = Arc::downgrade(&self.inner);
            let records = Arc::clone(&records);
            let initial_consents = consents.clone();
            group.add(move |finished| {
                tracing::debug!(partner = %info.partner_id, "setting up adapter");
                let callee = Arc::clone(&adapter);
                callee.set_up(
                    configuration,
                    Box::new(move |result| {
                        let Some(inner) = weak.upgrade() else {
                            finished.finish();
                            return;
                        };
                        let this = Self { inner };
                        let dispatcher = this.inner.dispatcher.clone();
                        dispatcher.dispatch(Context::Background, move || {
                            let record =
                                this.adapter_set_up(adapter, &info, start, &initial_consents, is_user_underage, result);
                            records.lock().push(record);
                            finished.finish();
                        });
                    }),
                );
            });
        }

        let bus = self.inner.bus.clone();
        let timeout = self.inner.config.init_metrics_post_timeout;
        group.on_all_finished(timeout, move || {
            let records = {
                let mut records = records.lock();
                let in_progress: Vec<&PartnerInfo> = pending
                    .iter()
                    .filter(|info| !records.iter().any(|r| r.partner_id == info.partner_id))
                    .collect();

                let results = InitResults {
                    skipped: skip.iter().cloned().collect(),
                    succeeded: records.iter().filter(|r| r.is_success()).cloned().collect(),
                    failed: records.iter().filter(|r| !r.is_success()).cloned().collect(),
                    in_progress: in_progress.iter().map(|info| info.partner_id.clone()).collect(),
                };
                bus.publish(Event::new(EventKind::InitResults).with_init_results(results));

                for info in in_progress {
                    tracing::warn!(partner = %info.partner_id, "adapter setup timed out");
                    records.push(MetricsEvent::for_adapter(
                        info,
                        start,
                        Some(MediationError::new(ErrorCode::InitializationFailureTimeout)),
                    ));
                }
                records.clone()
            };
            bus.publish(Event::new(EventKind::Initialization).with_records(records.clone()));
            completion(records);
        });
    }

    /// Background context only.
    fn adapter_set_up(
        &self,
        adapter: Arc<dyn PartnerAdapter>,
        info: &PartnerInfo,
        start: Instant,
        initial_consents: &HashMap<String, String>,
        initial_underage: bool,
        result: Result<(), PartnerError>,
    ) -> MetricsEvent {
        match result {
            Ok(()) => {
                tracing::info!(partner = %info.partner_id, "adapter set up");
                // Also reached after the setup timeout already reported this adapter
                // as timed out; it is registered and usable regardless.
                self.inner
                    .state
                    .lock()
                    .adapters
                    .insert(info.partner_id.clone(), Arc::clone(&adapter));
                replay_consent_changes(&self.inner.consent, adapter.as_ref(), initial_consents, initial_underage);
                MetricsEvent::for_adapter(info, start, None)
            }
            Err(error) => {
                tracing::error!(partner = %info.partner_id, error = %error, "adapter setup failed");
                let mapped = adapter.map_set_up_error(&error);
                let error = MediationError::from_partner(error, mapped, ErrorCode::InitializationFailureUnknown);
                MetricsEvent::for_adapter(info, start, Some(error))
            }
        }
    }

    /// Background context only.
    fn load_on_background(
        &self,
        request: PartnerAdLoadRequest,
        viewport: Option<Viewport>,
        delegate: Weak<dyn PartnerAdDelegate>,
        completion: Completion<Result<PartnerAdHandle, MediationError>>,
    ) -> CancelAction {
        tracing::debug!(
            partner = %request.partner_id,
            placement = %request.placement,
            format = %request.format,
            "routing load"
        );
        let adapter = self.inner.state.lock().adapters.get(&request.partner_id).cloned();
        let Some(adapter) = adapter else {
            tracing::error!(partner = %request.partner_id, "load routed to a partner that is not initialized");
            completion(Err(MediationError::new(ErrorCode::LoadFailurePartnerNotInitialized)));
            return Box::new(|| {});
        };

        let id = AdId::next();
        let events = PartnerAdEvents::new(id, delegate);
        let is_banner = request.format.is_banner();
        let partner_id = request.partner_id.clone();

        let made = if is_banner {
            let adapter = Arc::clone(&adapter);
            let events = events.clone();
            self.inner
                .dispatcher
                .sync(Context::Main, move || adapter.make_ad(request, events))
                .unwrap_or_else(|e| {
                    Err(MediationError::new(ErrorCode::Internal)
                        .with_description(e.to_string())
                        .into())
                })
        } else {
            adapter.make_ad(request, events.clone())
        };
        let ad = match made {
            Ok(ad) => ad,
            Err(error) => {
                tracing::error!(partner = %partner_id, error = %error, "partner ad creation failed");
                let mapped = adapter.map_load_error(&error);
                completion(Err(MediationError::from_partner(error, mapped, ErrorCode::LoadFailureUnknown)));
                return Box::new(|| {});
            }
        };

        let handle = PartnerAdHandle::with_id(id, partner_id, ad, adapter);
        events.bind(&handle);
        self.inner.state.lock().storage.insert(handle.clone());

        let context = if is_banner { Context::Main } else { Context::Background };
        let weak = Arc::downgrade(&self.inner);
        let loading = handle.clone();
        self.inner.dispatcher.dispatch(context, move || {
            let ad = Arc::clone(loading.ad());
            ad.load(
                viewport,
                Box::new(move |result| {
                    let Some(inner) = weak.upgrade() else { return };
                    let this = Self { inner };
                    let dispatcher = this.inner.dispatcher.clone();
                    dispatcher.dispatch(Context::Background, move || this.load_finished(loading, result, completion));
                }),
            );
        });

        let weak = Arc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                tracing::debug!(ad = %handle.id(), "cancelling partner load");
                Self { inner }.route_invalidate(&handle, Box::new(|_| {}));
            }
        })
    }

    /// Background context only.
    fn load_finished(
        &self,
        ad: PartnerAdHandle,
        result: Result<(), PartnerError>,
        completion: Completion<Result<PartnerAdHandle, MediationError>>,
    ) {
        if !self.inner.state.lock().storage.contains(&ad) {
            tracing::warn!(ad = %ad.id(), partner = %ad.partner_id(), "discarding load result of an invalidated ad");
            return;
        }
        match result {
            Ok(()) => {
                tracing::info!(ad = %ad.id(), partner = %ad.partner_id(), "partner ad loaded");
                completion(Ok(ad));
            }
            Err(error) => {
                tracing::error!(ad = %ad.id(), partner = %ad.partner_id(), error = %error, "partner ad load failed");
                self.invalidate_on_background(&ad, Box::new(|_| {}));
                let mapped = ad.adapter().map_load_error(&error);
                completion(Err(MediationError::from_partner(error, mapped, ErrorCode::LoadFailureUnknown)));
            }
        }
    }

    /// Background context only.
    fn invalidate_on_background(&self, ad: &PartnerAdHandle, completion: Completion<Result<(), MediationError>>) {
        tracing::debug!(ad = %ad.id(), partner = %ad.partner_id(), "invalidating partner ad");
        self.inner.state.lock().storage.remove(ad);
        match ad.ad().invalidate() {
            Ok(()) => completion(Ok(())),
            Err(error) => {
                tracing::error!(ad = %ad.id(), error = %error, "partner ad invalidation failed");
                let mapped = ad.adapter().map_invalidate_error(&error);
                completion(Err(MediationError::from_partner(
                    error,
                    mapped,
                    ErrorCode::InvalidateFailureUnknown,
                )));
            }
        }
    }

    /// Background context only.
    fn fetch_on_background(&self, request: PreBidRequest, completion: Completion<BidderTokens>) {
        let adapters: Vec<(PartnerId, Arc<dyn PartnerAdapter>)> = self
            .inner
            .state
            .lock()
            .adapters
            .iter()
            .map(|(id, adapter)| (id.clone(), Arc::clone(adapter)))
            .collect();

        let collected: Arc<Mutex<(BidderTokens, Vec<MetricsEvent>)>> = Arc::default();
        let group = self.inner.dispatcher.group(Context::Background);
        for (partner_id, adapter) in adapters {
            let request = request.clone();
            let collected = Arc::clone(&collected);
            let dispatcher = self.inner.dispatcher.clone();
            group.add(move |finished| {
                let start = Instant::now();
                let callee = Arc::clone(&adapter);
                callee.fetch_bidder_information(
                    &request,
                    Box::new(move |result| {
                        dispatcher.dispatch(Context::Background, move || {
                            let mut collected = collected.lock();
                            match result {
                                Ok(tokens) => {
                                    collected.1.push(MetricsEvent::new(start, partner_id.clone(), None));
                                    collected.0.insert(partner_id, tokens);
                                }
                                Err(error) => {
                                    tracing::warn!(partner = %partner_id, error = %error, "bidder token fetch failed");
                                    let mapped = adapter.map_prebid_error(&error);
                                    let error = MediationError::from_partner(
                                        error,
                                        mapped,
                                        ErrorCode::PrebidFailureUnknown,
                                    );
                                    collected.1.push(MetricsEvent::new(start, partner_id, Some(error)));
                                }
                            }
                            drop(collected);
                            finished.finish();
                        });
                    }),
                );
            });
        }

        let bus = self.inner.bus.clone();
        group.on_all_finished(self.inner.config.prebid_fetch_timeout, move || {
            let (tokens, records) = collected.lock().clone();
            bus.publish(
                Event::new(EventKind::Prebid)
                    .with_placement(request.placement.clone())
                    .with_load_id(request.load_id.as_str())
                    .with_format(request.format)
                    .with_records(records),
            );
            completion(tokens);
        });
    }

    fn broadcast_to_adapters(&self, apply: impl Fn(&dyn PartnerAdapter) + Send + 'static) {
        let inner = Arc::clone(&self.inner);
        self.inner.dispatcher.dispatch(Context::Background, move || {
            let adapters: Vec<Arc<dyn PartnerAdapter>> = inner.state.lock().adapters.values().cloned().collect();
            for adapter in adapters {
                apply(adapter.as_ref());
            }
        });
    }
}

impl PartnerController for PartnerAdapterController {
    fn route_fetch_bidder_information(&self, request: PreBidRequest, completion: Completion<BidderTokens>) {
        let this = self.clone();
        self.inner.dispatcher.dispatch(Context::Background, move || {
            this.fetch_on_background(request, completion);
        });
    }

    fn route_load(
        &self,
        request: PartnerAdLoadRequest,
        viewport: Option<Viewport>,
        delegate: Weak<dyn PartnerAdDelegate>,
        completion: Completion<Result<PartnerAdHandle, MediationError>>,
    ) -> CancelAction {
        if self.inner.dispatcher.is_current(Context::Main) {
            tracing::error!(partner = %request.partner_id, "load routed from the main context");
            completion(Err(MediationError::new(ErrorCode::Internal)
                .with_description("route_load must not be called from the main context")));
            return Box::new(|| {});
        }
        let completion = Arc::new(Mutex::new(Some(completion)));
        let slot = Arc::clone(&completion);
        let this = self.clone();
        let routed = self.inner.dispatcher.sync(Context::Background, move || {
            match slot.lock().take() {
                Some(completion) => this.load_on_background(request, viewport, delegate, completion),
                None => Box::new(|| {}) as CancelAction,
            }
        });
        match routed {
            Ok(cancel) => cancel,
            Err(e) => {
                tracing::error!(error = %e, "load routing failed");
                if let Some(completion) = completion.lock().take() {
                    completion(Err(MediationError::new(ErrorCode::Internal).with_description(e.to_string())));
                }
                Box::new(|| {})
            }
        }
    }

    fn route_show(&self, ad: &PartnerAdHandle, viewport: Viewport, completion: Completion<Result<(), MediationError>>) {
        let ad = ad.clone();
        self.inner.dispatcher.dispatch(Context::Main, move || {
            tracing::debug!(ad = %ad.id(), partner = %ad.partner_id(), "routing show");
            let partner_ad = Arc::clone(ad.ad());
            partner_ad.show(
                viewport,
                Box::new(move |result| match result {
                    Ok(()) => {
                        tracing::info!(ad = %ad.id(), partner = %ad.partner_id(), "partner ad shown");
                        completion(Ok(()));
                    }
                    Err(error) => {
                        tracing::error!(ad = %ad.id(), error = %error, "partner ad show failed");
                        let mapped = ad.adapter().map_show_error(&error);
                        completion(Err(MediationError::from_partner(error, mapped, ErrorCode::ShowFailureUnknown)));
                    }
                }),
            );
        });
    }

    fn route_invalidate(&self, ad: &PartnerAdHandle, completion: Completion<Result<(), MediationError>>) {
        let this = self.clone();
        let ad = ad.clone();
        self.inner.dispatcher.dispatch(Context::Background, move || {
            this.invalidate_on_background(&ad, completion);
        });
    }
}

/// Sends the consent changes made while `adapter` was setting up.
fn replay_consent_changes(
    consent: &ConsentSettings,
    adapter: &dyn PartnerAdapter,
    initial_consents: &HashMap<String, String>,
    initial_underage: bool,
) {
    let (consents, is_user_underage) = consent.snapshot();
    let modified = modified_keys(initial_consents, &consents);
    if !modified.is_empty() {
        adapter.set_consents(&consents, &modified);
    }
    if is_user_underage != initial_underage {
        adapter.set_is_user_underage(is_user_underage);
    }
}

struct ConsentRelay(Weak<Inner>);

impl ConsentObserver for ConsentRelay {
    fn consents_changed(&self, consents: &HashMap<String, String>, modified: &HashSet<String>) {
        let Some(inner) = self.0.upgrade() else { return };
        let consents = consents.clone();
        let modified = modified.clone();
        PartnerAdapterController { inner }.broadcast_to_adapters(move |adapter| adapter.set_consents(&consents, &modified));
    }

    fn underage_changed(&self, is_user_underage: bool) {
        let Some(inner) = self.0.upgrade() else { return };
        PartnerAdapterController { inner }.broadcast_to_adapters(move |adapter| adapter.set_is_user_underage(is_user_underage));
    }
}
