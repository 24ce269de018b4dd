//! Scripted partners, loaders and recorders shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Once, Weak, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::ads::{AdFormat, BannerSize, Bid, LoadRequest, LoadedAd, PartnerAdLoadRequest, PreBidRequest, Viewport};
use crate::core::MediationConfig;
use crate::error::PartnerError;
use crate::loading::{AdLoadResult, AdLoader};
use crate::partners::{
    Completion, PartnerAd, PartnerAdDelegate, PartnerAdEvents, PartnerAdHandle, PartnerAdapter,
    PartnerConfiguration, PartnerInfo,
};
use crate::slot::{FullscreenShowObserver, SlotObserver};

pub(crate) const WAIT: Duration = Duration::from_secs(5);

pub(crate) fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Short timeouts so timeout paths run quickly.
pub(crate) fn fast_config() -> MediationConfig {
    MediationConfig {
        fullscreen_load_timeout: Duration::from_millis(400),
        banner_load_timeout: Duration::from_millis(400),
        show_timeout: Duration::from_millis(300),
        prebid_fetch_timeout: Duration::from_millis(300),
        init_metrics_post_timeout: Duration::from_millis(300),
        ..MediationConfig::default()
    }
}

/// Polls `cond` until it holds or [`WAIT`] elapses.
pub(crate) fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Channel whose sender can be moved into a completion.
pub(crate) fn completion_channel<T: Send + 'static>() -> (impl FnOnce(T) + Send + 'static, mpsc::Receiver<T>) {
    let (tx, rx) = mpsc::channel();
    (
        move |value| {
            let _ = tx.send(value);
        },
        rx,
    )
}

pub(crate) fn bid(id: &str, partner: &str) -> Bid {
    Bid::new(id, partner, format!("{partner}-placement"), "auction-1")
}

pub(crate) fn fullscreen_request() -> LoadRequest {
    LoadRequest::new("placement-1", AdFormat::Interstitial)
}

pub(crate) fn banner_request(size: BannerSize) -> LoadRequest {
    LoadRequest::new("banner-1", AdFormat::Banner).with_size(size)
}

/// How a scripted partner call answers.
#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    /// Completes right away on the calling thread.
    Succeed,
    /// Fails right away with a native partner error.
    Fail(i64),
    /// Completes from another thread after the delay.
    SucceedAfter(Duration),
    /// Never completes on its own; see the `release_*` helpers.
    Hold,
}

type Held<T> = Mutex<Vec<Completion<Result<T, PartnerError>>>>;

fn deliver<T: Send + 'static>(outcome: &Outcome, ok: T, completion: Completion<Result<T, PartnerError>>, held: &Held<T>) {
    match outcome {
        Outcome::Succeed => completion(Ok(ok)),
        Outcome::Fail(code) => completion(Err(PartnerError::native(*code, "scripted failure"))),
        Outcome::SucceedAfter(delay) => {
            let delay = *delay;
            thread::spawn(move || {
                thread::sleep(delay);
                completion(Ok(ok));
            });
        }
        Outcome::Hold => held.lock().push(completion),
    }
}

fn release<T>(held: &Held<T>, result: Result<T, PartnerError>) -> bool {
    let completion = held.lock().pop();
    match completion {
        Some(completion) => {
            completion(result);
            true
        }
        None => false,
    }
}

/// Partner ad driven by [`Outcome`] scripts.
pub(crate) struct MockAd {
    request: PartnerAdLoadRequest,
    pub(crate) events: PartnerAdEvents,
    load: Outcome,
    show: Outcome,
    banner_view: bool,
    banner_size: Option<BannerSize>,
    pub(crate) loads: AtomicUsize,
    pub(crate) shows: AtomicUsize,
    pub(crate) invalidations: AtomicUsize,
    held_load: Held<()>,
    held_show: Held<()>,
}

impl MockAd {
    pub(crate) fn release_load(&self, result: Result<(), PartnerError>) -> bool {
        release(&self.held_load, result)
    }

    pub(crate) fn release_show(&self, result: Result<(), PartnerError>) -> bool {
        release(&self.held_show, result)
    }

    pub(crate) fn invalidated(&self) -> usize {
        self.invalidations.load(AtomicOrdering::SeqCst)
    }
}

impl PartnerAd for MockAd {
    fn request(&self) -> &PartnerAdLoadRequest {
        &self.request
    }

    fn load(&self, _viewport: Option<Viewport>, completion: Completion<Result<(), PartnerError>>) {
        self.loads.fetch_add(1, AtomicOrdering::SeqCst);
        deliver(&self.load, (), completion, &self.held_load);
    }

    fn show(&self, _viewport: Viewport, completion: Completion<Result<(), PartnerError>>) {
        self.shows.fetch_add(1, AtomicOrdering::SeqCst);
        deliver(&self.show, (), completion, &self.held_show);
    }

    fn invalidate(&self) -> Result<(), PartnerError> {
        self.invalidations.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(())
    }

    fn has_banner_view(&self) -> bool {
        self.banner_view
    }

    fn banner_size(&self) -> Option<BannerSize> {
        self.banner_size
    }
}

/// Adapter whose every call follows a script.
pub(crate) struct MockAdapter {
    id: &'static str,
    pub(crate) setup: Outcome,
    pub(crate) prebid: Outcome,
    pub(crate) load: Outcome,
    pub(crate) show: Outcome,
    pub(crate) banner_view: bool,
    pub(crate) banner_size: Option<BannerSize>,
    pub(crate) make_ad_fails: bool,
    pub(crate) setups: AtomicUsize,
    pub(crate) consents: Mutex<Vec<(HashMap<String, String>, HashSet<String>)>>,
    pub(crate) underage: Mutex<Vec<bool>>,
    pub(crate) ads: Mutex<Vec<Arc<MockAd>>>,
    held_setup: Held<()>,
    held_prebid: Held<HashMap<String, String>>,
}

impl MockAdapter {
    pub(crate) fn new(id: &'static str) -> Self {
        Self {
            id,
            setup: Outcome::Succeed,
            prebid: Outcome::Succeed,
            load: Outcome::Succeed,
            show: Outcome::Succeed,
            banner_view: true,
            banner_size: None,
            make_ad_fails: false,
            setups: AtomicUsize::new(0),
            consents: Mutex::new(Vec::new()),
            underage: Mutex::new(Vec::new()),
            ads: Mutex::new(Vec::new()),
            held_setup: Mutex::new(Vec::new()),
            held_prebid: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_setup(mut self, outcome: Outcome) -> Self {
        self.setup = outcome;
        self
    }

    pub(crate) fn with_prebid(mut self, outcome: Outcome) -> Self {
        self.prebid = outcome;
        self
    }

    pub(crate) fn with_load(mut self, outcome: Outcome) -> Self {
        self.load = outcome;
        self
    }

    pub(crate) fn with_show(mut self, outcome: Outcome) -> Self {
        self.show = outcome;
        self
    }

    pub(crate) fn without_banner_view(mut self) -> Self {
        self.banner_view = false;
        self
    }

    pub(crate) fn with_banner_size(mut self, size: BannerSize) -> Self {
        self.banner_size = Some(size);
        self
    }

    pub(crate) fn release_setup(&self, result: Result<(), PartnerError>) -> bool {
        release(&self.held_setup, result)
    }

    pub(crate) fn last_ad(&self) -> Option<Arc<MockAd>> {
        self.ads.lock().last().cloned()
    }

    pub(crate) fn setup_calls(&self) -> usize {
        self.setups.load(AtomicOrdering::SeqCst)
    }

    /// Builds an ad outside the controller, for loaders that bypass it.
    pub(crate) fn detached_ad(&self, request: PartnerAdLoadRequest) -> Arc<MockAd> {
        self.build_ad(request, PartnerAdEvents::detached())
    }

    fn build_ad(&self, request: PartnerAdLoadRequest, events: PartnerAdEvents) -> Arc<MockAd> {
        let ad = Arc::new(MockAd {
            request,
            events,
            load: self.load.clone(),
            show: self.show.clone(),
            banner_view: self.banner_view,
            banner_size: self.banner_size,
            loads: AtomicUsize::new(0),
            shows: AtomicUsize::new(0),
            invalidations: AtomicUsize::new(0),
            held_load: Mutex::new(Vec::new()),
            held_show: Mutex::new(Vec::new()),
        });
        self.ads.lock().push(Arc::clone(&ad));
        ad
    }
}

impl PartnerAdapter for MockAdapter {
    fn info(&self) -> PartnerInfo {
        PartnerInfo {
            partner_id: Arc::from(self.id),
            display_name: self.id.to_uppercase(),
            partner_sdk_version: "1.0.0".to_string(),
            adapter_version: "1.0.0.0".to_string(),
        }
    }

    fn set_up(&self, _configuration: PartnerConfiguration, completion: Completion<Result<(), PartnerError>>) {
        self.setups.fetch_add(1, AtomicOrdering::SeqCst);
        deliver(&self.setup, (), completion, &self.held_setup);
    }

    fn fetch_bidder_information(
        &self,
        _request: &PreBidRequest,
        completion: Completion<Result<HashMap<String, String>, PartnerError>>,
    ) {
        let tokens = HashMap::from([("token".to_string(), format!("{}-token", self.id))]);
        deliver(&self.prebid, tokens, completion, &self.held_prebid);
    }

    fn set_consents(&self, consents: &HashMap<String, String>, modified: &HashSet<String>) {
        self.consents.lock().push((consents.clone(), modified.clone()));
    }

    fn set_is_user_underage(&self, is_user_underage: bool) {
        self.underage.lock().push(is_user_underage);
    }

    fn make_ad(
        &self,
        request: PartnerAdLoadRequest,
        events: PartnerAdEvents,
    ) -> Result<Arc<dyn PartnerAd>, PartnerError> {
        if self.make_ad_fails {
            return Err(PartnerError::native(7, "cannot create ad"));
        }
        Ok(self.build_ad(request, events))
    }
}

/// Partner delegate that records every callback by name.
#[derive(Default)]
pub(crate) struct RecordingDelegate {
    pub(crate) calls: Mutex<Vec<(&'static str, PartnerAdHandle)>>,
}

impl RecordingDelegate {
    pub(crate) fn names(&self) -> Vec<&'static str> {
        self.calls.lock().iter().map(|(name, _)| *name).collect()
    }
}

impl PartnerAdDelegate for RecordingDelegate {
    fn did_track_impression(&self, ad: &PartnerAdHandle) {
        self.calls.lock().push(("impression", ad.clone()));
    }

    fn did_click(&self, ad: &PartnerAdHandle) {
        self.calls.lock().push(("click", ad.clone()));
    }

    fn did_reward(&self, ad: &PartnerAdHandle) {
        self.calls.lock().push(("reward", ad.clone()));
    }

    fn did_dismiss(&self, ad: &PartnerAdHandle, _error: Option<PartnerError>) {
        self.calls.lock().push(("dismiss", ad.clone()));
    }

    fn did_expire(&self, ad: &PartnerAdHandle) {
        self.calls.lock().push(("expire", ad.clone()));
    }
}

/// Slot and full-screen observer sharing one log.
#[derive(Default, Clone)]
pub(crate) struct RecordingObserver {
    pub(crate) log: Arc<Mutex<Vec<String>>>,
}

impl RecordingObserver {
    pub(crate) fn entries(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub(crate) fn count(&self, entry: &str) -> usize {
        self.log.lock().iter().filter(|e| e.as_str() == entry).count()
    }
}

impl SlotObserver for RecordingObserver {
    fn did_record_impression(&self, _ad: &LoadedAd) {
        self.log.lock().push("impression".to_string());
    }

    fn did_click(&self, _ad: &LoadedAd) {
        self.log.lock().push("click".to_string());
    }

    fn did_reward(&self, _ad: &LoadedAd) {
        self.log.lock().push("reward".to_string());
    }

    fn did_dismiss(&self, _ad: &LoadedAd, error: Option<crate::MediationError>) {
        let entry = match error {
            Some(error) => format!("dismiss:{}", error.as_label()),
            None => "dismiss".to_string(),
        };
        self.log.lock().push(entry);
    }

    fn did_expire(&self, _ad: &LoadedAd) {
        self.log.lock().push("expire".to_string());
    }
}

impl FullscreenShowObserver for RecordingObserver {
    fn did_show_fullscreen_ad(&self) {
        self.log.lock().push("fullscreen-show".to_string());
    }

    fn did_close_fullscreen_ad(&self) {
        self.log.lock().push("fullscreen-close".to_string());
    }
}

/// Loader that fabricates ads from a single adapter, bypassing auction and waterfall.
pub(crate) struct MockLoader {
    adapter: Arc<MockAdapter>,
    hold: bool,
    pub(crate) calls: AtomicUsize,
    pending: Mutex<Vec<(LoadRequest, Completion<AdLoadResult>)>>,
    delegate: Mutex<Option<Weak<dyn PartnerAdDelegate>>>,
}

impl MockLoader {
    /// Completes every load right away.
    pub(crate) fn immediate(adapter: Arc<MockAdapter>) -> Self {
        Self::new(adapter, false)
    }

    /// Keeps every load pending until [`MockLoader::release`].
    pub(crate) fn holding(adapter: Arc<MockAdapter>) -> Self {
        Self::new(adapter, true)
    }

    fn new(adapter: Arc<MockAdapter>, hold: bool) -> Self {
        Self {
            adapter,
            hold,
            calls: AtomicUsize::new(0),
            pending: Mutex::new(Vec::new()),
            delegate: Mutex::new(None),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    /// The delegate the last load was given: the slot itself.
    pub(crate) fn delegate(&self) -> Option<Arc<dyn PartnerAdDelegate>> {
        self.delegate.lock().as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn release(&self) -> bool {
        let pending = self.pending.lock().pop();
        match pending {
            Some((request, completion)) => {
                completion(Ok(self.loaded(request)));
                true
            }
            None => false,
        }
    }

    fn loaded(&self, request: LoadRequest) -> Arc<LoadedAd> {
        let mut bid = bid("bid-1", "mock");
        bid.rewarded_callback = Some(crate::ads::RewardedCallback {
            url: "https://example.invalid/reward".to_string(),
            method: "POST".to_string(),
            body: None,
            max_retries: 2,
        });
        let partner_request = PartnerAdLoadRequest::for_bid(&bid, &request);
        let ad = self.adapter.detached_ad(partner_request);
        let handle = PartnerAdHandle::new(bid.partner_id.clone(), ad, Arc::clone(&self.adapter) as Arc<dyn PartnerAdapter>);
        let size = request.size;
        Arc::new(LoadedAd::new(bid, handle, size, request))
    }
}

impl AdLoader for MockLoader {
    fn load(
        &self,
        request: LoadRequest,
        _viewport: Option<Viewport>,
        delegate: Weak<dyn PartnerAdDelegate>,
        completion: Completion<AdLoadResult>,
    ) {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        *self.delegate.lock() = Some(delegate);
        if self.hold {
            self.pending.lock().push((request, completion));
        } else {
            completion(Ok(self.loaded(request)));
        }
    }
}

/// Engine pieces a partner-level test needs.
pub(crate) struct Harness {
    pub(crate) dispatcher: crate::dispatch::Dispatcher,
    pub(crate) bus: crate::events::Bus,
    pub(crate) consent: Arc<crate::partners::ConsentSettings>,
    pub(crate) controller: crate::partners::PartnerAdapterController,
}

impl Harness {
    /// Controller over `adapters`, not set up yet.
    pub(crate) fn new(config: MediationConfig, adapters: &[Arc<MockAdapter>]) -> Self {
        init_test_logging();
        let dispatcher = crate::dispatch::Dispatcher::new().expect("dispatcher");
        let bus = crate::events::Bus::new(256);
        let consent = Arc::new(crate::partners::ConsentSettings::new());
        let factory = adapters.iter().fold(crate::partners::AdapterFactory::new(), |factory, adapter| {
            let adapter = Arc::clone(adapter);
            factory.with_adapter(adapter.id, move || Arc::clone(&adapter) as Arc<dyn PartnerAdapter>)
        });
        let controller = crate::partners::PartnerAdapterController::new(
            dispatcher.clone(),
            config,
            bus.clone(),
            Arc::clone(&consent),
            factory,
        );
        Self {
            dispatcher,
            bus,
            consent,
            controller,
        }
    }

    /// Controller whose adapters all went through setup.
    pub(crate) fn ready(config: MediationConfig, adapters: &[Arc<MockAdapter>]) -> Self {
        let harness = Self::new(config, adapters);
        let ids: Vec<&'static str> = adapters.iter().map(|a| a.id).collect();
        let (done, rx) = completion_channel();
        harness
            .controller
            .set_up_adapters(credentials(&ids), names(&ids), HashSet::new(), Box::new(done));
        rx.recv_timeout(WAIT).expect("adapter setup completed");
        harness
    }
}

pub(crate) fn credentials(ids: &[&str]) -> HashMap<crate::partners::PartnerId, HashMap<String, String>> {
    ids.iter()
        .map(|id| (Arc::from(*id), HashMap::from([("app_id".to_string(), format!("{id}-app"))])))
        .collect()
}

pub(crate) fn names(ids: &[&str]) -> HashSet<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

/// Waits for the next event of `kind`, skipping others.
pub(crate) fn next_event(
    rx: &mut tokio::sync::broadcast::Receiver<crate::events::Event>,
    kind: crate::events::EventKind,
) -> Option<crate::events::Event> {
    use tokio::sync::broadcast::error::TryRecvError;

    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        match rx.try_recv() {
            Ok(event) if event.kind == kind => return Some(event),
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty) => thread::sleep(Duration::from_millis(5)),
            Err(TryRecvError::Closed) => return None,
        }
    }
    None
}
