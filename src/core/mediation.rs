//! # Mediation: the engine's entry point.
//!
//! [`Mediation`] owns the dispatcher, the metrics bus, the consent store, the
//! rate limiter, the partner controller and the loader, and hands out
//! [`AdSlotController`]s wired to all of them.
//!
//! ## Example
//! ```no_run
//! use std::collections::{HashMap, HashSet};
//! use std::sync::Arc;
//! use adflow::{Mediation, MediationConfig};
//! use adflow::loading::{AuctionResponse, AuctionService};
//! use adflow::ads::LoadRequest;
//! use adflow::partners::{BidderTokens, Completion};
//!
//! struct Backend;
//!
//! impl AuctionService for Backend {
//!     fn start_auction(&self, _: &LoadRequest, _: BidderTokens, completion: Completion<AuctionResponse>) {
//!         completion(AuctionResponse { auction_id: None, bids: Ok(Vec::new()), load_rate_limit: None });
//!     }
//! }
//!
//! # fn main() -> Result<(), adflow::BuildError> {
//! let mediation = Mediation::builder(MediationConfig::default())
//!     .with_auction_service(Arc::new(Backend))
//!     .build()?;
//! mediation.initialize(HashMap::new(), HashSet::new(), HashSet::new(), |records| {
//!     println!("{} adapters reported", records.len());
//! });
//! let slot = mediation.make_slot();
//! # drop(slot);
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use super::builder::MediationBuilder;
use super::config::MediationConfig;
use crate::dispatch::Dispatcher;
use crate::events::{Bus, Event, MetricsEvent};
use crate::loading::{AdLoader, LoadRateLimiter};
use crate::partners::{ConsentSettings, PartnerAdapterController, PartnerId};
use crate::slot::{AdSlotController, FullscreenShowObserver, SlotParts};

/// Mediation engine. Build it with [`Mediation::builder`].
pub struct Mediation {
    pub(super) dispatcher: Dispatcher,
    pub(super) config: MediationConfig,
    pub(super) bus: Bus,
    pub(super) consent: Arc<ConsentSettings>,
    pub(super) rate_limiter: Arc<LoadRateLimiter>,
    pub(super) partners: PartnerAdapterController,
    pub(super) loader: Arc<dyn AdLoader>,
    pub(super) initialized: Arc<AtomicBool>,
    pub(super) fullscreen_observer: Option<Arc<dyn FullscreenShowObserver>>,
}

impl Mediation {
    pub fn builder(config: MediationConfig) -> MediationBuilder {
        MediationBuilder::new(config)
    }

    /// Sets up partner adapters, then marks the engine initialized.
    ///
    /// `credentials` is keyed by partner id; `enabled` names the adapters to
    /// instantiate; adapters in `skip` are reported as skipped. `completion`
    /// receives one setup record per adapter. Only the first call has an
    /// effect.
    pub fn initialize(
        &self,
        credentials: HashMap<PartnerId, HashMap<String, String>>,
        enabled: HashSet<String>,
        skip: HashSet<PartnerId>,
        completion: impl FnOnce(Vec<MetricsEvent>) + Send + 'static,
    ) {
        let initialized = Arc::clone(&self.initialized);
        self.partners.set_up_adapters(
            credentials,
            enabled,
            skip,
            Box::new(move |records| {
                initialized.store(true, AtomicOrdering::Release);
                tracing::info!(adapters = records.len(), "mediation initialized");
                completion(records);
            }),
        );
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(AtomicOrdering::Acquire)
    }

    /// Creates a slot controller for one ad unit.
    pub fn make_slot(&self) -> AdSlotController {
        AdSlotController::new(SlotParts {
            dispatcher: self.dispatcher.clone(),
            config: self.config.clone(),
            bus: self.bus.clone(),
            loader: Arc::clone(&self.loader),
            partners: Arc::new(self.partners.clone()),
            status: self.initialized.clone(),
            fullscreen_observer: self.fullscreen_observer.clone(),
        })
    }

    /// Receives every metrics event published from now on.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub fn consent(&self) -> &Arc<ConsentSettings> {
        &self.consent
    }

    pub fn rate_limiter(&self) -> &Arc<LoadRateLimiter> {
        &self.rate_limiter
    }

    pub fn partners(&self) -> &PartnerAdapterController {
        &self.partners
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &MediationConfig {
        &self.config
    }
}
