use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::sync::broadcast::error::RecvError;

use super::config::MediationConfig;
use super::mediation::Mediation;
use crate::dispatch::Dispatcher;
use crate::error::BuildError;
use crate::events::Bus;
use crate::loading::{AdLoader, AuctionAdLoader, AuctionService, LoadRateLimiter};
use crate::partners::{AdapterFactory, ConsentSettings, PartnerAdapterController};
use crate::slot::FullscreenShowObserver;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for [`Mediation`].
pub struct MediationBuilder {
    config: MediationConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    factory: AdapterFactory,
    auction: Option<Arc<dyn AuctionService>>,
    loader: Option<Arc<dyn AdLoader>>,
    consent: Option<Arc<ConsentSettings>>,
    fullscreen_observer: Option<Arc<dyn FullscreenShowObserver>>,
}

impl MediationBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(config: MediationConfig) -> Self {
        Self {
            config,
            subscribers: Vec::new(),
            factory: AdapterFactory::new(),
            auction: None,
            loader: None,
            consent: None,
            fullscreen_observer: None,
        }
    }

    /// Sets metrics subscribers.
    ///
    /// Each one gets a dedicated worker with a bounded queue.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adapters available to [`Mediation::initialize`].
    pub fn with_adapters(mut self, factory: AdapterFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Auction backend used by the default loader.
    pub fn with_auction_service(mut self, auction: Arc<dyn AuctionService>) -> Self {
        self.auction = Some(auction);
        self
    }

    /// Replaces the auction-backed loader altogether.
    pub fn with_loader(mut self, loader: Arc<dyn AdLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Shares an existing consent store instead of creating one.
    pub fn with_consent(mut self, consent: Arc<ConsentSettings>) -> Self {
        self.consent = Some(consent);
        self
    }

    pub fn with_fullscreen_observer(mut self, observer: Arc<dyn FullscreenShowObserver>) -> Self {
        self.fullscreen_observer = Some(observer);
        self
    }

    /// Starts the dispatcher and wires every component.
    ///
    /// ### Errors
    /// - [`BuildError::MissingLoader`] if neither an auction service nor a loader was given
    /// - [`BuildError::Dispatcher`] if the context threads could not start
    pub fn build(self) -> Result<Mediation, BuildError> {
        if self.loader.is_none() && self.auction.is_none() {
            return Err(BuildError::MissingLoader);
        }

        let dispatcher = Dispatcher::new()?;
        let bus = Bus::new(self.config.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone(), dispatcher.driver()));
        if !subs.is_empty() {
            subscriber_listener(&dispatcher, &bus, subs);
        }

        let consent = self.consent.unwrap_or_default();
        let partners = PartnerAdapterController::new(
            dispatcher.clone(),
            self.config.clone(),
            bus.clone(),
            Arc::clone(&consent),
            self.factory,
        );
        let rate_limiter = Arc::new(LoadRateLimiter::new());

        let loader = match (self.loader, self.auction) {
            (Some(loader), _) => loader,
            (None, Some(auction)) => Arc::new(AuctionAdLoader::new(
                dispatcher.clone(),
                self.config.clone(),
                bus.clone(),
                Arc::new(partners.clone()),
                auction,
                rate_limiter.clone(),
            )),
            (None, None) => return Err(BuildError::MissingLoader),
        };

        Ok(Mediation {
            dispatcher,
            config: self.config,
            bus,
            consent,
            rate_limiter,
            partners,
            loader,
            initialized: Arc::new(AtomicBool::new(false)),
            fullscreen_observer: self.fullscreen_observer,
        })
    }
}

/// Forwards bus events to the subscriber set (fire-and-forget).
fn subscriber_listener(dispatcher: &Dispatcher, bus: &Bus, subs: Arc<SubscriberSet>) {
    let mut rx = bus.subscribe();
    dispatcher.spawn_driver(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => subs.emit_arc(Arc::new(ev)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "metrics listener lagged behind the bus");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
