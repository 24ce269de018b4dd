//! # Load-result producers.
//!
//! A slot hands its request to an [`AdLoader`] and gets back a [`LoadedAd`] or
//! an error. [`AuctionAdLoader`] is the production loader:
//!
//! ```text
//! rate limited? ── yes ──► LoadFailureRateLimited
//!      │ no
//!      ▼
//! bidder tokens ──► AuctionService ──► rate-limit reset ──► BidFulfillOperation ──► LoadedAd
//!                        │ error                                     │
//!                        └──► Load event (when an auction id exists) └──► Load event, AuctionCompleted
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::ads::{Bid, LoadRequest, LoadedAd, PreBidRequest, Viewport};
use crate::core::MediationConfig;
use crate::dispatch::Dispatcher;
use crate::error::{ErrorCode, MediationError};
use crate::events::{Bus, Event, EventKind};
use crate::loading::{BidFulfillOperation, LoadRateLimiting};
use crate::partners::{BidderTokens, Completion, PartnerAdDelegate, PartnerController};

/// Outcome a slot receives from its loader.
pub type AdLoadResult = Result<Arc<LoadedAd>, MediationError>;

/// Produces loaded ads for slots.
pub trait AdLoader: Send + Sync + 'static {
    /// Loads an ad for `request`; `completion` may run on any thread.
    ///
    /// Partner events of the loaded ad are reported to `delegate`.
    fn load(
        &self,
        request: LoadRequest,
        viewport: Option<Viewport>,
        delegate: Weak<dyn PartnerAdDelegate>,
        completion: Completion<AdLoadResult>,
    );
}

/// Answer of the auction backend.
#[derive(Debug, Clone)]
pub struct AuctionResponse {
    pub auction_id: Option<Arc<str>>,
    /// Ranked bids, best first.
    pub bids: Result<Vec<Bid>, MediationError>,
    /// Cool-down the backend asks for on this placement.
    pub load_rate_limit: Option<Duration>,
}

/// External auction backend.
pub trait AuctionService: Send + Sync + 'static {
    fn start_auction(&self, request: &LoadRequest, tokens: BidderTokens, completion: Completion<AuctionResponse>);
}

/// [`AdLoader`] running token collection, the auction and the bid waterfall.
#[derive(Clone)]
pub struct AuctionAdLoader {
    dispatcher: Dispatcher,
    config: MediationConfig,
    bus: Bus,
    partners: Arc<dyn PartnerController>,
    auction: Arc<dyn AuctionService>,
    rate_limiter: Arc<dyn LoadRateLimiting>,
}

impl AuctionAdLoader {
    pub fn new(
        dispatcher: Dispatcher,
        config: MediationConfig,
        bus: Bus,
        partners: Arc<dyn PartnerController>,
        auction: Arc<dyn AuctionService>,
        rate_limiter: Arc<dyn LoadRateLimiting>,
    ) -> Self {
        Self {
            dispatcher,
            config,
            bus,
            partners,
            auction,
            rate_limiter,
        }
    }

    fn auction_finished(
        &self,
        request: LoadRequest,
        viewport: Option<Viewport>,
        delegate: Weak<dyn PartnerAdDelegate>,
        response: AuctionResponse,
        completion: Completion<AdLoadResult>,
    ) {
        if let Some(limit) = response.load_rate_limit {
            self.rate_limiter.set_load_rate_limit(limit, &request.placement);
        }
        let bids = match response.bids {
            Ok(bids) => bids,
            Err(error) => {
                tracing::error!(placement = %request.placement, error = %error, "auction failed");
                if let Some(auction_id) = &response.auction_id {
                    self.bus.publish(
                        load_event(&request, auction_id.clone()).with_error(Some(error.clone())),
                    );
                }
                completion(Err(error));
                return;
            }
        };
        let auction_id = response
            .auction_id
            .or_else(|| bids.first().map(|bid| bid.auction_id.clone()));
        tracing::debug!(placement = %request.placement, bids = bids.len(), "auction returned bids");

        let operation = BidFulfillOperation::new(
            self.dispatcher.clone(),
            self.config.clone(),
            Arc::clone(&self.partners),
            bids,
            request.clone(),
            viewport,
            delegate,
        );
        let bus = self.bus.clone();
        operation.run(move |outcome| {
            if let Some(auction_id) = auction_id {
                bus.publish(
                    load_event(&request, auction_id)
                        .with_error(outcome.result.as_ref().err().cloned())
                        .with_records(outcome.load_events),
                );
            }
            match outcome.result {
                Ok(fulfilled) => {
                    let loaded = LoadedAd::new(fulfilled.bid, fulfilled.ad, fulfilled.size, request);
                    bus.publish(Event::for_ad(EventKind::AuctionCompleted, &loaded));
                    completion(Ok(Arc::new(loaded)));
                }
                Err(error) => completion(Err(error)),
            }
        });
    }
}

impl AdLoader for AuctionAdLoader {
    fn load(
        &self,
        request: LoadRequest,
        viewport: Option<Viewport>,
        delegate: Weak<dyn PartnerAdDelegate>,
        completion: Completion<AdLoadResult>,
    ) {
        if self.config.rate_limiting_enabled {
            let wait = self.rate_limiter.time_until_next_load_is_allowed(&request.placement);
            if !wait.is_zero() {
                tracing::warn!(placement = %request.placement, wait = ?wait, "load rate limited");
                completion(Err(MediationError::new(ErrorCode::LoadFailureRateLimited).with_description(
                    format!(
                        "placement {} is rate limited; retry in {:.1}s",
                        request.placement,
                        wait.as_secs_f64()
                    ),
                )));
                return;
            }
        }

        let this = self.clone();
        self.partners.route_fetch_bidder_information(
            PreBidRequest::from(&request),
            Box::new(move |tokens| {
                let auction = Arc::clone(&this.auction);
                let for_auction = request.clone();
                auction.start_auction(
                    &for_auction,
                    tokens,
                    Box::new(move |response| this.auction_finished(request, viewport, delegate, response, completion)),
                );
            }),
        );
    }
}

fn load_event(request: &LoadRequest, auction_id: Arc<str>) -> Event {
    Event::new(EventKind::Load)
        .with_placement(request.placement.clone())
        .with_load_id(request.load_id.as_str())
        .with_auction_id(auction_id)
        .with_format(request.format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loading::LoadRateLimiter;
    use crate::test_support::{
        Harness, MockAdapter, RecordingDelegate, WAIT, bid, completion_channel, fast_config, fullscreen_request,
        next_event,
    };
    use parking_lot::Mutex;

    /// Answers every auction with a fixed response.
    struct ScriptedAuction {
        response: AuctionResponse,
        tokens: Mutex<Option<BidderTokens>>,
    }

    impl ScriptedAuction {
        fn new(bids: Result<Vec<Bid>, MediationError>, limit: Option<Duration>) -> Self {
            Self {
                response: AuctionResponse {
                    auction_id: Some(Arc::from("auction-1")),
                    bids,
                    load_rate_limit: limit,
                },
                tokens: Mutex::new(None),
            }
        }
    }

    impl AuctionService for ScriptedAuction {
        fn start_auction(&self, _request: &LoadRequest, tokens: BidderTokens, completion: Completion<AuctionResponse>) {
            *self.tokens.lock() = Some(tokens);
            completion(self.response.clone());
        }
    }

    struct Fixture {
        harness: Harness,
        auction: Arc<ScriptedAuction>,
        limiter: Arc<LoadRateLimiter>,
        loader: AuctionAdLoader,
        delegate: Arc<RecordingDelegate>,
    }

    impl Fixture {
        fn new(auction: ScriptedAuction) -> Self {
            let harness = Harness::ready(fast_config(), &[Arc::new(MockAdapter::new("alpha"))]);
            let auction = Arc::new(auction);
            let limiter = Arc::new(LoadRateLimiter::new());
            let loader = AuctionAdLoader::new(
                harness.dispatcher.clone(),
                fast_config(),
                harness.bus.clone(),
                Arc::new(harness.controller.clone()),
                auction.clone(),
                limiter.clone(),
            );
            Self {
                harness,
                auction,
                limiter,
                loader,
                delegate: Arc::new(RecordingDelegate::default()),
            }
        }

        fn load(&self) -> AdLoadResult {
            let delegate = Arc::downgrade(&self.delegate);
            let delegate: Weak<dyn PartnerAdDelegate> = delegate;
            let (done, rx) = completion_channel();
            self.loader.load(fullscreen_request(), None, delegate, Box::new(done));
            rx.recv_timeout(WAIT).expect("load finished")
        }
    }

    #[test]
    fn test_load_runs_tokens_auction_and_waterfall() {
        let f = Fixture::new(ScriptedAuction::new(Ok(vec![bid("b1", "alpha")]), Some(Duration::from_secs(30))));
        let mut events = f.harness.bus.subscribe();

        let loaded = f.load().expect("loaded");
        assert_eq!(&*loaded.bid.id, "b1");
        assert_eq!(&*loaded.request.placement, "placement-1");

        let tokens = f.auction.tokens.lock().clone().expect("auction started");
        assert!(tokens.contains_key("alpha"));

        let load = next_event(&mut events, EventKind::Load).expect("load event");
        assert_eq!(load.records.len(), 1);
        assert!(load.error.is_none());
        assert!(next_event(&mut events, EventKind::AuctionCompleted).is_some());

        assert!(f.limiter.time_until_next_load_is_allowed("placement-1") > Duration::from_secs(29));
    }

    #[test]
    fn test_rate_limited_placement_fails_fast() {
        let f = Fixture::new(ScriptedAuction::new(Ok(vec![bid("b1", "alpha")]), None));
        f.limiter.set_load_rate_limit(Duration::from_secs(10), "placement-1");

        let error = f.load().expect_err("rate limited");
        assert_eq!(error.code, ErrorCode::LoadFailureRateLimited);
        assert!(error.description.as_deref().is_some_and(|d| d.contains("retry in")));
        assert!(f.auction.tokens.lock().is_none(), "no auction while rate limited");
    }

    #[test]
    fn test_auction_error_is_reported_with_load_event() {
        let failure = MediationError::new(ErrorCode::LoadFailureUnknown).with_description("no bid");
        let f = Fixture::new(ScriptedAuction::new(Err(failure), None));
        let mut events = f.harness.bus.subscribe();

        let error = f.load().expect_err("auction failed");
        assert_eq!(error.code, ErrorCode::LoadFailureUnknown);
        let load = next_event(&mut events, EventKind::Load).expect("load event");
        assert_eq!(load.error.map(|e| e.code), Some(ErrorCode::LoadFailureUnknown));
        assert!(load.records.is_empty());
    }
}
