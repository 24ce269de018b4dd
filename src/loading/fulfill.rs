//! # Bid waterfall.
//!
//! [`BidFulfillOperation`] walks the auction's bids front to back and asks the
//! partner layer to load each one until a load succeeds.
//!
//! ```text
//! run ──► [background] bids empty? ── yes ──► no-fill (aggregated errors)
//!                 │ no
//!                 ▼
//!           delegate gone? ── yes ──► aborted
//!                 │ no
//!                 ▼
//!          pop bid, arm timeout, route_load ──┬─ timeout first ──► cancel load, record timeout ─┐
//!                                             └─ partner first ──► cancel timeout, record ──────┤
//!                                                                   ├─ ok ──► success           │
//!                                                                   └─ err ─────────────────────┴─► next bid
//! ```
//!
//! ## Rules
//! - One terminal outcome per operation; a second `run` fails right away.
//! - Every attempt leaves exactly one metrics record.
//! - The loser of the timeout/completion race is recognised by attempt id, never by bid contents.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;

use crate::ads::{BannerSize, Bid, LoadRequest, PartnerAdLoadRequest, Viewport};
use crate::core::MediationConfig;
use crate::dispatch::{Context, DispatchTask, Dispatcher};
use crate::error::{ErrorCode, MediationError};
use crate::events::MetricsEvent;
use crate::partners::{CancelAction, Completion, PartnerAdDelegate, PartnerAdHandle, PartnerController};

/// Winning bid and the partner ad that fulfilled it.
#[derive(Debug, Clone)]
pub struct FulfilledBid {
    pub bid: Bid,
    pub ad: PartnerAdHandle,
    /// Banner size to lay out, `None` for full-screen ads.
    pub size: Option<BannerSize>,
}

/// Terminal outcome plus one metrics record per attempted bid.
#[derive(Debug)]
pub struct BidFulfillResult {
    pub result: Result<FulfilledBid, MediationError>,
    pub load_events: Vec<MetricsEvent>,
}

struct Attempt {
    id: u64,
    bid: Bid,
    start: Instant,
    timeout: DispatchTask,
    cancel: Option<CancelAction>,
}

struct Waterfall {
    bids: VecDeque<Bid>,
    has_run: bool,
    next_attempt: u64,
    attempt: Option<Attempt>,
    events: Vec<MetricsEvent>,
    completion: Option<Completion<BidFulfillResult>>,
}

struct Operation {
    dispatcher: Dispatcher,
    config: MediationConfig,
    partners: Arc<dyn PartnerController>,
    request: LoadRequest,
    viewport: Option<Viewport>,
    delegate: Weak<dyn PartnerAdDelegate>,
    state: Mutex<Waterfall>,
}

/// Single-use waterfall over one auction's bids.
pub struct BidFulfillOperation {
    op: Arc<Operation>,
}

impl BidFulfillOperation {
    pub fn new(
        dispatcher: Dispatcher,
        config: MediationConfig,
        partners: Arc<dyn PartnerController>,
        bids: Vec<Bid>,
        request: LoadRequest,
        viewport: Option<Viewport>,
        delegate: Weak<dyn PartnerAdDelegate>,
    ) -> Self {
        Self {
            op: Arc::new(Operation {
                dispatcher,
                config,
                partners,
                request,
                viewport,
                delegate,
                state: Mutex::new(Waterfall {
                    bids: bids.into(),
                    has_run: false,
                    next_attempt: 0,
                    attempt: None,
                    events: Vec::new(),
                    completion: None,
                }),
            }),
        }
    }

    /// Starts the waterfall. `completion` runs once, on the background context.
    ///
    /// ### Errors (through `completion`)
    /// - `LoadFailureUnknown` with no records if the operation already ran
    /// - `LoadFailureWaterfallExhaustedNoFill` with every per-bid error once bids run out
    /// - `LoadFailureAborted` if the delegate is gone before the next attempt
    pub fn run(&self, completion: impl FnOnce(BidFulfillResult) + Send + 'static) {
        let op = Arc::clone(&self.op);
        self.op.dispatcher.dispatch(Context::Background, move || {
            if std::mem::replace(&mut op.state.lock().has_run, true) {
                tracing::error!(placement = %op.request.placement, "bid fulfillment already ran");
                completion(BidFulfillResult {
                    result: Err(MediationError::new(ErrorCode::LoadFailureUnknown)
                        .with_description("bid fulfillment operation already ran")),
                    load_events: Vec::new(),
                });
                return;
            }
            op.state.lock().completion = Some(Box::new(completion));
            op.attempt_next();
        });
    }
}

impl Operation {
    fn fulfill_next(self: &Arc<Self>) {
        let op = Arc::clone(self);
        self.dispatcher.dispatch(Context::Background, move || op.attempt_next());
    }

    /// Background context only.
    fn attempt_next(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if state.bids.is_empty() {
            let errors: Vec<MediationError> = state.events.iter().filter_map(|e| e.error.clone()).collect();
            drop(state);
            tracing::warn!(placement = %self.request.placement, attempts = errors.len(), "waterfall exhausted");
            self.finish(Err(MediationError::new(ErrorCode::LoadFailureWaterfallExhaustedNoFill)
                .with_underlying(errors)));
            return;
        }
        if self.delegate.upgrade().is_none() {
            drop(state);
            tracing::warn!(placement = %self.request.placement, "ad released during waterfall; aborting");
            self.finish(Err(MediationError::new(ErrorCode::LoadFailureAborted)
                .with_description("the ad requesting the load was released")));
            return;
        }
        let Some(bid) = state.bids.pop_front() else { return };

        let attempt_id = state.next_attempt;
        state.next_attempt += 1;
        let op = Arc::clone(self);
        let timeout = self.dispatcher.schedule(
            Context::Background,
            self.config.load_timeout(self.request.format),
            move || op.timed_out(attempt_id),
        );
        tracing::debug!(
            placement = %self.request.placement,
            partner = %bid.partner_id,
            auction_id = %bid.auction_id,
            "attempting bid"
        );
        let partner_request = PartnerAdLoadRequest::for_bid(&bid, &self.request);
        state.attempt = Some(Attempt {
            id: attempt_id,
            bid,
            start: Instant::now(),
            timeout,
            cancel: None,
        });
        drop(state);

        let op = Arc::clone(self);
        let cancel = self.partners.route_load(
            partner_request,
            self.viewport.clone(),
            self.delegate.clone(),
            Box::new(move |result| {
                let dispatcher = op.dispatcher.clone();
                dispatcher.dispatch(Context::Background, move || op.load_finished(attempt_id, result));
            }),
        );
        if let Some(attempt) = self.state.lock().attempt.as_mut().filter(|a| a.id == attempt_id) {
            attempt.cancel = Some(cancel);
        }
    }

    fn take_attempt(&self, attempt_id: u64) -> Option<Attempt> {
        let mut state = self.state.lock();
        match &state.attempt {
            Some(attempt) if attempt.id == attempt_id => state.attempt.take(),
            _ => None,
        }
    }

    /// Background context only.
    fn timed_out(self: &Arc<Self>, attempt_id: u64) {
        let Some(attempt) = self.take_attempt(attempt_id) else {
            return;
        };
        tracing::warn!(
            placement = %self.request.placement,
            partner = %attempt.bid.partner_id,
            "partner load timed out"
        );
        if let Some(cancel) = attempt.cancel {
            cancel();
        }
        let error = MediationError::new(ErrorCode::LoadFailureTimeout);
        self.state
            .lock()
            .events
            .push(MetricsEvent::for_bid(&attempt.bid, attempt.start, Some(error)));
        self.fulfill_next();
    }

    /// Background context only.
    fn load_finished(self: &Arc<Self>, attempt_id: u64, result: Result<PartnerAdHandle, MediationError>) {
        let Some(attempt) = self.take_attempt(attempt_id) else {
            tracing::warn!(placement = %self.request.placement, "discarding load result of a finished attempt");
            return;
        };
        attempt.timeout.cancel();

        let outcome = result.and_then(|ad| self.sanitize(ad));
        self.state.lock().events.push(MetricsEvent::for_bid(
            &attempt.bid,
            attempt.start,
            outcome.as_ref().err().cloned(),
        ));
        match outcome {
            Ok((ad, size)) => self.finish(Ok(FulfilledBid {
                bid: attempt.bid,
                ad,
                size,
            })),
            Err(error) => {
                tracing::debug!(partner = %attempt.bid.partner_id, error = %error, "bid failed; moving on");
                self.fulfill_next();
            }
        }
    }

    /// Banner checks: a view must exist and, if requested, must not exceed the requested size.
    fn sanitize(&self, ad: PartnerAdHandle) -> Result<(PartnerAdHandle, Option<BannerSize>), MediationError> {
        if !self.request.format.is_banner() {
            return Ok((ad, None));
        }
        if !ad.ad().has_banner_view() {
            tracing::warn!(partner = %ad.partner_id(), "banner loaded without a view");
            self.partners.route_invalidate(&ad, Box::new(|_| {}));
            return Err(MediationError::new(ErrorCode::LoadFailureNoBannerView));
        }
        let requested = self.request.size;
        let size = ad
            .ad()
            .banner_size()
            .or_else(|| requested.map(|r| BannerSize::fixed(r.size.width, r.size.height)));
        let oversized = self.config.discard_oversized_ads
            && matches!((size, requested), (Some(size), Some(requested)) if size.exceeds(&requested));
        if oversized {
            tracing::warn!(partner = %ad.partner_id(), delivered = ?size, requested = ?requested, "banner larger than requested");
            self.partners.route_invalidate(&ad, Box::new(|_| {}));
            return Err(MediationError::new(ErrorCode::LoadFailureAdTooLarge));
        }
        Ok((ad, size))
    }

    fn finish(&self, result: Result<FulfilledBid, MediationError>) {
        let (completion, load_events) = {
            let mut state = self.state.lock();
            state.attempt = None;
            (state.completion.take(), std::mem::take(&mut state.events))
        };
        match &result {
            Ok(fulfilled) => tracing::info!(
                placement = %self.request.placement,
                partner = %fulfilled.bid.partner_id,
                attempts = load_events.len(),
                "bid fulfilled"
            ),
            Err(error) => tracing::warn!(
                placement = %self.request.placement,
                attempts = load_events.len(),
                error = %error,
                "bid fulfillment failed"
            ),
        }
        if let Some(completion) = completion {
            completion(BidFulfillResult { result, load_events });
        }
    }
}
