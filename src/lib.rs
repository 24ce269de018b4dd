//! # adflow
//!
//! **adflow** is a client-side ad mediation engine. It runs a backend auction,
//! then walks the winning bids one at a time against pluggable ad network
//! adapters until one of them delivers an ad, while slot controllers track the
//! load/show life cycle of each ad unit.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │AdSlotCtrl #1 │   │AdSlotCtrl #2 │   │AdSlotCtrl #3 │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  AdLoader (AuctionAdLoader)                                       │
//! │  - LoadRateLimiter (per placement cool-down)                      │
//! │  - bidder tokens ──► AuctionService ──► BidFulfillOperation       │
//! └──────┬────────────────────────────────────────────────────────────┘
//!        ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  PartnerAdapterController                                         │
//! │  - adapters (set up once, in parallel, bounded by a timeout)      │
//! │  - storage of live partner ads (race guard for late callbacks)    │
//! │  - consent relay                                                  │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   PartnerAdapter     PartnerAdapter     PartnerAdapter
//!
//! Every stage hops through the Dispatcher:
//!   main context ─────── UI-affine work (banner creation/load, show)
//!   background context ─ all shared state (storage, registry, slot state)
//!   timer driver ──────── DispatchTask countdowns, subscriber workers
//!
//! Metrics:
//!   publish(Event) ──► Bus ──► listener ──► SubscriberSet ──► worker per Subscribe
//! ```
//!
//! ### Load
//! ```text
//! AdSlotController::load_ad
//!   ├─ not initialized ─► LoadFailureMediationNotInitialized
//!   ├─ loading ─────────► dropped (the first caller gets the result)
//!   ├─ loaded ──────────► cached ad
//!   └─ AdLoader::load
//!        ├─ rate limited ─► LoadFailureRateLimited
//!        └─ tokens ─► auction ─► waterfall:
//!              loop {
//!                ├─ no bids left ─► WaterfallExhaustedNoFill (all per-bid errors)
//!                ├─ slot gone ────► Aborted
//!                └─ route_load(bid) vs load timeout
//!                     ├─ ok first ──► LoadedAd
//!                     └─ err/timeout ► next bid
//!              }
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                         |
//! |-------------------|----------------------------------------------------------|--------------------------------------------|
//! | **Dispatch**      | Serial contexts, delayed/pausable tasks, task groups.    | [`Dispatcher`], [`DispatchTask`], [`TaskGroup`] |
//! | **Partners**      | Adapter contracts and the routing controller.            | [`PartnerAdapter`], [`PartnerAdapterController`] |
//! | **Loading**       | Rate limiting, bid waterfall, auction-backed loader.     | [`BidFulfillOperation`], [`AdLoader`]      |
//! | **Slots**         | Per ad unit load/show life cycle.                        | [`AdSlotController`], [`SlotObserver`]     |
//! | **Metrics**       | Events fanned out to pluggable subscribers.              | [`Event`], [`Subscribe`]                   |
//! | **Errors**        | Typed error codes and partner error mapping.             | [`ErrorCode`], [`MediationError`]          |
//! | **Configuration** | Timeouts and switches, passed at construction.           | [`MediationConfig`]                        |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] subscriber.

pub mod ads;
mod core;
pub mod dispatch;
mod error;
pub mod events;
pub mod loading;
pub mod partners;
pub mod slot;
pub mod subscribers;

#[cfg(test)]
mod test_support;

// ---- Public re-exports ----

pub use core::{Mediation, MediationBuilder, MediationConfig};
pub use dispatch::{Context, DispatchTask, Dispatcher, Finished, TaskGroup, TaskState};
pub use error::{BuildError, DispatchError, ErrorCode, MediationError, PartnerError};
pub use events::{Event, EventKind, MetricsEvent};
pub use loading::{AdLoader, BidFulfillOperation, LoadRateLimiter};
pub use partners::{PartnerAdapter, PartnerAdapterController};
pub use slot::{AdSlotController, SlotObserver};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
