//! Execution contexts, delayed tasks and task groups.
//!
//! Every other subsystem hops through a [`Dispatcher`] before touching shared
//! state: the partner registry, ad storage and slot state are only mutated from
//! the [`Context::Background`] queue, so "pop the next bid" or "check storage
//! before delivering a completion" need no extra locking.
//!
//! ## Contents
//! - [`Dispatcher`] `dispatch` / `sync` / `after` / `schedule` / `group`
//! - [`Context`] the two serial contexts
//! - [`DispatchTask`], [`TaskState`] cancellable, pausable delayed work
//! - [`TaskGroup`], [`Finished`] fan-out/fan-in with a single timed completion

mod context;
mod dispatcher;
mod group;
mod queue;
mod task;

pub use context::Context;
pub use dispatcher::Dispatcher;
pub use group::{Finished, TaskGroup};
pub use task::{DispatchTask, TaskState};

pub(crate) use queue::panic_message;
