//! # Fan-out/fan-in task group with timeout.
//!
//! [`TaskGroup`] runs N independent units and invokes a single completion once
//! every unit reported [`Finished::finish`] or the timeout elapsed, whichever
//! happens first.
//!
//! ## Rules
//! - The completion fires **exactly once**.
//! - `on_all_finished` with nothing pending fires right away on the group's context.
//! - Units added after `on_all_finished` but before it fired still count.
//! - `finish` calls after the completion fired are accepted and ignored.
//! - Units added after the completion fired still run; they no longer affect it.
//!
//! ```text
//!   add(unit) ──► pending += 1 ──► [ctx] unit(Finished) ─ ... ─► finish() ─► pending -= 1
//!                                                                     │
//!   on_all_finished(timeout, done) ──► armed ◄────────────────────────┘ pending == 0
//!                                        │                                   │
//!                                        └─► timeout task ──► fire ◄─────────┘
//!                                                             (first one wins)
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::context::Context;
use super::dispatcher::Dispatcher;
use super::task::DispatchTask;

type Completion = Box<dyn FnOnce() + Send + 'static>;

enum Continuation {
    Unset,
    Armed(Completion),
    Fired,
}

struct GroupState {
    pending: usize,
    continuation: Continuation,
    timeout: Option<DispatchTask>,
}

/// Handle to a fan-out/fan-in group. Cheap to clone.
#[derive(Clone)]
pub struct TaskGroup {
    dispatcher: Dispatcher,
    context: Context,
    state: Arc<Mutex<GroupState>>,
}

/// Token handed to every unit; consuming it reports the unit as done.
#[must_use = "a unit must call `finish` exactly once"]
pub struct Finished {
    group: TaskGroup,
}

impl Finished {
    /// Reports the unit as done. Callable from any thread.
    pub fn finish(self) {
        self.group.unit_finished();
    }
}

impl TaskGroup {
    pub(super) fn new(dispatcher: Dispatcher, context: Context) -> Self {
        Self {
            dispatcher,
            context,
            state: Arc::new(Mutex::new(GroupState {
                pending: 0,
                continuation: Continuation::Unset,
                timeout: None,
            })),
        }
    }

    /// Registers a unit and schedules it on the group's context.
    pub fn add(&self, unit: impl FnOnce(Finished) + Send + 'static) {
        self.state.lock().pending += 1;
        let finished = Finished { group: self.clone() };
        self.dispatcher.dispatch(self.context, move || unit(finished));
    }

    /// Arms the single completion.
    ///
    /// ### Notes
    /// A second call is ignored (logged): the first completion stays armed.
    pub fn on_all_finished(&self, timeout: Duration, completion: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock();
        if !matches!(state.continuation, Continuation::Unset) {
            tracing::warn!(context = %self.context, "task group completion already set; ignoring");
            return;
        }
        if state.pending == 0 {
            state.continuation = Continuation::Fired;
            drop(state);
            self.run_on_context(Box::new(completion));
            return;
        }
        state.continuation = Continuation::Armed(Box::new(completion));
        let group = self.clone();
        state.timeout = Some(self.dispatcher.schedule(self.context, timeout, move || {
            group.timed_out();
        }));
    }

    /// Number of units that have not finished yet.
    pub fn pending(&self) -> usize {
        self.state.lock().pending
    }

    fn unit_finished(&self) {
        let completion = {
            let mut state = self.state.lock();
            state.pending = state.pending.saturating_sub(1);
            if state.pending > 0 {
                return;
            }
            take_armed(&mut state)
        };
        if let Some((completion, timeout)) = completion {
            drop(timeout);
            self.run_on_context(completion);
        }
    }

    fn timed_out(&self) {
        let completion = {
            let mut state = self.state.lock();
            if state.pending > 0 {
                tracing::debug!(pending = state.pending, context = %self.context, "task group timed out");
            }
            take_armed(&mut state)
        };
        // Already on the group's context: the timer fired there.
        if let Some((completion, timeout)) = completion {
            drop(timeout);
            completion();
        }
    }

    fn run_on_context(&self, completion: Completion) {
        if self.dispatcher.is_current(self.context) {
            completion();
        } else {
            self.dispatcher.dispatch(self.context, completion);
        }
    }
}

fn take_armed(state: &mut GroupState) -> Option<(Completion, Option<DispatchTask>)> {
    match std::mem::replace(&mut state.continuation, Continuation::Fired) {
        Continuation::Armed(completion) => Some((completion, state.timeout.take())),
        other => {
            state.continuation = other;
            None
        }
    }
}
