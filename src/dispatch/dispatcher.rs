//! # Task dispatcher: two serial contexts plus a timer driver.
//!
//! [`Dispatcher`] owns the `main` and `background` serial queues and a small
//! current-thread tokio runtime that hosts timers (and the metrics subscriber
//! workers wired by [`Mediation`](crate::Mediation)).
//!
//! ## Architecture
//! ```text
//!   dispatch(ctx, work) ──────────────────────────► [queue ctx] ──► ctx thread
//!   sync(ctx, work) ── push + wait on reply ──────► [queue ctx] ──► ctx thread ──► reply
//!        └─ caller already on ctx ──► run inline
//!
//!   schedule(ctx, delay, work) ──► driver runtime (sleep / pause / resume / cancel)
//!                                       │ deadline hit
//!                                       └──► [queue ctx] ──► DispatchTask::fire
//! ```
//!
//! ## Rules
//! - Work submitted to the same context from one calling sequence runs in FIFO order.
//! - `sync` never deadlocks on its own context: it detects the caller and runs inline.
//! - `sync(Main)` from background while main waits on `sync(Background)` deadlocks,
//!   as with any pair of serial queues; callers keep cross-context `sync` one-way.
//! - Dropping the last `Dispatcher` clone stops the driver runtime; queue threads
//!   exit after draining what was already submitted.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak, mpsc as std_mpsc};
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use tokio::runtime::{Builder, Handle};
use tokio_util::sync::CancellationToken;

use super::context::{self, Context};
use super::group::TaskGroup;
use super::queue::{Job, SerialQueue};
use super::task::DispatchTask;
use crate::error::DispatchError;

static DISPATCHER_IDS: AtomicU64 = AtomicU64::new(1);

/// Executes work on the `main` and `background` contexts.
///
/// Cheap to clone; all clones share the same queues and timer driver.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    id: u64,
    main: SerialQueue,
    background: SerialQueue,
    driver: Handle,
    shutdown: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Non-owning dispatcher reference held by timers.
#[derive(Clone)]
pub(crate) struct WeakDispatcher(Weak<Inner>);

impl WeakDispatcher {
    pub(crate) fn upgrade(&self) -> Option<Dispatcher> {
        self.0.upgrade().map(|inner| Dispatcher { inner })
    }
}

impl Dispatcher {
    /// Starts both context threads and the timer driver.
    pub fn new() -> Result<Self, DispatchError> {
        let id = DISPATCHER_IDS.fetch_add(1, AtomicOrdering::Relaxed);
        let main = SerialQueue::spawn(id, Context::Main)?;
        let background = SerialQueue::spawn(id, Context::Background)?;

        let runtime = Builder::new_current_thread().enable_time().build()?;
        let driver = runtime.handle().clone();
        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        thread::Builder::new()
            .name(format!("adflow-timers-{id}"))
            .spawn(move || {
                runtime.block_on(stop.cancelled());
                tracing::trace!(dispatcher = id, "timer driver stopped");
            })?;

        Ok(Self {
            inner: Arc::new(Inner {
                id,
                main,
                background,
                driver,
                shutdown,
            }),
        })
    }

    /// Schedules `work` on `context` without blocking the caller.
    ///
    /// ### Notes
    /// There is no error return: if the context is gone the work is dropped
    /// and a warning is logged.
    pub fn dispatch(&self, context: Context, work: impl FnOnce() + Send + 'static) {
        if let Err(e) = self.push(context, Box::new(work)) {
            tracing::warn!(error = %e, "dropping work submitted to a stopped context");
        }
    }

    /// Runs `work` on `context` and blocks until it returns.
    ///
    /// If the calling thread already is `context`, the work runs inline.
    ///
    /// ### Errors
    /// - [`DispatchError::Disconnected`] if the context no longer runs
    /// - [`DispatchError::Panicked`] if `work` panicked
    pub fn sync<T, F>(&self, context: Context, work: F) -> Result<T, DispatchError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if self.is_current(context) {
            return panic::catch_unwind(AssertUnwindSafe(work))
                .map_err(|_| DispatchError::Panicked { context });
        }

        let (tx, rx) = std_mpsc::sync_channel::<T>(1);
        self.push(
            context,
            Box::new(move || {
                let _ = tx.send(work());
            }),
        )?;
        rx.recv().map_err(|_| DispatchError::Panicked { context })
    }

    /// Runs `work` once on `context` after `delay`. Fire-and-forget.
    pub fn after(&self, context: Context, delay: Duration, work: impl FnOnce() + Send + 'static) {
        let weak = self.downgrade();
        self.spawn_driver(async move {
            tokio::time::sleep(delay).await;
            if let Some(dispatcher) = weak.upgrade() {
                dispatcher.dispatch(context, work);
            }
        });
    }

    /// Runs `work` once on `context` after `delay`, returning a handle that can
    /// pause, resume or cancel it.
    ///
    /// Dropping the handle cancels the task.
    #[must_use = "dropping the handle cancels the task"]
    pub fn schedule(
        &self,
        context: Context,
        delay: Duration,
        work: impl FnOnce() + Send + 'static,
    ) -> DispatchTask {
        let mut work = Some(work);
        let task = DispatchTask::prepare(self, context, delay, false, move || {
            if let Some(work) = work.take() {
                work();
            }
        });
        task.resume();
        task
    }

    /// Runs `work` on `context` every `interval`, first after one `interval`.
    #[must_use = "dropping the handle cancels the task"]
    pub fn schedule_repeating(
        &self,
        context: Context,
        interval: Duration,
        work: impl FnMut() + Send + 'static,
    ) -> DispatchTask {
        let task = DispatchTask::prepare(self, context, interval, true, work);
        task.resume();
        task
    }

    /// Creates a one-shot task in the `Ready` state; `resume()` arms it.
    #[must_use = "dropping the handle cancels the task"]
    pub fn prepare(
        &self,
        context: Context,
        delay: Duration,
        work: impl FnOnce() + Send + 'static,
    ) -> DispatchTask {
        let mut work = Some(work);
        DispatchTask::prepare(self, context, delay, false, move || {
            if let Some(work) = work.take() {
                work();
            }
        })
    }

    /// Creates a fan-out/fan-in group whose units and completion run on `context`.
    pub fn group(&self, context: Context) -> TaskGroup {
        TaskGroup::new(self.clone(), context)
    }

    /// Returns `true` if the calling thread is `context` of this dispatcher.
    pub fn is_current(&self, context: Context) -> bool {
        context::current() == Some((self.inner.id, context))
    }

    pub(crate) fn downgrade(&self) -> WeakDispatcher {
        WeakDispatcher(Arc::downgrade(&self.inner))
    }

    /// Spawns a future on the timer driver runtime.
    pub(crate) fn spawn_driver<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        drop(self.inner.driver.spawn(fut));
    }

    pub(crate) fn driver(&self) -> &Handle {
        &self.inner.driver
    }

    fn push(&self, context: Context, job: Job) -> Result<(), DispatchError> {
        match context {
            Context::Main => self.inner.main.push(job),
            Context::Background => self.inner.background.push(job),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("id", &self.inner.id).finish()
    }
}
