//! # Cancellable, pausable delayed task.
//!
//! [`DispatchTask`] is a resumable timer whose work runs on a dispatcher context.
//!
//! ## State machine
//! ```text
//!   Ready ──resume──► Active ──deadline──► Firing ──► Complete        (one-shot)
//!                       │  ▲                  └─────► Active          (repeating)
//!                  pause│  │resume
//!                       ▼  │
//!                      Paused { remaining }
//!
//!   cancel / drop: any state ──► Complete
//! ```
//!
//! ## Rules
//! - `Complete` is terminal: the work is dropped and never runs again.
//! - `pause` freezes the remaining countdown; `resume` continues from it.
//! - `pause` outside `Active` and `resume` outside `Ready`/`Paused` are no-ops.
//! - Firing posts the work to the context queue; the queued job re-checks the
//!   state first, so a `cancel` ordered before it on that context always wins.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::context::Context;
use super::dispatcher::{Dispatcher, WeakDispatcher};

/// Observable state of a [`DispatchTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created, not armed yet.
    Ready,
    /// Counting down, or firing.
    Active,
    /// Countdown frozen.
    Paused,
    /// Fired (one-shot) or cancelled. Terminal.
    Complete,
}

#[derive(Debug, Clone, Copy)]
enum Timer {
    Ready,
    Active { deadline: Instant },
    Paused { remaining: Duration },
    Firing,
    Complete,
}

type Work = Box<dyn FnMut() + Send + 'static>;

struct Shared {
    context: Context,
    interval: Duration,
    repeats: bool,
    timer: Mutex<Timer>,
    work: Mutex<Option<Work>>,
    rearm: Notify,
    cancel: CancellationToken,
}

/// Handle to one scheduled delayed or repeating unit of work.
///
/// Owned by whoever scheduled it. Dropping the handle cancels the task.
pub struct DispatchTask {
    shared: Arc<Shared>,
}

impl DispatchTask {
    pub(super) fn prepare(
        dispatcher: &Dispatcher,
        context: Context,
        interval: Duration,
        repeats: bool,
        work: impl FnMut() + Send + 'static,
    ) -> Self {
        let shared = Arc::new(Shared {
            context,
            interval,
            repeats,
            timer: Mutex::new(Timer::Ready),
            work: Mutex::new(Some(Box::new(work))),
            rearm: Notify::new(),
            cancel: CancellationToken::new(),
        });
        dispatcher.spawn_driver(drive(Arc::clone(&shared), dispatcher.downgrade()));
        Self { shared }
    }

    pub fn state(&self) -> TaskState {
        match *self.shared.timer.lock() {
            Timer::Ready => TaskState::Ready,
            Timer::Active { .. } | Timer::Firing => TaskState::Active,
            Timer::Paused { .. } => TaskState::Paused,
            Timer::Complete => TaskState::Complete,
        }
    }

    /// Remaining countdown while paused; zero in any other state.
    pub fn remaining_time(&self) -> Duration {
        match *self.shared.timer.lock() {
            Timer::Paused { remaining } => remaining,
            _ => Duration::ZERO,
        }
    }

    /// Moves the task to `Complete`. Idempotent.
    pub fn cancel(&self) {
        self.shared.complete();
    }

    /// Freezes the countdown. No-op unless `Active`.
    pub fn pause(&self) {
        {
            let mut timer = self.shared.timer.lock();
            let Timer::Active { deadline } = *timer else {
                return;
            };
            *timer = Timer::Paused {
                remaining: deadline.saturating_duration_since(Instant::now()),
            };
        }
        self.shared.rearm.notify_one();
    }

    /// Arms a `Ready` task, or continues a `Paused` one from its frozen remainder.
    pub fn resume(&self) {
        {
            let mut timer = self.shared.timer.lock();
            let remaining = match *timer {
                Timer::Ready => self.shared.interval,
                Timer::Paused { remaining } => remaining,
                _ => return,
            };
            *timer = Timer::Active {
                deadline: Instant::now() + remaining,
            };
        }
        self.shared.rearm.notify_one();
    }
}

impl Drop for DispatchTask {
    fn drop(&mut self) {
        self.shared.complete();
    }
}

impl std::fmt::Debug for DispatchTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTask")
            .field("context", &self.shared.context)
            .field("state", &self.state())
            .finish()
    }
}

impl Shared {
    fn complete(&self) {
        {
            let mut timer = self.timer.lock();
            if matches!(*timer, Timer::Complete) {
                return;
            }
            *timer = Timer::Complete;
        }
        self.cancel.cancel();
        // Dropped outside the lock; the closure may own arbitrary state.
        let work = self.work.lock().take();
        drop(work);
    }

    /// Runs on the task's context after the driver observed the deadline.
    fn fire(&self) {
        {
            let mut timer = self.timer.lock();
            if !matches!(*timer, Timer::Firing) {
                return;
            }
            *timer = if self.repeats {
                Timer::Active {
                    deadline: Instant::now() + self.interval,
                }
            } else {
                Timer::Complete
            };
        }
        self.rearm.notify_one();

        let Some(mut work) = self.work.lock().take() else {
            return;
        };
        work();

        if self.repeats {
            let mut slot = self.work.lock();
            if !matches!(*self.timer.lock(), Timer::Complete) {
                *slot = Some(work);
            }
        } else {
            self.cancel.cancel();
        }
    }
}

/// Timer loop hosted on the dispatcher's driver runtime.
async fn drive(shared: Arc<Shared>, dispatcher: WeakDispatcher) {
    loop {
        let deadline = match *shared.timer.lock() {
            Timer::Complete => return,
            Timer::Active { deadline } => Some(deadline),
            Timer::Ready | Timer::Paused { .. } | Timer::Firing => None,
        };

        let sleep = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = shared.cancel.cancelled() => return,
            _ = shared.rearm.notified() => continue,
            _ = sleep => {}
        }

        {
            let mut timer = shared.timer.lock();
            match *timer {
                Timer::Active { deadline } if deadline <= Instant::now() => *timer = Timer::Firing,
                _ => continue,
            }
        }

        let Some(dispatcher) = dispatcher.upgrade() else {
            shared.complete();
            return;
        };
        let task = Arc::clone(&shared);
        dispatcher.dispatch(shared.context, move || task.fire());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dispatcher() -> Dispatcher {
        Dispatcher::new().expect("dispatcher")
    }

    #[test]
    fn test_one_shot_fires_once_and_completes() {
        let d = dispatcher();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let task = d.schedule(Context::Background, Duration::from_millis(20), move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(task.state(), TaskState::Active);

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(task.state(), TaskState::Complete);
    }

    #[test]
    fn test_cancel_prevents_work() {
        let d = dispatcher();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let task = d.schedule(Context::Background, Duration::from_millis(30), move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        task.cancel();
        task.cancel();
        assert_eq!(task.state(), TaskState::Complete);

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_drop_cancels() {
        let d = dispatcher();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        drop(d.schedule(Context::Main, Duration::from_millis(20), move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pause_freezes_remaining_time() {
        let d = dispatcher();
        let task = d.schedule(Context::Background, Duration::from_secs(10), || {});
        task.pause();
        assert_eq!(task.state(), TaskState::Paused);
        let frozen = task.remaining_time();
        assert!(frozen > Duration::from_secs(9));

        std::thread::sleep(Duration::from_millis(50));
        task.pause();
        assert_eq!(task.remaining_time(), frozen);

        task.resume();
        assert_eq!(task.state(), TaskState::Active);
        assert_eq!(task.remaining_time(), Duration::ZERO);
    }

    #[test]
    fn test_prepared_task_waits_for_resume() {
        let d = dispatcher();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let task = d.prepare(Context::Background, Duration::from_millis(10), move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(task.state(), TaskState::Ready);

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        task.resume();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_repeating_rearms_until_cancelled() {
        let d = dispatcher();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let task = d.schedule_repeating(Context::Background, Duration::from_millis(20), move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(150));
        task.cancel();
        let seen = hits.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected several firings, got {seen}");

        std::thread::sleep(Duration::from_millis(80));
        assert!(hits.load(Ordering::SeqCst) <= seen + 1);
        assert_eq!(task.state(), TaskState::Complete);
    }
}
