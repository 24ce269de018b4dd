//! # Serial queue backing one execution context.
//!
//! A dedicated OS thread drains an unbounded [`tokio::sync::mpsc`] channel and runs
//! each job to completion before taking the next one.
//!
//! ## Rules
//! - **FIFO**: jobs run in the order they were pushed.
//! - **Panic isolation**: a panicking job is logged and the thread keeps draining.
//! - **Lifetime**: the thread exits once every sender is dropped and the queue is empty.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use tokio::sync::mpsc;

use super::context::{self, Context};
use crate::error::DispatchError;

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

pub(super) struct SerialQueue {
    context: Context,
    tx: mpsc::UnboundedSender<Job>,
}

impl SerialQueue {
    /// Starts the executor thread for `context`.
    pub(super) fn spawn(dispatcher: u64, context: Context) -> Result<Self, DispatchError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        thread::Builder::new()
            .name(format!("adflow-{context}-{dispatcher}"))
            .spawn(move || {
                context::enter(dispatcher, context);
                while let Some(job) = rx.blocking_recv() {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                        tracing::error!(
                            context = %context,
                            panic = %panic_message(payload.as_ref()),
                            "queued work panicked"
                        );
                    }
                }
                tracing::trace!(context = %context, "serial queue drained");
            })?;

        Ok(Self { context, tx })
    }

    pub(super) fn push(&self, job: Job) -> Result<(), DispatchError> {
        self.tx.send(job).map_err(|_| DispatchError::Disconnected {
            context: self.context,
        })
    }
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
