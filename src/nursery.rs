//! Task groups with structured lifetimes.
//!
//! A [`Nursery`] owns a set of child tasks. When one child fails, the
//! `abort` token fires and every sibling stops with [`Error::Cancelled`].
//! [`Nursery::shutdown`] stops children gracefully instead: they finish
//! with `Ok(())`. [`Nursery::join`] waits for every child and returns the
//! failures. Dropping the nursery aborts the children that are still running.

use std::any::Any;
use std::future::Future;
use std::ops::Deref;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::error::{Error, Result};

type Panic = Box<dyn Any + Send + 'static>;

#[derive(Default)]
struct Outcomes {
    failures: Vec<Error>,
    panic: Option<Panic>,
}

/// Spawning side of a nursery. Cheap to clone.
#[derive(Clone)]
pub struct NurseryHandle {
    tracker: TaskTracker,
    abort: CancellationToken,
    shutdown: CancellationToken,
    outcomes: Arc<Mutex<Outcomes>>,
}

impl std::fmt::Debug for NurseryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NurseryHandle")
            .field("tasks", &self.tracker.len())
            .field("aborted", &self.abort.is_cancelled())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl NurseryHandle {
    /// Spawn a child task.
    ///
    /// The child races the nursery's tokens: an abort makes it report
    /// [`Error::Cancelled`], a shutdown makes it report success. A failing
    /// child aborts its siblings.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let abort = self.abort.clone();
        let shutdown = self.shutdown.clone();
        let child = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = abort.cancelled() => Err(Error::Cancelled),
                () = shutdown.cancelled() => Ok(()),
                result = task => result,
            }
        });

        let abort = self.abort.clone();
        let outcomes = Arc::clone(&self.outcomes);
        self.tracker.spawn(async move {
            // The child dies with its supervisor.
            let guard = AbortOnDrop(child.abort_handle());
            let joined = child.await;
            std::mem::forget(guard);

            let failure = match joined {
                Ok(Ok(())) => return,
                Ok(Err(err)) => err,
                Err(join_err) if join_err.is_panic() => {
                    if let Ok(mut outcomes) = outcomes.lock() {
                        outcomes.panic.get_or_insert(join_err.into_panic());
                    }
                    abort.cancel();
                    return;
                }
                Err(_) => Error::Cancelled,
            };
            if !failure.is_cancelled() {
                debug!(error = %failure, "nursery child failed, aborting siblings");
                abort.cancel();
            }
            if let Ok(mut outcomes) = outcomes.lock() {
                outcomes.failures.push(failure);
            }
        });
    }

    /// Abort every child. Children report [`Error::Cancelled`].
    pub fn cancel(&self) {
        self.abort.cancel();
    }

    /// Stop every child gracefully. Children report success.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Token that fires when the nursery aborts.
    #[must_use]
    pub fn abort_token(&self) -> &CancellationToken {
        &self.abort
    }

    /// `true` once a child failed or [`cancel`](Self::cancel) was called.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    /// Number of children still running.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    /// `true` when no child is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }
}

struct AbortOnDrop(tokio::task::AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// An owned task group. See the [module docs](self).
#[derive(Debug)]
pub struct Nursery {
    handle: NurseryHandle,
}

impl Default for Nursery {
    fn default() -> Self {
        Self::new()
    }
}

impl Nursery {
    /// Create an empty nursery.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handle: NurseryHandle {
                tracker: TaskTracker::new(),
                abort: CancellationToken::new(),
                shutdown: CancellationToken::new(),
                outcomes: Arc::new(Mutex::new(Outcomes::default())),
            },
        }
    }

    /// A spawning handle that can be moved into tasks.
    #[must_use]
    pub fn handle(&self) -> NurseryHandle {
        self.handle.clone()
    }

    /// Wait for every child, including children spawned while waiting, and
    /// return their failures in completion order.
    ///
    /// # Panics
    ///
    /// Resumes the panic of a child that panicked.
    pub async fn join(self) -> Vec<Error> {
        self.handle.tracker.close();
        self.handle.tracker.wait().await;

        let outcomes = match self.handle.outcomes.lock() {
            Ok(mut outcomes) => std::mem::take(&mut *outcomes),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        if let Some(panic) = outcomes.panic {
            std::panic::resume_unwind(panic);
        }
        outcomes.failures
    }
}

impl Deref for Nursery {
    type Target = NurseryHandle;

    fn deref(&self) -> &NurseryHandle {
        &self.handle
    }
}

impl Drop for Nursery {
    fn drop(&mut self) {
        self.handle.abort.cancel();
    }
}
