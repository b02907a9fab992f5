//! Shared Scheduled Timer Executor
//!
//! One process-wide timer pool serves the async timeouts of every
//! connection. It is created lazily on first use, runs a small number of
//! named background threads, and never blocks shutdown: `shutdown()`
//! releases the pool in the background and in-flight tasks are dropped.
//!
//! The executor is always injected (the lifecycle manager takes an
//! `Arc<TimerExecutor>`), so tests can substitute one bound to their own
//! runtime via [`TimerExecutor::current`] and drive it with paused time.
//!
//! Cancellation is best-effort: a task that has already fired keeps
//! running, and the ticket-state compare-and-set downstream decides whether
//! it still has any effect.

use crate::config::AsyncConfig;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::info;

static SHARED: OnceLock<Arc<TimerExecutor>> = OnceLock::new();

#[derive(Debug)]
enum Backing {
    /// Dedicated runtime owned by this executor.
    Owned(Runtime),
    /// Borrowed handle to an ambient runtime (tests, embedded setups).
    Ambient(Handle),
}

/// Handle to one pending scheduled task.
#[derive(Debug)]
pub struct TimeoutHandle {
    cancelled: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl TimeoutHandle {
    /// Best-effort cancellation: the task will not run unless it already
    /// started.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.join.abort();
    }

    /// Whether `cancel` was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Process-wide scheduled executor for async-request timeouts.
#[derive(Debug)]
pub struct TimerExecutor {
    backing: Mutex<Option<Backing>>,
    shut_down: AtomicBool,
}

impl TimerExecutor {
    /// Build an executor with its own timer threads.
    pub fn new(threads: usize) -> Result<Arc<Self>> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .thread_name("gumdrop-timer")
            .enable_all()
            .build()
            .map_err(|e| Error::ExecutorUnavailable(format!("failed to start timer pool: {}", e)))?;
        info!(threads = threads.max(1), "timer executor started");
        Ok(Arc::new(Self {
            backing: Mutex::new(Some(Backing::Owned(runtime))),
            shut_down: AtomicBool::new(false),
        }))
    }

    /// Build an executor that schedules onto the calling runtime.
    ///
    /// Fails when called outside a tokio runtime.
    pub fn current() -> Result<Arc<Self>> {
        let handle = Handle::try_current().map_err(|e| {
            Error::ExecutorUnavailable(format!("no ambient tokio runtime: {}", e))
        })?;
        Ok(Arc::new(Self {
            backing: Mutex::new(Some(Backing::Ambient(handle))),
            shut_down: AtomicBool::new(false),
        }))
    }

    /// The process-wide executor, created on first use with the default
    /// [`AsyncConfig`] thread count.
    pub fn shared() -> Arc<Self> {
        SHARED
            .get_or_init(|| {
                Self::new(AsyncConfig::default().executor_threads)
                    .expect("failed to start the shared timer executor")
            })
            .clone()
    }

    /// Schedule `task` to run after `delay`.
    pub fn schedule(
        &self,
        delay: Duration,
        task: Box<dyn FnOnce() + Send>,
    ) -> Result<TimeoutHandle> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(Error::ExecutorUnavailable("executor is shut down".into()));
        }
        let handle = {
            let backing = self.backing.lock();
            match backing.as_ref() {
                Some(Backing::Owned(rt)) => rt.handle().clone(),
                Some(Backing::Ambient(h)) => h.clone(),
                None => {
                    return Err(Error::ExecutorUnavailable("executor is shut down".into()))
                }
            }
        };

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let join = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if !flag.load(Ordering::Acquire) {
                task();
            }
        });
        Ok(TimeoutHandle { cancelled, join })
    }

    /// Release the pool without blocking. Pending tasks are dropped;
    /// subsequent `schedule` calls fail with `ExecutorUnavailable`.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        if let Some(Backing::Owned(runtime)) = self.backing.lock().take() {
            runtime.shutdown_background();
            info!("timer executor shut down");
        }
    }

    /// Whether `shutdown` has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl Drop for TimerExecutor {
    fn drop(&mut self) {
        // shutdown_background keeps the drop legal inside async contexts
        if let Some(Backing::Owned(runtime)) = self.backing.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}
