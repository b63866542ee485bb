//! Polling controller
//!
//! Re-runs a settled request on an interval and hands each new result to a
//! registered callback. Each tick is awaited before the next sleep starts, so
//! ticks of one poller never overlap.

use crate::types::RequestResult;
use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Receives each polled result.
pub type PollCallback = Arc<dyn Fn(RequestResult) + Send + Sync>;

/// Something that can be re-run for a fresh result.
#[async_trait]
pub trait PollSource: Send + Sync + 'static {
    /// Run one tick. `None` skips delivery for this tick.
    async fn poll_once(&self) -> Option<RequestResult>;
}

#[derive(Default)]
struct PollState {
    callback: Option<PollCallback>,
    deferred: Option<(Weak<dyn PollSource>, Duration)>,
    task: Option<JoinHandle<()>>,
}

/// Per-result polling state.
#[derive(Default)]
pub struct Poller {
    state: Arc<Mutex<PollState>>,
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the delivery callback. Starts a poll that was requested
    /// before any callback existed.
    pub fn on_data<F>(&self, callback: F)
    where
        F: Fn(RequestResult) + Send + Sync + 'static,
    {
        let mut state = self.lock();
        state.callback = Some(Arc::new(callback));
        if let Some((source, interval)) = state.deferred.take() {
            tracing::debug!(target: "reqkit::polling", interval_ms = interval.as_millis() as u64, "starting deferred poll");
            state.task = self.spawn(source, interval);
        }
    }

    /// Arm the interval, clearing any running one first.
    ///
    /// Without a callback this only logs a warning; the poll starts once a
    /// callback is registered.
    pub fn start(&self, source: Weak<dyn PollSource>, interval: Duration) {
        let mut state = self.lock();
        if let Some(task) = state.task.take() {
            task.abort();
        }
        if state.callback.is_none() {
            tracing::warn!(target: "reqkit::polling", "polling requested without a data callback; waiting for on_poll_data_received");
            state.deferred = Some((source, interval));
            return;
        }
        tracing::debug!(target: "reqkit::polling", interval_ms = interval.as_millis() as u64, "polling started");
        state.task = self.spawn(source, interval);
    }

    /// Clear the interval. No-op when not polling.
    pub fn stop(&self) {
        let mut state = self.lock();
        state.deferred = None;
        if let Some(task) = state.task.take() {
            task.abort();
            tracing::debug!(target: "reqkit::polling", "polling stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock().task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Poll requested but waiting for a callback.
    pub fn is_deferred(&self) -> bool {
        self.lock().deferred.is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PollState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn(&self, source: Weak<dyn PollSource>, interval: Duration) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(target: "reqkit::polling", "no tokio runtime; polling not started");
            return None;
        };
        let state = Arc::downgrade(&self.state);
        Some(runtime.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(source) = source.upgrade() else {
                    break;
                };
                let result = source.poll_once().await;
                drop(source);
                let Some(result) = result else {
                    continue;
                };
                let Some(state) = state.upgrade() else {
                    break;
                };
                let callback = state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .callback
                    .clone();
                if let Some(callback) = callback {
                    tracing::trace!(target: "reqkit::polling", "delivering poll result");
                    callback(result);
                }
            }
        }))
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(task) = self.lock().task.take() {
            task.abort();
        }
    }
}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Poller")
            .field("has_callback", &state.callback.is_some())
            .field("deferred", &state.deferred.is_some())
            .field("running", &state.task.is_some())
            .finish()
    }
}
