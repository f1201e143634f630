//! Debounced cleanup of domains that were left.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_std::future;
use async_std::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::interop::contextual_identities::CookieStoreId;
use crate::tab::watcher::DomainListener;
use crate::util::errors::CustomError;

pub type LeaveFuture = Pin<Box<dyn Future<Output = Result<(), CustomError>> + Send>>;
pub type LeaveCallback = Arc<dyn Fn(CookieStoreId, String) -> LeaveFuture + Send + Sync>;

struct SchedulerState {
    delay: Duration,
    snoozing: bool,
    /// One token per pending run, a restart cancels the previous one.
    pending: HashMap<CookieStoreId, HashMap<String, CancellationToken>>,
}

struct Inner {
    state: Mutex<SchedulerState>,
    callback: LeaveCallback,
}

/// Per cookie store debounce of domain leaves.
/// At most one run is pending per store and hostname, scheduling again
/// restarts the delay. While snoozing nothing runs and every entry is
/// kept, un-snoozing runs all of them at once. A failed run is logged
/// and dropped.
/// Callers of the callback must check again whether the domain is open,
/// it may have been re-entered since it was scheduled.
#[derive(Clone)]
pub struct LeaveScheduler { inner: Arc<Inner> }

impl LeaveScheduler {
    pub fn new(delay: Duration, callback: LeaveCallback) -> Self {
        let state = SchedulerState { delay, snoozing: false, pending: HashMap::new() };
        Self { inner: Arc::new(Inner { state: Mutex::new(state), callback }) }
    }

    pub fn set_delay(&self, delay: Duration) { self.state().delay = delay; }

    pub fn is_snoozing(&self) -> bool { self.state().snoozing }

    /// Starts or restarts the delay for a hostname.
    pub fn schedule(&self, cookie_store_id: &CookieStoreId, hostname: &str) {
        let token = CancellationToken::new();
        let mut state = self.state();
        let delay = state.delay;
        let snoozing = state.snoozing;
        if let Some(previous) = state.pending.entry(cookie_store_id.clone()).or_default()
            .insert(String::from(hostname), token.clone()) {
            previous.cancel();
        }
        drop(state);
        if snoozing {
            log::debug!("held `{hostname}` in {cookie_store_id} while snoozing");
        } else {
            log::debug!("scheduled `{hostname}` in {cookie_store_id} in {delay:?}");
            self.spawn(cookie_store_id.clone(), String::from(hostname), token, delay);
        }
    }

    /// Drops the pending run of a hostname, if any.
    pub fn cancel(&self, cookie_store_id: &CookieStoreId, hostname: &str) {
        let mut state = self.state();
        let Some(hostnames) = state.pending.get_mut(cookie_store_id) else { return };
        if let Some(token) = hostnames.remove(hostname) {
            token.cancel();
            log::debug!("cancelled `{hostname}` in {cookie_store_id}");
        }
        if hostnames.is_empty() { state.pending.remove(cookie_store_id); }
    }

    /// Holds or resumes every run. Resuming runs all held hostnames
    /// right away instead of waiting for another delay.
    pub fn set_snoozing(&self, snoozing: bool) {
        let mut state = self.state();
        if state.snoozing == snoozing { return; }
        state.snoozing = snoozing;
        if snoozing { return; }
        let mut flushed = Vec::new();
        for (cookie_store_id, hostnames) in state.pending.iter_mut() {
            for (hostname, token) in hostnames.iter_mut() {
                token.cancel();
                *token = CancellationToken::new();
                flushed.push((cookie_store_id.clone(), hostname.clone(), token.clone()));
            }
        }
        drop(state);
        log::debug!("flushing {} held leaves", flushed.len());
        for (cookie_store_id, hostname, token) in flushed {
            self.spawn(cookie_store_id, hostname, token, Duration::ZERO);
        }
    }

    pub fn is_pending(&self, cookie_store_id: &CookieStoreId, hostname: &str) -> bool {
        self.state().pending.get(cookie_store_id)
            .is_some_and(|hostnames| hostnames.contains_key(hostname))
    }

    pub fn pending_count(&self) -> usize {
        self.state().pending.values().map(HashMap::len).sum()
    }

    /// Waits out the delay, a cancelled token ends the task right away.
    fn spawn(&self, cookie_store_id: CookieStoreId, hostname: String,
        token: CancellationToken, delay: Duration) -> JoinHandle<()> {
        let scheduler = self.clone();
        task::spawn(async move {
            if future::timeout(delay, token.cancelled()).await.is_ok() { return; }
            scheduler.run(cookie_store_id, hostname, token).await;
        })
    }

    /// Runs the callback unless the token was cancelled meanwhile,
    /// or keeps the entry for later if snoozing started.
    async fn run(&self, cookie_store_id: CookieStoreId, hostname: String,
        token: CancellationToken) {
        {
            let mut state = self.state();
            if token.is_cancelled() || state.snoozing { return; }
            if let Some(hostnames) = state.pending.get_mut(&cookie_store_id) {
                hostnames.remove(&hostname);
                if hostnames.is_empty() { state.pending.remove(&cookie_store_id); }
            }
        }
        if let Err(error) = (self.inner.callback)(cookie_store_id, hostname.clone()).await {
            log::error!("cleanup after leaving `{hostname}` failed: {error}");
        }
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.inner.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DomainListener for LeaveScheduler {
    fn on_domain_enter(&self, cookie_store_id: &CookieStoreId, hostname: &str) {
        self.cancel(cookie_store_id, hostname);
    }

    fn on_domain_leave(&self, cookie_store_id: &CookieStoreId, hostname: &str) {
        self.schedule(cookie_store_id, hostname);
    }
}
