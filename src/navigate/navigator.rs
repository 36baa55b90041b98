//! # Navigation Reconciler
//!
//! Presents unlimited navigation depth on top of a host that keeps at most
//! `max_level` live pages.
//!
//! ## Strategies
//!
//! - **Open**: below `max_level - 1` pages, a plain host open. At exactly
//!   `max_level - 1`, the current page is first swapped for a blank curtain
//!   page and the new page opened on top, so the host is never asked to open
//!   at its hard cap. At the cap, the new page replaces the top page.
//! - **Back**: the logical history is popped first, then the host stack is
//!   brought in line with it: popped when deeper, refreshed in place when the
//!   landing page was evicted, overwritten or is the curtain.
//! - **Correction**: every operation first reconciles the shallow end of the
//!   logical history with the host stack (see [`HistoryModel::correct`]).
//!
//! Open, back, relaunch and tab switch are serialized through one
//! [`KeyedMutex`] key in wait mode. Redirects are not: a page may redirect
//! right away while another navigation is still settling. Neither are back
//! gestures reported through [`NavigationReconciler::on_page_unload`]: the
//! host has already removed the page by then, so the reconciliation runs at
//! once and may interleave with a queued open.
//!
//! A failed host call restores the history as it was before the call. When
//! the failure happens after the curtain went up, the evicted page is put
//! back with a forced refresh.

use super::history::HistoryModel;
use super::platform::PhysicalStack;
use super::restore::{PageRestorer, RestoreContext};
use super::route::{append_url_param, to_absolute_path, RouteEntry};
use crate::config::NavigatorConfig;
use crate::error::{NavigationError, PlatformError};
use crate::sync::{KeyedMutex, LockMode};
use std::cmp::Ordering as DepthOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Smallest delay before re-trying an open after a false limit alarm
const MIN_OPEN_RETRY_DELAY: Duration = Duration::from_millis(1);

pub struct NavigationReconciler {
    platform: Arc<dyn PhysicalStack>,
    config: NavigatorConfig,
    history: Mutex<HistoryModel>,
    locks: Arc<KeyedMutex>,
    restorer: Option<Arc<dyn PageRestorer>>,
    /// Set while page unloads are caused by our own host calls rather than by the user
    active_unload: AtomicBool,
}

impl NavigationReconciler {
    pub fn new(platform: Arc<dyn PhysicalStack>, config: NavigatorConfig) -> Self {
        let history = HistoryModel::new(config.correct_level());
        Self {
            platform,
            config,
            history: Mutex::new(history),
            locks: Arc::new(KeyedMutex::new()),
            restorer: None,
            active_unload: AtomicBool::new(false),
        }
    }

    /// Share a lock service with other components; the navigation key comes from the config
    pub fn with_locks(mut self, locks: Arc<KeyedMutex>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_restorer(mut self, restorer: Arc<dyn PageRestorer>) -> Self {
        self.restorer = Some(restorer);
        self
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    /// The full logical history, corrected against the host stack
    pub fn history(&self) -> Vec<RouteEntry> {
        self.corrected(|history| history.routes().to_vec())
    }

    /// Whether unloads are currently attributed to our own navigation calls
    pub fn is_active_unload(&self) -> bool {
        self.active_unload.load(Ordering::SeqCst)
    }

    /// Open a page (relative urls resolve against the current host page)
    pub async fn navigate_to(&self, url: &str) -> Result<(), NavigationError> {
        let _held = self.locks.acquire(&self.config.lock_key, LockMode::Wait).await;

        let url = self.resolve(url);
        let depth = self.platform.current_depth();
        let max_level = self.config.max_level;
        tracing::debug!(url = %url, depth, "navigate_to");

        let (snapshot, history_len) = self.corrected(|history| {
            let snapshot = history.clone();
            history.open(url.clone());
            (snapshot, history.len())
        });

        let mut evicted = None;
        let result = if self.config.enable_curtain && depth + 1 == max_level {
            tracing::debug!(depth, "Swapping current page for curtain before opening");
            self.save_evicted_page(history_len);
            match self.secret_replace(&self.config.curtain_page, false).await {
                Ok(()) => {
                    evicted = self.with_history(|history| {
                        history_len
                            .checked_sub(2)
                            .and_then(|index| history.get(index).cloned())
                    });
                    self.secret_open(&url, false).await
                }
                Err(e) => Err(e),
            }
        } else if depth < max_level {
            self.secret_open(&url, false).await
        } else {
            tracing::debug!(depth, "Host stack full, replacing top page");
            self.save_evicted_page(history_len);
            self.secret_replace(&url, false).await
        };

        if let Err(e) = &result {
            tracing::warn!(url = %url, "Navigation failed, rolling history back: {e}");
            self.with_history(|history| *history = snapshot);
            if let Some(evicted) = evicted {
                self.take_curtain_down(&evicted).await;
            }
        }
        result
    }

    /// Replace the current page; not serialized with other navigation
    pub async fn redirect_to(&self, url: &str) -> Result<(), NavigationError> {
        let url = self.resolve(url);
        tracing::debug!(url = %url, "redirect_to");

        let snapshot = self.corrected(|history| {
            let snapshot = history.clone();
            history.replace(url.clone());
            snapshot
        });
        let result = self.secret_replace(&url, false).await;
        if let Err(e) = &result {
            tracing::warn!(url = %url, "Redirect failed, rolling history back: {e}");
            self.with_history(|history| *history = snapshot);
        }
        result
    }

    /// Go back `delta` logical pages
    pub async fn navigate_back(&self, delta: usize) -> Result<(), NavigationError> {
        let _held = self.locks.acquire(&self.config.lock_key, LockMode::Wait).await;
        tracing::debug!(delta, "navigate_back");

        self.do_back(delta, false).await
    }

    /// Close every page and open `url`; the history follows on next correction
    pub async fn relaunch(&self, url: &str) -> Result<(), NavigationError> {
        let _held = self.locks.acquire(&self.config.lock_key, LockMode::Wait).await;
        let url = self.resolve(url);
        tracing::debug!(url = %url, "relaunch");

        self.active_unload.store(true, Ordering::SeqCst);
        self.platform.relaunch(&url).await?;
        tokio::time::sleep(self.config.settle_delay).await;
        Ok(())
    }

    pub async fn switch_tab(&self, url: &str) -> Result<(), NavigationError> {
        let _held = self.locks.acquire(&self.config.lock_key, LockMode::Wait).await;
        let url = self.resolve(url);
        tracing::debug!(url = %url, "switch_tab");

        self.active_unload.store(true, Ordering::SeqCst);
        self.platform.switch_tab(&url).await?;
        tokio::time::sleep(self.config.settle_delay).await;
        Ok(())
    }

    /// Host notification that a page is unloading.
    ///
    /// Must be called while the unloading page is still counted by the host
    /// stack. Unloads caused by our own calls only end the active-unload
    /// window; any other unload is a user back gesture.
    pub async fn on_page_unload(&self) -> Result<(), NavigationError> {
        if self.active_unload.load(Ordering::SeqCst) {
            // one call can unload several pages; the first unload closes the window
            let settle_key = format!("{}:unload", self.config.lock_key);
            self.locks
                .run(&settle_key, LockMode::Discard, async {
                    tokio::time::sleep(self.config.settle_delay).await;
                    self.active_unload.store(false, Ordering::SeqCst);
                })
                .await;
            return Ok(());
        }

        tracing::debug!("Page unloaded by host back gesture");
        self.do_back(1, true).await
    }

    async fn do_back(&self, delta: usize, gesture: bool) -> Result<(), NavigationError> {
        let (target, history_len) = self.corrected(|history| {
            let target = history.back(delta).cloned();
            (target, history.len())
        });
        let target = target.ok_or(NavigationError::EmptyHistory)?;

        // a gesture has already taken one host page with it
        let depth = self
            .platform
            .current_depth()
            .saturating_sub(usize::from(gesture));
        let landing_on_curtain =
            self.config.enable_curtain && history_len + 1 == self.config.max_level;
        let landing_tainted = self.config.enable_tainted_restore && target.tainted;
        tracing::debug!(
            history_len,
            depth,
            gesture,
            url = %target.url,
            "Reconciling host stack after back"
        );

        match history_len.cmp(&depth) {
            DepthOrdering::Less => {
                self.secret_back(depth - history_len).await?;
                if landing_on_curtain {
                    self.refresh_in_place(&target).await?;
                    self.restore_lost(&target).await;
                } else if landing_tainted {
                    self.restore_tainted(&target).await?;
                }
            }
            DepthOrdering::Equal => {
                if !gesture || landing_on_curtain {
                    self.refresh_in_place(&target).await?;
                    self.restore_lost(&target).await;
                } else if landing_tainted {
                    self.restore_tainted(&target).await?;
                }
            }
            DepthOrdering::Greater => {
                // keep the host back button usable after a gesture
                if gesture {
                    self.secret_open(&target.url, true).await?;
                } else {
                    self.secret_replace(&target.url, true).await?;
                }
                self.with_history(HistoryModel::mark_restored);
                self.restore_lost(&target).await;
            }
        }
        Ok(())
    }

    async fn refresh_in_place(&self, target: &RouteEntry) -> Result<(), NavigationError> {
        self.secret_replace(&target.url, true).await?;
        self.with_history(HistoryModel::mark_restored);
        Ok(())
    }

    async fn restore_tainted(&self, target: &RouteEntry) -> Result<(), NavigationError> {
        if let Some(restorer) = &self.restorer {
            if restorer.restore(target, RestoreContext::Tainted).await.succeeded {
                self.with_history(HistoryModel::mark_restored);
                return Ok(());
            }
            tracing::debug!(url = %target.url, "Tainted restore failed, refreshing page");
        }
        self.refresh_in_place(target).await
    }

    /// Put the page evicted for the curtain back on top of the host stack
    async fn take_curtain_down(&self, evicted: &RouteEntry) {
        match self.refresh_in_place(evicted).await {
            Ok(()) => self.restore_lost(evicted).await,
            Err(e) => tracing::error!(url = %evicted.url, "Could not take curtain down: {e}"),
        }
    }

    async fn restore_lost(&self, target: &RouteEntry) {
        if let Some(restorer) = &self.restorer {
            let outcome = restorer.restore(target, RestoreContext::Unloaded).await;
            tracing::debug!(url = %target.url, succeeded = outcome.succeeded, "Unloaded page restore");
        }
    }

    async fn secret_open(&self, url: &str, forced_refresh: bool) -> Result<(), NavigationError> {
        let target = self.with_refresh_marker(url, forced_refresh);
        let mut retry_after = self.config.settle_delay.max(MIN_OPEN_RETRY_DELAY);
        let mut waited = Duration::ZERO;

        loop {
            match self.platform.open_page(&target).await {
                Ok(()) => {
                    tokio::time::sleep(self.config.settle_delay).await;
                    return Ok(());
                }
                Err(PlatformError::LimitExceeded(msg)) => {
                    if self.platform.current_depth() >= self.config.max_level {
                        tracing::debug!(url, "Host stack full, replacing instead of opening");
                        return self.secret_replace(url, forced_refresh).await;
                    }
                    if retry_after >= self.config.open_retry_timeout {
                        tracing::error!(
                            url = %target,
                            waited_ms = waited.as_millis() as u64,
                            "Opening page kept failing with limit exceeded: {msg}"
                        );
                        return Err(NavigationError::LimitRetryExhausted {
                            url: target,
                            waited_ms: waited.as_millis() as u64,
                        });
                    }
                    tracing::warn!(
                        url = %target,
                        "False page limit alarm, retrying after {}ms",
                        retry_after.as_millis()
                    );
                    tokio::time::sleep(retry_after).await;
                    waited += retry_after;
                    retry_after *= 2;
                }
                Err(e) => {
                    tracing::error!(url = %target, "Opening page failed: {e}");
                    return Err(e.into());
                }
            }
        }
    }

    async fn secret_replace(&self, url: &str, forced_refresh: bool) -> Result<(), NavigationError> {
        let target = self.with_refresh_marker(url, forced_refresh);
        self.active_unload.store(true, Ordering::SeqCst);
        if let Err(e) = self.platform.replace_page(&target).await {
            // nothing unloads after a refused replace
            self.active_unload.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        tokio::time::sleep(self.config.settle_delay).await;
        Ok(())
    }

    async fn secret_back(&self, count: usize) -> Result<(), NavigationError> {
        self.active_unload.store(true, Ordering::SeqCst);
        if let Err(e) = self.platform.go_back(count).await {
            self.active_unload.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        tokio::time::sleep(self.config.back_settle_delay).await;
        Ok(())
    }

    /// Save the top host page onto its history entry before it gets evicted
    fn save_evicted_page(&self, history_len: usize) {
        let (Some(snapshot), Some(index)) = (
            self.platform.current_page_snapshot(),
            history_len.checked_sub(2),
        ) else {
            return;
        };
        self.with_history(|history| history.save_page(index, snapshot));
    }

    fn with_refresh_marker(&self, url: &str, forced_refresh: bool) -> String {
        if forced_refresh {
            append_url_param(url, &[(self.config.forced_refresh_param.as_str(), "true")])
        } else {
            url.to_string()
        }
    }

    fn resolve(&self, url: &str) -> String {
        let current = self.platform.snapshot_paths().pop().unwrap_or_default();
        to_absolute_path(url, &current)
    }

    fn with_history<T>(&self, f: impl FnOnce(&mut HistoryModel) -> T) -> T {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut history)
    }

    fn corrected<T>(&self, f: impl FnOnce(&mut HistoryModel) -> T) -> T {
        let physical = self.platform.snapshot_paths();
        self.with_history(|history| {
            history.correct(&physical);
            f(history)
        })
    }
}
