//! # Recording Test Doubles
//!
//! In-memory implementations of the transport, plugin, page stack and
//! restorer seams. Every double records what it was asked to do so tests can
//! assert ordering, call counts and overlap without a network or a host.
//!
//! Doubles are cheap to clone; clones share their recordings.

use crate::error::{NavigationError, PlatformError};
use crate::navigate::{NavigationReconciler, PageRestorer, PhysicalStack, RestoreContext, RestoreOutcome, RouteEntry};
use crate::request::{
    put_header, AfterAction, BeforeAction, HeaderMap, IssuerContext, Plugin, RequestDescriptor, RequestOutcome,
    Transport,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn simulate_latency(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

/// Counts concurrent calls and remembers the peak
#[derive(Debug, Clone, Default)]
pub struct OverlapGauge {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl OverlapGauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    /// Highest number of calls that were in flight at the same time
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Shared, ordered log of events from several doubles
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        lock(&self.entries).push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        lock(&self.entries).clone()
    }
}

/// A request as the transport saw it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Transport answering from a script; the last scripted outcome repeats
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    responses: Arc<Mutex<VecDeque<RequestOutcome>>>,
    calls: Arc<Mutex<Vec<RecordedRequest>>>,
    journal: Option<Journal>,
    latency: Duration,
    gauge: OverlapGauge,
}

impl MockTransport {
    /// Answers `200 "ok"` until something else is scripted
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_with(self, outcome: RequestOutcome) -> Self {
        lock(&self.responses).push_back(outcome);
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<RecordedRequest> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn overlap(&self) -> &OverlapGauge {
        &self.gauge
    }

    fn next_outcome(&self) -> RequestOutcome {
        let mut responses = lock(&self.responses);
        if responses.len() > 1 {
            responses.pop_front().unwrap_or_else(|| RequestOutcome::success(200, "ok"))
        } else {
            responses
                .front()
                .cloned()
                .unwrap_or_else(|| RequestOutcome::success(200, "ok"))
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &RequestDescriptor) -> RequestOutcome {
        self.gauge.enter();
        if let Some(journal) = &self.journal {
            journal.record("transport");
        }
        lock(&self.calls).push(RecordedRequest {
            method: request.method().clone(),
            url: request.url().to_string(),
            headers: request.headers().clone(),
            body: request.body().clone(),
        });
        simulate_latency(self.latency).await;
        let outcome = self.next_outcome();
        self.gauge.exit();
        outcome
    }
}

/// Plugin whose hooks return scripted actions and log their invocations
/// as `<name>.before`, `<name>.before_async`, `<name>.after`, `<name>.after_async`
#[derive(Debug, Clone)]
pub struct ScriptedPlugin {
    name: String,
    journal: Option<Journal>,
    before_sync: Option<BeforeAction>,
    before_async: Option<BeforeAction>,
    after_sync: Option<AfterAction>,
    after_async: Option<AfterAction>,
    fail_before: bool,
    fail_after: bool,
    header: Option<(String, String)>,
    delay: Duration,
    seen: Arc<Mutex<Vec<RequestOutcome>>>,
}

impl ScriptedPlugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            journal: None,
            before_sync: None,
            before_async: None,
            after_sync: None,
            after_async: None,
            fail_before: false,
            fail_after: false,
            header: None,
            delay: Duration::ZERO,
            seen: Arc::default(),
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn before_sync(mut self, action: BeforeAction) -> Self {
        self.before_sync = Some(action);
        self
    }

    pub fn before_async(mut self, action: BeforeAction) -> Self {
        self.before_async = Some(action);
        self
    }

    pub fn after_sync(mut self, action: AfterAction) -> Self {
        self.after_sync = Some(action);
        self
    }

    pub fn after_async(mut self, action: AfterAction) -> Self {
        self.after_async = Some(action);
        self
    }

    /// The async pre-hook returns an error
    pub fn failing_before(mut self) -> Self {
        self.fail_before = true;
        self
    }

    /// The async post-hook returns an error
    pub fn failing_after(mut self) -> Self {
        self.fail_after = true;
        self
    }

    /// The sync pre-hook appends this header to the descriptor
    pub fn appending_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.header = Some((name.into(), value.into()));
        self
    }

    /// Both async hooks sleep this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Outcomes seen by the sync post-hook, in order
    pub fn seen_outcomes(&self) -> Arc<Mutex<Vec<RequestOutcome>>> {
        Arc::clone(&self.seen)
    }

    fn log(&self, hook: &str) {
        if let Some(journal) = &self.journal {
            journal.record(format!("{}.{hook}", self.name));
        }
    }
}

#[async_trait]
impl Plugin for ScriptedPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn before_request(
        &self,
        request: &mut RequestDescriptor,
        _issuer: &IssuerContext,
    ) -> Result<Option<BeforeAction>> {
        self.log("before");
        if let Some((name, value)) = &self.header {
            put_header(request.headers_mut(), name, value, true);
        }
        Ok(self.before_sync.clone())
    }

    async fn before_request_async(
        &self,
        _request: &mut RequestDescriptor,
        _issuer: &IssuerContext,
    ) -> Result<Option<BeforeAction>> {
        simulate_latency(self.delay).await;
        self.log("before_async");
        if self.fail_before {
            return Err(anyhow!("scripted failure in {}", self.name));
        }
        Ok(self.before_async.clone())
    }

    fn after_request(
        &self,
        _request: &RequestDescriptor,
        outcome: &RequestOutcome,
        _issuer: &IssuerContext,
    ) -> Result<Option<AfterAction>> {
        self.log("after");
        lock(&self.seen).push(outcome.clone());
        Ok(self.after_sync.clone())
    }

    async fn after_request_async(
        &self,
        _request: &RequestDescriptor,
        _outcome: &RequestOutcome,
        _issuer: &IssuerContext,
    ) -> Result<Option<AfterAction>> {
        simulate_latency(self.delay).await;
        self.log("after_async");
        if self.fail_after {
            return Err(anyhow!("scripted failure in {}", self.name));
        }
        Ok(self.after_async.clone())
    }
}

/// A command the reconciler issued against the page stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    Open(String),
    Replace(String),
    Back(usize),
    Relaunch(String),
    SwitchTab(String),
}

#[derive(Debug, Default)]
struct PlatformState {
    pages: Vec<String>,
    calls: Vec<PlatformCall>,
    open_failures: VecDeque<PlatformError>,
    replace_failures: VecDeque<PlatformError>,
    /// Top page is unloading because of a back gesture; still counted by the host
    gesture_pending: bool,
}

impl PlatformState {
    fn settle_gesture(&mut self) {
        if std::mem::take(&mut self.gesture_pending) {
            self.pages.pop();
        }
    }
}

/// In-memory host page stack with a hard capacity
#[derive(Debug, Clone)]
pub struct MockPlatform {
    state: Arc<Mutex<PlatformState>>,
    capacity: usize,
    latency: Duration,
    gauge: OverlapGauge,
}

impl MockPlatform {
    /// A host holding `pages` (bottom first) that refuses to open beyond 10 pages
    pub fn with_pages<I, S>(pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = PlatformState {
            pages: pages.into_iter().map(Into::into).collect(),
            ..PlatformState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            capacity: 10,
            latency: Duration::ZERO,
            gauge: OverlapGauge::default(),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Every host command takes this long
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// The next open attempt fails with `error`; queued failures apply in order
    pub fn fail_next_open(&self, error: PlatformError) {
        lock(&self.state).open_failures.push_back(error);
    }

    /// The next replace fails with `error` and leaves the stack untouched
    pub fn fail_next_replace(&self, error: PlatformError) {
        lock(&self.state).replace_failures.push_back(error);
    }

    pub fn pages(&self) -> Vec<String> {
        lock(&self.state).pages.clone()
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        lock(&self.state).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    pub fn overlap(&self) -> &OverlapGauge {
        &self.gauge
    }

    /// Simulate the user's back gesture: the host reports the unload while
    /// the top page is still listed, and drops it once the reconciler has
    /// reacted (or earlier, if the reconciler issues another command)
    pub async fn back_gesture(&self, navigator: &NavigationReconciler) -> Result<(), NavigationError> {
        lock(&self.state).gesture_pending = true;
        let result = navigator.on_page_unload().await;
        lock(&self.state).settle_gesture();
        result
    }

    async fn command<T>(
        &self,
        call: PlatformCall,
        apply: impl FnOnce(&mut PlatformState) -> Result<T, PlatformError>,
    ) -> Result<T, PlatformError> {
        self.gauge.enter();
        simulate_latency(self.latency).await;
        let result = {
            let mut state = lock(&self.state);
            state.settle_gesture();
            state.calls.push(call);
            apply(&mut state)
        };
        self.gauge.exit();
        result
    }
}

#[async_trait]
impl PhysicalStack for MockPlatform {
    fn current_depth(&self) -> usize {
        lock(&self.state).pages.len()
    }

    fn snapshot_paths(&self) -> Vec<String> {
        lock(&self.state).pages.clone()
    }

    fn current_page_snapshot(&self) -> Option<Value> {
        lock(&self.state).pages.last().map(|url| json!({ "url": url }))
    }

    async fn open_page(&self, url: &str) -> Result<(), PlatformError> {
        let capacity = self.capacity;
        self.command(PlatformCall::Open(url.to_string()), |state| {
            if let Some(error) = state.open_failures.pop_front() {
                return Err(error);
            }
            if state.pages.len() >= capacity {
                return Err(PlatformError::LimitExceeded(
                    "navigateTo:fail webview count limit exceed".to_string(),
                ));
            }
            state.pages.push(url.to_string());
            Ok(())
        })
        .await
    }

    async fn replace_page(&self, url: &str) -> Result<(), PlatformError> {
        self.command(PlatformCall::Replace(url.to_string()), |state| {
            if let Some(error) = state.replace_failures.pop_front() {
                return Err(error);
            }
            match state.pages.last_mut() {
                Some(top) => *top = url.to_string(),
                None => state.pages.push(url.to_string()),
            }
            Ok(())
        })
        .await
    }

    async fn go_back(&self, count: usize) -> Result<(), PlatformError> {
        self.command(PlatformCall::Back(count), |state| {
            let keep = state.pages.len().saturating_sub(count).max(1);
            state.pages.truncate(keep);
            Ok(())
        })
        .await
    }

    async fn relaunch(&self, url: &str) -> Result<(), PlatformError> {
        self.command(PlatformCall::Relaunch(url.to_string()), |state| {
            state.pages = vec![url.to_string()];
            Ok(())
        })
        .await
    }

    async fn switch_tab(&self, url: &str) -> Result<(), PlatformError> {
        self.command(PlatformCall::SwitchTab(url.to_string()), |state| {
            state.pages = vec![url.to_string()];
            Ok(())
        })
        .await
    }
}

/// Restorer answering with a fixed outcome and recording every request
#[derive(Debug, Clone)]
pub struct RecordingRestorer {
    outcome: RestoreOutcome,
    requests: Arc<Mutex<Vec<(RouteEntry, RestoreContext)>>>,
}

impl RecordingRestorer {
    pub fn answering(outcome: RestoreOutcome) -> Self {
        Self {
            outcome,
            requests: Arc::default(),
        }
    }

    /// `(url, context)` of every request, in order
    pub fn requests(&self) -> Vec<(String, RestoreContext)> {
        lock(&self.requests)
            .iter()
            .map(|(route, context)| (route.url.clone(), *context))
            .collect()
    }

    /// Full route entries handed to the restorer, in order
    pub fn routes(&self) -> Vec<RouteEntry> {
        lock(&self.requests)
            .iter()
            .map(|(route, _)| route.clone())
            .collect()
    }
}

#[async_trait]
impl PageRestorer for RecordingRestorer {
    async fn restore(&self, route: &RouteEntry, context: RestoreContext) -> RestoreOutcome {
        lock(&self.requests).push((route.clone(), context));
        self.outcome
    }
}
