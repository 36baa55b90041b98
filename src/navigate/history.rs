//! # Logical History
//!
//! The unbounded navigation history the application believes exists. The
//! host keeps only a few live pages, so only the shallow end of this history
//! has physical counterparts; [`HistoryModel::correct`] re-derives that end
//! from the host stack whenever the two disagree.
//!
//! The model never talks to the host itself: callers pass the host's current
//! page urls in. It is owned and mutated by the navigation reconciler only.

use super::route::{is_same_page, RouteEntry};
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct HistoryModel {
    routes: Vec<RouteEntry>,
    correct_level: usize,
}

impl HistoryModel {
    /// Create an empty history whose first `correct_level` entries track the host stack
    pub fn new(correct_level: usize) -> Self {
        Self {
            routes: Vec::new(),
            correct_level,
        }
    }

    pub fn with_routes<I, S>(correct_level: usize, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut history = Self {
            routes: urls.into_iter().map(RouteEntry::new).collect(),
            correct_level,
        };
        history.check_tainted();
        history
    }

    pub fn correct_level(&self) -> usize {
        self.correct_level
    }

    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn current(&self) -> Option<&RouteEntry> {
        self.routes.last()
    }

    pub fn get(&self, index: usize) -> Option<&RouteEntry> {
        self.routes.get(index)
    }

    /// Push a new entry
    pub fn open(&mut self, url: impl Into<String>) {
        self.routes.push(RouteEntry::new(url));
        self.check_tainted();
    }

    /// Overwrite the top entry (or push one into an empty history)
    pub fn replace(&mut self, url: impl Into<String>) {
        let entry = RouteEntry::new(url);
        match self.routes.last_mut() {
            Some(top) => *top = entry,
            None => self.routes.push(entry),
        }
        self.check_tainted();
    }

    /// Pop `delta` entries and return the landing entry.
    ///
    /// The first page cannot be popped, like on the host.
    pub fn back(&mut self, delta: usize) -> Option<&RouteEntry> {
        let keep = self.routes.len().saturating_sub(delta).max(1);
        self.routes.truncate(keep);
        self.routes.last()
    }

    /// Attach the last known page data to the entry at `index`
    pub fn save_page(&mut self, index: usize, snapshot: Value) {
        if let Some(entry) = self.routes.get_mut(index) {
            entry.saved_page = Some(snapshot);
        }
    }

    /// The top entry's page was re-initialized or its data restored
    pub fn mark_restored(&mut self) {
        if let Some(top) = self.routes.last_mut() {
            top.tainted = false;
        }
    }

    /// Reconcile the shallow end of the history with the host's page urls.
    ///
    /// While the host holds at most `correct_level` pages, both stacks must
    /// match entry for entry; beyond that, their first `correct_level` paths
    /// must match. On divergence the history is rebuilt from the host stack
    /// with fresh taint flags. An empty host stack carries no information and
    /// is ignored. Returns whether a rebuild happened.
    pub fn correct(&mut self, physical: &[String]) -> bool {
        if physical.is_empty() || self.is_consistent_with(physical) {
            return false;
        }

        tracing::warn!(
            logical = self.routes.len(),
            physical = physical.len(),
            "History diverged from host page stack, rebuilding from host"
        );
        self.routes = physical.iter().map(RouteEntry::new).collect();
        self.check_tainted();
        true
    }

    fn is_consistent_with(&self, physical: &[String]) -> bool {
        let compared = if physical.len() <= self.correct_level {
            if self.routes.len() != physical.len() {
                return false;
            }
            physical.len()
        } else {
            if self.routes.len() < self.correct_level {
                return false;
            }
            self.correct_level
        };

        physical
            .iter()
            .zip(&self.routes)
            .take(compared)
            .all(|(page, entry)| is_same_page(page, &entry.url))
    }

    /// Mark every entry that a later entry shares a path with; marks are sticky
    fn check_tainted(&mut self) {
        for i in 0..self.routes.len() {
            if self.routes[i].tainted {
                continue;
            }
            let (head, tail) = self.routes.split_at(i + 1);
            let overwritten = tail.iter().any(|later| is_same_page(&head[i].url, &later.url));
            self.routes[i].tainted = overwritten;
        }
    }
}
