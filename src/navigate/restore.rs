//! Page data restoration collaborator

use super::route::RouteEntry;
use async_trait::async_trait;
use std::fmt;

/// Why a page lost its data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreContext {
    /// A later page with the same path overwrote the page instance
    Tainted,
    /// The page was evicted from the host stack and has been reloaded
    Unloaded,
}

impl fmt::Display for RestoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreContext::Tainted => write!(f, "tainted"),
            RestoreContext::Unloaded => write!(f, "unloaded"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestoreOutcome {
    pub succeeded: bool,
}

impl RestoreOutcome {
    pub fn succeeded() -> Self {
        Self { succeeded: true }
    }

    pub fn failed() -> Self {
        Self { succeeded: false }
    }
}

/// Restores page data after it was lost.
///
/// `route` carries the landing entry, including any snapshot saved before eviction.
#[async_trait]
pub trait PageRestorer: Send + Sync {
    async fn restore(&self, route: &RouteEntry, context: RestoreContext) -> RestoreOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restore_context_should_display_host_names() {
        assert_eq!(RestoreContext::Tainted.to_string(), "tainted");
        assert_eq!(RestoreContext::Unloaded.to_string(), "unloaded");
    }

    #[test]
    fn restore_outcome_should_default_to_failure() {
        assert_eq!(RestoreOutcome::default(), RestoreOutcome::failed());
        assert!(RestoreOutcome::succeeded().succeeded);
    }
}
