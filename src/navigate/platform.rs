//! # Physical Stack Port
//!
//! The host's live page stack, as seen by the navigation reconciler. The
//! reconciler reads it and issues commands against it; the host owns it.

use crate::error::PlatformError;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait PhysicalStack: Send + Sync {
    /// Number of live pages
    fn current_depth(&self) -> usize;

    /// Urls (`/path?query`) of the live pages, bottom first
    fn snapshot_paths(&self) -> Vec<String>;

    /// Data of the top page, saved before the page gets evicted
    fn current_page_snapshot(&self) -> Option<Value> {
        None
    }

    async fn open_page(&self, url: &str) -> Result<(), PlatformError>;

    async fn replace_page(&self, url: &str) -> Result<(), PlatformError>;

    async fn go_back(&self, count: usize) -> Result<(), PlatformError>;

    /// Close every page and open `url`
    async fn relaunch(&self, url: &str) -> Result<(), PlatformError>;

    /// Close every non-tab page and show the tab page `url`
    async fn switch_tab(&self, url: &str) -> Result<(), PlatformError>;
}
