//! # Navigation
//!
//! Unlimited logical navigation depth over a host that keeps only a few live
//! pages. [`NavigationReconciler`] owns the logical [`HistoryModel`] and drives
//! the host through the [`PhysicalStack`] port.

pub mod history;
pub mod navigator;
pub mod platform;
pub mod restore;
pub mod route;

pub use history::HistoryModel;
pub use navigator::NavigationReconciler;
pub use platform::PhysicalStack;
pub use restore::{PageRestorer, RestoreContext, RestoreOutcome};
pub use route::{append_url_param, full_url, is_same_page, to_absolute_path, RouteEntry};
