//! # Waypost - Request Pipeline and Navigation Reconciler
//!
//! Two in-process orchestration engines for page-based client applications.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────── request ────────────────────────┐
//! │ RequestPipeline ──► Plugin hooks ──► Transport (port)   │
//! │   (login, cookie, form, fail-recover, function-route)   │
//! └─────────────────────────────────────────────────────────┘
//! ┌─────────────────────── navigate ────────────────────────┐
//! │ NavigationReconciler ──► HistoryModel (logical stack)   │
//! │          │                                              │
//! │          └──────────────► PhysicalStack (port)          │
//! └─────────────────────────────────────────────────────────┘
//!        sync::KeyedMutex serializes navigation calls
//! ```
//!
//! Ports are async traits; `testing` provides recording doubles for them.

pub mod config;
pub mod error;
pub mod logging;
pub mod navigate;
pub mod request;
pub mod sync;
pub mod testing;

// Re-export main types for easy access
pub use config::{NavigatorConfig, PipelineConfig, Settings};
pub use error::{ConfigError, NavigationError, OutcomeShapeError, PlatformError, RequestError};
pub use navigate::{HistoryModel, NavigationReconciler, PageRestorer, PhysicalStack, RouteEntry};
pub use request::{
    AfterAction, BeforeAction, IssuerContext, Plugin, RequestDescriptor, RequestOutcome,
    RequestPipeline, Response, Transport,
};
pub use sync::{KeyedMutex, LockMode};
