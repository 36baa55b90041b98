//! # Request Pipeline
//!
//! Ordered plugin hooks around a single transport call:
//! - `descriptor`: the logical request and its issuer
//! - `outcome`: the one result a request produces, plus plugin substitutes
//! - `plugin`: hook contract and the actions hooks return
//! - `transport`: the network port and its `reqwest` adapter
//! - `pipeline`: the executor
//! - `plugins`: login, cookie, form encoding, failure recovery and function routing

pub mod descriptor;
pub mod outcome;
pub mod pipeline;
pub mod plugin;
pub mod plugins;
pub mod transport;

pub use descriptor::{header_str, put_header, IssuerContext, LoginMode, RequestDescriptor};
pub use outcome::{RequestOutcome, Response, Substitute};
pub use pipeline::{PipelineBuilder, RequestPipeline};
pub use plugin::{AfterAction, BeforeAction, Plugin};
pub use reqwest::header::HeaderMap;
pub use transport::{ReqwestTransport, Transport};
