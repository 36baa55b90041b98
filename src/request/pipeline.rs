//! # Request Pipeline
//!
//! Runs one logical request through an ordered list of plugins:
//!
//! ```text
//! pre-hooks (registration order) ──► transport ──► post-hooks (registration order)
//!      │ Cancel ─► Failure                               │ Override ─► new working result
//!      │ Feed ───► skip transport                        │ Retry ────► start over (budgeted)
//! ```
//!
//! Every hook is awaited before the next one starts, so ordering never depends
//! on hook latency. Pipelines share no mutable state between concurrent
//! `execute` calls; a hook waiting on a slow external step only delays its own
//! request.

use super::descriptor::{IssuerContext, RequestDescriptor};
use super::outcome::{RequestOutcome, Response};
use super::plugin::{AfterAction, BeforeAction, Plugin};
use super::transport::Transport;
use crate::config::PipelineConfig;
use crate::error::RequestError;
use std::sync::Arc;

/// Type alias for shared plugin handles
pub type PluginArc = Arc<dyn Plugin>;

/// How one pass through the hooks ended
enum PassResult {
    Finished(RequestOutcome),
    Retry,
}

/// Builder for [`RequestPipeline`]; the transport is mandatory, plugins are not
pub struct PipelineBuilder {
    transport: Arc<dyn Transport>,
    plugins: Vec<PluginArc>,
    config: PipelineConfig,
}

impl PipelineBuilder {
    /// Append a plugin; registration order is execution order
    pub fn plugin(self, plugin: impl Plugin + 'static) -> Self {
        self.shared_plugin(Arc::new(plugin))
    }

    /// Append a plugin the caller keeps a handle to
    pub fn shared_plugin(mut self, plugin: PluginArc) -> Self {
        if plugin.name().is_empty() {
            tracing::warn!(
                "Plugin at position {} has no name; diagnostics will be hard to trace",
                self.plugins.len()
            );
        }
        self.plugins.push(plugin);
        self
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn build(self) -> RequestPipeline {
        tracing::debug!(
            "Request pipeline built with plugins: [{}]",
            self.plugins
                .iter()
                .map(|plugin| plugin.name().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        RequestPipeline {
            transport: self.transport,
            plugins: self.plugins,
            config: self.config,
        }
    }
}

/// Plugin-driven request executor
pub struct RequestPipeline {
    transport: Arc<dyn Transport>,
    plugins: Vec<PluginArc>,
    config: PipelineConfig,
}

impl RequestPipeline {
    pub fn builder(transport: impl Transport + 'static) -> PipelineBuilder {
        Self::builder_shared(Arc::new(transport))
    }

    pub fn builder_shared(transport: Arc<dyn Transport>) -> PipelineBuilder {
        PipelineBuilder {
            transport,
            plugins: Vec::new(),
            config: PipelineConfig::default(),
        }
    }

    /// Names of the registered plugins, in execution order
    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|plugin| plugin.name()).collect()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute a request and resolve to the response, or reject with the full outcome
    pub async fn request(
        &self,
        request: RequestDescriptor,
        issuer: &IssuerContext,
    ) -> Result<Response, RequestError> {
        match self.execute(request, issuer).await {
            RequestOutcome::Success(response) => Ok(response),
            outcome @ RequestOutcome::Failure { .. } => Err(RequestError::Rejected {
                err_msg: outcome.err_msg().unwrap_or_default().to_string(),
                outcome,
            }),
        }
    }

    /// Execute a request through all plugins, producing exactly one outcome
    pub async fn execute(
        &self,
        request: RequestDescriptor,
        issuer: &IssuerContext,
    ) -> RequestOutcome {
        let mut retries_left = self.config.max_retries;
        loop {
            // every attempt starts from the caller's descriptor
            let mut attempt = request.clone();
            match self.run_pass(&mut attempt, issuer, retries_left > 0).await {
                PassResult::Finished(outcome) => return outcome,
                PassResult::Retry => {
                    retries_left -= 1;
                    tracing::debug!(
                        url = request.url(),
                        "Retrying request, {retries_left} retries left"
                    );
                }
            }
        }
    }

    async fn run_pass(
        &self,
        request: &mut RequestDescriptor,
        issuer: &IssuerContext,
        retry_allowed: bool,
    ) -> PassResult {
        let mut fed = None;
        for plugin in &self.plugins {
            match Self::run_before_hooks(plugin.as_ref(), request, issuer).await {
                None | Some(BeforeAction::Continue) => {}
                Some(BeforeAction::Cancel { reason }) => {
                    let err_msg =
                        format!("cancelled by plugin {}, reason: {reason}", plugin.name());
                    tracing::warn!(url = request.url(), "Request cancelled: {err_msg}");
                    return PassResult::Finished(RequestOutcome::failure(err_msg));
                }
                Some(BeforeAction::Feed(substitute)) => match substitute.validate() {
                    Ok(outcome) => {
                        tracing::debug!(
                            plugin = plugin.name(),
                            url = request.url(),
                            "Result fed by plugin, skipping transport"
                        );
                        fed = Some(outcome);
                        break;
                    }
                    Err(e) => {
                        tracing::error!(
                            plugin = plugin.name(),
                            "Ignoring malformed fed result: {e}"
                        );
                    }
                },
            }
        }

        let mut outcome = match fed {
            Some(outcome) => outcome,
            None => self.transport.send(request).await,
        };

        for plugin in &self.plugins {
            match Self::run_after_hooks(plugin.as_ref(), request, &outcome, issuer).await {
                None | Some(AfterAction::Continue) => {}
                Some(AfterAction::Override(substitute)) => match substitute.validate() {
                    Ok(replacement) => {
                        tracing::debug!(plugin = plugin.name(), "Result overridden by plugin");
                        outcome = replacement;
                    }
                    Err(e) => {
                        tracing::error!(
                            plugin = plugin.name(),
                            "Ignoring malformed override: {e}"
                        );
                    }
                },
                Some(AfterAction::Retry) if retry_allowed => {
                    tracing::debug!(plugin = plugin.name(), "Retry requested by plugin");
                    return PassResult::Retry;
                }
                Some(AfterAction::Retry) => {
                    tracing::warn!(
                        plugin = plugin.name(),
                        url = request.url(),
                        "Retry budget exhausted, returning current result"
                    );
                    return PassResult::Finished(outcome);
                }
            }
        }

        PassResult::Finished(outcome)
    }

    async fn run_before_hooks(
        plugin: &dyn Plugin,
        request: &mut RequestDescriptor,
        issuer: &IssuerContext,
    ) -> Option<BeforeAction> {
        let sync_action = match plugin.before_request(request, issuer) {
            Ok(action) => action,
            Err(e) => {
                log_hook_error(plugin, "before_request", &e);
                return None;
            }
        };
        let async_action = match plugin.before_request_async(request, issuer).await {
            Ok(action) => action,
            Err(e) => {
                log_hook_error(plugin, "before_request_async", &e);
                return None;
            }
        };
        async_action.or(sync_action)
    }

    async fn run_after_hooks(
        plugin: &dyn Plugin,
        request: &RequestDescriptor,
        outcome: &RequestOutcome,
        issuer: &IssuerContext,
    ) -> Option<AfterAction> {
        let sync_action = match plugin.after_request(request, outcome, issuer) {
            Ok(action) => action,
            Err(e) => {
                log_hook_error(plugin, "after_request", &e);
                return None;
            }
        };
        let async_action = match plugin.after_request_async(request, outcome, issuer).await {
            Ok(action) => action,
            Err(e) => {
                log_hook_error(plugin, "after_request_async", &e);
                return None;
            }
        };
        async_action.or(sync_action)
    }
}

fn log_hook_error(plugin: &dyn Plugin, hook: &'static str, error: &anyhow::Error) {
    tracing::error!(plugin = plugin.name(), hook, "Plugin hook failed: {error:#}");
}
