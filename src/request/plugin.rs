//! # Plugin Hook Contract
//!
//! Plugins take part in every request the pipeline executes. Each plugin may
//! implement up to four hooks; unimplemented hooks return `Ok(None)`, which the
//! pipeline reads as [`BeforeAction::Continue`] / [`AfterAction::Continue`].
//!
//! For one plugin, the synchronous hook runs first and its asynchronous
//! counterpart is awaited right after. When both return an action, the
//! asynchronous one wins. A hook returning `Err` is logged and the plugin is
//! treated as having returned nothing for that phase.

use super::descriptor::{IssuerContext, RequestDescriptor};
use super::outcome::{RequestOutcome, Substitute};
use anyhow::Result;
use async_trait::async_trait;

/// What a pre-hook wants the pipeline to do next
#[derive(Debug, Clone, PartialEq)]
pub enum BeforeAction {
    /// Proceed to the next plugin
    Continue,
    /// Stop the request; it fails with `reason`
    Cancel { reason: String },
    /// Skip the transport and use this result instead
    Feed(Substitute),
}

impl BeforeAction {
    pub fn cancel(reason: impl Into<String>) -> Self {
        BeforeAction::Cancel {
            reason: reason.into(),
        }
    }

    pub fn feed(substitute: impl Into<Substitute>) -> Self {
        BeforeAction::Feed(substitute.into())
    }
}

/// What a post-hook wants the pipeline to do next
#[derive(Debug, Clone, PartialEq)]
pub enum AfterAction {
    /// Proceed to the next plugin
    Continue,
    /// Replace the working result
    Override(Substitute),
    /// Run the whole request again (subject to the retry budget)
    Retry,
}

impl AfterAction {
    pub fn override_with(substitute: impl Into<Substitute>) -> Self {
        AfterAction::Override(substitute.into())
    }
}

/// A named participant in the request pipeline
///
/// Hooks get `&self`: plugins that keep state must synchronize it internally,
/// since one pipeline serves concurrent requests.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Plugin name, used in logs and cancellation messages
    fn name(&self) -> &str;

    /// Synchronous pre-hook; may edit the descriptor
    fn before_request(
        &self,
        _request: &mut RequestDescriptor,
        _issuer: &IssuerContext,
    ) -> Result<Option<BeforeAction>> {
        Ok(None)
    }

    /// Asynchronous pre-hook; may edit the descriptor and await arbitrarily long
    async fn before_request_async(
        &self,
        _request: &mut RequestDescriptor,
        _issuer: &IssuerContext,
    ) -> Result<Option<BeforeAction>> {
        Ok(None)
    }

    /// Synchronous post-hook, sees the current working result
    fn after_request(
        &self,
        _request: &RequestDescriptor,
        _outcome: &RequestOutcome,
        _issuer: &IssuerContext,
    ) -> Result<Option<AfterAction>> {
        Ok(None)
    }

    /// Asynchronous post-hook, sees the current working result
    async fn after_request_async(
        &self,
        _request: &RequestDescriptor,
        _outcome: &RequestOutcome,
        _issuer: &IssuerContext,
    ) -> Result<Option<AfterAction>> {
        Ok(None)
    }
}
