//! Replaces failed requests with whatever a recoverer produces (cached data,
//! an offline placeholder, a user-facing error result...)

use crate::request::descriptor::{IssuerContext, RequestDescriptor};
use crate::request::outcome::{RequestOutcome, Substitute};
use crate::request::plugin::{AfterAction, Plugin};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub const DEFAULT_NAME: &str = "FailRecoverPlugin";

#[async_trait]
pub trait FailRecoverer: Send + Sync {
    /// Produce a replacement for a `Failure` outcome; `Err` leaves the failure in place
    async fn recover(
        &self,
        outcome: &RequestOutcome,
        request: &RequestDescriptor,
        issuer: &IssuerContext,
    ) -> Result<Substitute>;
}

pub struct FailRecoverPlugin {
    name: String,
    recoverer: Arc<dyn FailRecoverer>,
}

impl FailRecoverPlugin {
    pub fn new(recoverer: Arc<dyn FailRecoverer>) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            recoverer,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Plugin for FailRecoverPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn after_request_async(
        &self,
        request: &RequestDescriptor,
        outcome: &RequestOutcome,
        issuer: &IssuerContext,
    ) -> Result<Option<AfterAction>> {
        if outcome.is_success() {
            return Ok(None);
        }

        let replacement = self.recoverer.recover(outcome, request, issuer).await?;
        tracing::debug!(url = request.url(), "Recovered failed request");
        Ok(Some(AfterAction::Override(replacement)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::pipeline::RequestPipeline;
    use crate::testing::MockTransport;
    use anyhow::anyhow;
    use serde_json::json;

    struct OfflinePage;

    #[async_trait]
    impl FailRecoverer for OfflinePage {
        async fn recover(
            &self,
            outcome: &RequestOutcome,
            _request: &RequestDescriptor,
            _issuer: &IssuerContext,
        ) -> Result<Substitute> {
            match outcome.err_msg() {
                Some("give up") => Err(anyhow!("nothing to offer")),
                _ => Ok(json!({"succeeded": true, "data": "offline copy"}).into()),
            }
        }
    }

    fn pipeline(transport: MockTransport) -> RequestPipeline {
        RequestPipeline::builder(transport)
            .plugin(FailRecoverPlugin::new(Arc::new(OfflinePage)))
            .build()
    }

    #[tokio::test]
    async fn failure_should_be_replaced_by_recovered_result() {
        let transport = MockTransport::new().respond_with(RequestOutcome::failure("offline"));

        let outcome = pipeline(transport)
            .execute(RequestDescriptor::get("/news"), &IssuerContext::default())
            .await;

        assert_eq!(outcome, RequestOutcome::success(200, "offline copy"));
    }

    #[tokio::test]
    async fn success_should_pass_through_untouched() {
        let transport = MockTransport::new().respond_with(RequestOutcome::success(503, "busy"));

        let outcome = pipeline(transport)
            .execute(RequestDescriptor::get("/news"), &IssuerContext::default())
            .await;

        assert_eq!(outcome, RequestOutcome::success(503, "busy"));
    }

    #[tokio::test]
    async fn recoverer_error_should_keep_original_failure() {
        let transport = MockTransport::new().respond_with(RequestOutcome::failure("give up"));

        let outcome = pipeline(transport)
            .execute(RequestDescriptor::get("/news"), &IssuerContext::default())
            .await;

        assert_eq!(outcome, RequestOutcome::failure("give up"));
    }
}
