//! # Transport Port
//!
//! Executes one network call. Implementations never fail out of band: every
//! problem is reported as [`RequestOutcome::Failure`].

use super::descriptor::RequestDescriptor;
use super::outcome::{RequestOutcome, Response};
use async_trait::async_trait;
use std::time::Duration;

/// Executes a single network call
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RequestDescriptor) -> RequestOutcome;
}

/// Transport backed by a `reqwest` client
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Create a transport whose calls give up after `timeout`
    pub fn with_timeout(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn send_inner(&self, request: &RequestDescriptor) -> anyhow::Result<Response> {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url())
            .headers(request.headers().clone());
        if !request.body().is_empty() {
            builder = builder.body(request.body().clone());
        }

        let reply = builder.send().await?;

        let mut response = Response::new(reply.status().as_u16(), bytes::Bytes::new());
        for set_cookie in reply.headers().get_all(reqwest::header::SET_COOKIE) {
            match set_cookie.to_str() {
                Ok(value) => response.cookies.push(value.to_string()),
                Err(_) => tracing::debug!("Skipping non-text Set-Cookie header"),
            }
        }
        response.headers = reply.headers().clone();
        response.body = reply.bytes().await?;

        Ok(response)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &RequestDescriptor) -> RequestOutcome {
        match self.send_inner(request).await {
            Ok(response) => {
                tracing::debug!(
                    "HTTP {} {} -> {}",
                    request.method(),
                    request.url(),
                    response.status_code
                );
                RequestOutcome::Success(response)
            }
            Err(e) => {
                // Show full error chain using anyhow's chain iterator
                let mut error_message = format!("{e}");
                for cause in e.chain().skip(1) {
                    error_message.push_str(&format!("\n  Caused by: {cause}"));
                }
                tracing::error!("HTTP request failed: {error_message}");
                RequestOutcome::failure(error_message)
            }
        }
    }
}
