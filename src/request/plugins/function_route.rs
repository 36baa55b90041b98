//! # Function Route Plugin
//!
//! Serves requests addressed to a fake origin from in-process functions, so
//! callers keep using the request pipeline (and its other plugins) whether an
//! endpoint lives on a server or in a function.
//!
//! `GET https://cloud.function/sum?a=1&b=2` invokes function `sum` with
//! `{"a": "1", "b": "2", "reqHeader": {...}}`. All parameters arrive as
//! strings, like they would over HTTP. The function's JSON result becomes the
//! response body, except for two reserved fields:
//!
//! - `resStatusCode`: response status (default 200)
//! - `resHeader`: response headers; `Set-Cookie` may be an array

use super::cookie::parse_cookie_pairs;
use crate::request::descriptor::{header_str, put_header, IssuerContext, RequestDescriptor};
use crate::request::outcome::{body_bytes, RequestOutcome, Response};
use crate::request::plugin::{BeforeAction, Plugin};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::COOKIE;
use serde_json::{Map, Value};
use std::sync::Arc;
use url::Url;

pub const DEFAULT_NAME: &str = "FunctionRoutePlugin";
pub const DEFAULT_DOMAIN: &str = "cloud.function";

const STATUS_FIELD: &str = "resStatusCode";
const HEADER_FIELD: &str = "resHeader";

#[async_trait]
pub trait FunctionInvoker: Send + Sync {
    async fn invoke(&self, name: &str, params: Map<String, Value>) -> Result<Value>;
}

pub struct FunctionRoutePlugin {
    name: String,
    domain: String,
    root_path: String,
    invoker: Arc<dyn FunctionInvoker>,
}

impl FunctionRoutePlugin {
    pub fn new(invoker: Arc<dyn FunctionInvoker>) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            domain: DEFAULT_DOMAIN.to_string(),
            root_path: "/".to_string(),
            invoker,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = domain.to_ascii_lowercase();
        self
    }

    /// Path under which functions live; leading and trailing slashes are added
    pub fn with_root_path(mut self, root_path: &str) -> Self {
        let trimmed = root_path.trim_matches('/');
        self.root_path = if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{trimmed}/")
        };
        self
    }

    /// Function name and parameters, if the request targets a function
    fn parse_request(&self, request: &RequestDescriptor) -> Option<(String, Map<String, Value>)> {
        let url = Url::parse(request.url()).ok()?;
        // the parser lowercases the host and drops the default port
        let on_origin = url.scheme() == "https"
            && url.port().is_none()
            && url.host_str() == Some(self.domain.as_str());
        if !on_origin {
            return None;
        }
        let function = url.path().strip_prefix(self.root_path.as_str())?;
        if function.is_empty() {
            return None;
        }

        let mut params: Map<String, Value> = url
            .query_pairs()
            .filter(|(name, _)| !name.is_empty())
            .map(|(name, value)| (name.into_owned(), Value::String(value.into_owned())))
            .collect();
        if let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(request.body()) {
            for (name, value) in fields {
                params.insert(name, Value::String(stringify(value)));
            }
        }

        let mut header = Map::new();
        for (name, value) in request.headers() {
            if *name == COOKIE {
                continue;
            }
            if let Ok(value) = value.to_str() {
                header.insert(name.as_str().to_string(), Value::String(value.to_string()));
            }
        }
        let cookies: Map<String, Value> =
            parse_cookie_pairs(header_str(request.headers(), "cookie").unwrap_or_default())
                .into_iter()
                .map(|(name, value)| (name, Value::String(value)))
                .collect();
        header.insert("cookie".to_string(), Value::Object(cookies));
        params.insert("reqHeader".to_string(), Value::Object(header));

        Some((function.to_string(), params))
    }
}

fn stringify(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

/// Turn a function result into a response, pulling out the reserved fields
fn into_response(result: Value) -> Response {
    let (status, header, body) = match result {
        Value::Object(mut fields) => {
            let status = fields.remove(STATUS_FIELD);
            let header = fields.remove(HEADER_FIELD);
            (status, header, Value::Object(fields))
        }
        other => (None, None, other),
    };

    let status_code = status
        .and_then(|status| match status {
            Value::Number(number) => number.as_u64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        })
        .and_then(|code| u16::try_from(code).ok())
        .filter(|code| *code != 0)
        .unwrap_or(200);

    let mut response = Response::new(status_code, body_bytes(&body));
    if let Some(Value::Object(header)) = header {
        for (name, value) in header {
            let name = name.to_ascii_lowercase();
            let values = match value {
                Value::Array(values) => values,
                Value::Null => Vec::new(),
                single => vec![single],
            };
            for value in values.into_iter().filter(|value| !value.is_null()).map(stringify) {
                if name == "set-cookie" {
                    response.cookies.push(value.clone());
                }
                put_header(&mut response.headers, &name, &value, true);
            }
        }
    }
    response
}

#[async_trait]
impl Plugin for FunctionRoutePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn before_request_async(
        &self,
        request: &mut RequestDescriptor,
        _issuer: &IssuerContext,
    ) -> Result<Option<BeforeAction>> {
        let Some((function, params)) = self.parse_request(request) else {
            return Ok(None);
        };

        tracing::debug!(function = %function, "Routing request to function");
        let outcome = match self.invoker.invoke(&function, params).await {
            Ok(result) => RequestOutcome::Success(into_response(result)),
            Err(e) => {
                tracing::error!(function = %function, "Function failed: {e:#}");
                RequestOutcome::failure(format!("failed to exec function: {function}"))
            }
        };
        Ok(Some(BeforeAction::feed(outcome)))
    }
}
