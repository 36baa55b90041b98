//! # Request Outcome
//!
//! The single result a logical request produces, plus the substitute payloads
//! plugins may supply in place of the transport's own result.
//!
//! Substitutes either arrive typed ([`Substitute::Outcome`]), which is valid by
//! construction, or as raw JSON ([`Substitute::Raw`]) from sources such as
//! in-process functions. Raw payloads are shape-checked before they can
//! replace the working result.

use super::descriptor::{header_str, put_header};
use crate::error::OutcomeShapeError;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::borrow::Cow;

/// A response returned by the server (any status code)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status_code: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// `Set-Cookie` values, in arrival order
    pub cookies: Vec<String>,
}

impl Response {
    pub fn new(status_code: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status_code,
            headers: HeaderMap::new(),
            body: body.into(),
            cookies: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        put_header(&mut self.headers, name, value, false);
        self
    }

    pub fn with_cookie(mut self, set_cookie: impl Into<String>) -> Self {
        self.cookies.push(set_cookie.into());
        self
    }

    /// Decode the body using the charset announced in `Content-Type` (UTF-8 by default)
    pub fn text(&self) -> Cow<'_, str> {
        let encoding = header_str(&self.headers, "content-type")
            .and_then(charset_label)
            .and_then(|label| encoding_rs::Encoding::for_label(label.as_bytes()))
            .unwrap_or(encoding_rs::UTF_8);
        let (text, _, had_errors) = encoding.decode(&self.body);
        if had_errors {
            tracing::warn!("Response body is not valid {}", encoding.name());
        }
        text
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

fn charset_label(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

/// Result of one logical request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The server answered; status code says nothing about business success
    Success(Response),
    /// No answer was obtained (network error, cancellation, ...)
    Failure { err_msg: String },
}

impl RequestOutcome {
    pub fn success(status_code: u16, body: impl Into<Bytes>) -> Self {
        RequestOutcome::Success(Response::new(status_code, body))
    }

    pub fn failure(err_msg: impl Into<String>) -> Self {
        RequestOutcome::Failure {
            err_msg: err_msg.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RequestOutcome::Success(_))
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            RequestOutcome::Success(response) => Some(response),
            RequestOutcome::Failure { .. } => None,
        }
    }

    pub fn err_msg(&self) -> Option<&str> {
        match self {
            RequestOutcome::Success(_) => None,
            RequestOutcome::Failure { err_msg } => Some(err_msg),
        }
    }

    /// Build an outcome from a raw JSON payload.
    ///
    /// Expected shape: `{"succeeded": bool, "data": .., "statusCode": u16,
    /// "header": {..}, "cookies": [..], "errMsg": ".."}`. `succeeded` is
    /// mandatory, and a successful payload must carry `data` (possibly empty).
    pub fn from_json(raw: &Value) -> Result<Self, OutcomeShapeError> {
        let object = raw.as_object().ok_or(OutcomeShapeError::NotAnObject)?;
        let succeeded = match object.get("succeeded") {
            Some(Value::Bool(flag)) => *flag,
            Some(_) => return Err(OutcomeShapeError::WrongType { field: "succeeded" }),
            None => return Err(OutcomeShapeError::MissingSucceeded),
        };

        if !succeeded {
            let err_msg = match object.get("errMsg") {
                None | Some(Value::Null) => "request failed".to_string(),
                Some(Value::String(msg)) => msg.clone(),
                Some(_) => return Err(OutcomeShapeError::WrongType { field: "errMsg" }),
            };
            return Ok(RequestOutcome::Failure { err_msg });
        }

        let body = object.get("data").ok_or(OutcomeShapeError::MissingBody)?;
        let status_code = match object.get("statusCode") {
            None | Some(Value::Null) => 200,
            Some(value) => value
                .as_u64()
                .and_then(|code| u16::try_from(code).ok())
                .ok_or(OutcomeShapeError::WrongType { field: "statusCode" })?,
        };

        let mut response = Response::new(status_code, body_bytes(body));
        if let Some(header) = object.get("header").filter(|value| !value.is_null()) {
            let header = header
                .as_object()
                .ok_or(OutcomeShapeError::WrongType { field: "header" })?;
            for (name, value) in header {
                let valid = value
                    .as_str()
                    .is_some_and(|value| put_header(&mut response.headers, name, value, false));
                if !valid {
                    return Err(OutcomeShapeError::WrongType { field: "header" });
                }
            }
        }
        if let Some(cookies) = object.get("cookies").filter(|value| !value.is_null()) {
            let cookies = cookies
                .as_array()
                .ok_or(OutcomeShapeError::WrongType { field: "cookies" })?;
            for cookie in cookies {
                let cookie = cookie
                    .as_str()
                    .ok_or(OutcomeShapeError::WrongType { field: "cookies" })?;
                response.cookies.push(cookie.to_string());
            }
        }

        Ok(RequestOutcome::Success(response))
    }
}

/// Strings are taken verbatim, `null` is an empty body, anything else is JSON-encoded
pub(crate) fn body_bytes(data: &Value) -> Bytes {
    match data {
        Value::Null => Bytes::new(),
        Value::String(text) => Bytes::from(text.clone()),
        other => Bytes::from(other.to_string()),
    }
}

/// A result a plugin wants to use instead of the transport's
#[derive(Debug, Clone, PartialEq)]
pub enum Substitute {
    Outcome(RequestOutcome),
    Raw(Value),
}

impl Substitute {
    /// Check the substitute's shape and turn it into an outcome
    pub fn validate(self) -> Result<RequestOutcome, OutcomeShapeError> {
        match self {
            Substitute::Outcome(outcome) => Ok(outcome),
            Substitute::Raw(raw) => RequestOutcome::from_json(&raw),
        }
    }
}

impl From<RequestOutcome> for Substitute {
    fn from(outcome: RequestOutcome) -> Self {
        Substitute::Outcome(outcome)
    }
}

impl From<Value> for Substitute {
    fn from(raw: Value) -> Self {
        Substitute::Raw(raw)
    }
}
