//! # Form Plugin
//!
//! Gives requests without a content type a default one, and encodes JSON
//! object bodies of form requests as `application/x-www-form-urlencoded`.
//! Nested objects and arrays travel as JSON text so they keep their shape.

use crate::request::descriptor::{header_str, put_header, IssuerContext, RequestDescriptor};
use crate::request::plugin::{BeforeAction, Plugin};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use url::form_urlencoded;

pub const DEFAULT_NAME: &str = "FormPlugin";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

pub struct FormPlugin {
    name: String,
    default_content_type: String,
}

impl Default for FormPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl FormPlugin {
    pub fn new() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            default_content_type: FORM_CONTENT_TYPE.to_string(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Content type put on requests that carry none
    pub fn with_default_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.default_content_type = content_type.into();
        self
    }
}

/// `a=1&b=%7B%22c%22%3A2%7D` for `{"a": 1, "b": {"c": 2}}`
pub fn encode_form(fields: &Map<String, Value>) -> String {
    let mut form = form_urlencoded::Serializer::new(String::new());
    for (name, value) in fields {
        match value {
            Value::String(text) => form.append_pair(name, text),
            other => form.append_pair(name, &other.to_string()),
        };
    }
    form.finish()
}

fn is_form(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
}

#[async_trait]
impl Plugin for FormPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn before_request(
        &self,
        request: &mut RequestDescriptor,
        _issuer: &IssuerContext,
    ) -> Result<Option<BeforeAction>> {
        if header_str(request.headers(), "content-type").is_none() {
            put_header(
                request.headers_mut(),
                "content-type",
                &self.default_content_type,
                false,
            );
        }

        let form = header_str(request.headers(), "content-type").is_some_and(is_form);
        if !form {
            return Ok(None);
        }
        // bodies that are not a JSON object are already encoded
        if let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(request.body()) {
            tracing::debug!(url = request.url(), fields = fields.len(), "Encoding form body");
            request.set_body(encode_form(&fields));
        }
        Ok(None)
    }
}
