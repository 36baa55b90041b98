//! # Request Descriptor
//!
//! The logical request handed to the pipeline: URL, method, headers, body
//! and bookkeeping flags read by plugins.

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use std::collections::HashMap;

/// Text of the first `name` header; `None` when absent or not visible ASCII
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Parse `name: value` into `headers`, replacing or appending.
///
/// Returns `false` when either part is not a valid header.
pub fn put_header(headers: &mut HeaderMap, name: &str, value: &str, append: bool) -> bool {
    let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value))
    else {
        tracing::warn!(name, "Dropping invalid header");
        return false;
    };
    if append {
        headers.append(name, value);
    } else {
        headers.insert(name, value);
    }
    true
}

/// How hard the login plugin may try to obtain a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoginMode {
    /// Reuse a local session, else log in silently, else ask the user
    #[default]
    Common,
    /// Only try silently; failure never blocks the request
    Silent,
    /// Refresh the session even if one exists
    Force,
    /// Refresh silently; never prompt
    ForceSilent,
    /// Always show the authorization prompt
    ForceAuth,
}

/// A logical HTTP request
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    url: String,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
    needs_login: bool,
    login_mode: LoginMode,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            needs_login: false,
            login_mode: LoginMode::default(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(Method::POST, url).with_body(body)
    }

    /// Set a header; invalid names or values are dropped with a warning
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        put_header(&mut self.headers, name, value, false);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Flag the request as requiring an authenticated session
    pub fn requiring_login(mut self, mode: LoginMode) -> Self {
        self.needs_login = true;
        self.login_mode = mode;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    pub fn needs_login(&self) -> bool {
        self.needs_login
    }

    pub fn set_needs_login(&mut self, needs_login: bool) {
        self.needs_login = needs_login;
    }

    pub fn login_mode(&self) -> LoginMode {
        self.login_mode
    }
}

/// Opaque description of whoever issued a request, passed to every hook
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssuerContext {
    /// Name of the issuing page or component
    pub issuer: Option<String>,
    pub attributes: HashMap<String, String>,
}

impl IssuerContext {
    pub fn named(issuer: impl Into<String>) -> Self {
        Self {
            issuer: Some(issuer.into()),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}
