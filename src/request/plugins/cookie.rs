//! # Cookie Plugin
//!
//! Sends stored cookies with every request and stores the cookies servers set.

use crate::request::descriptor::{header_str, put_header, IssuerContext, RequestDescriptor};
use crate::request::outcome::RequestOutcome;
use crate::request::plugin::{AfterAction, BeforeAction, Plugin};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};

pub const DEFAULT_NAME: &str = "CookiePlugin";

/// Where cookies live between requests
pub trait CookieStore: Send + Sync {
    /// Stored cookies as a `name=value; name2=value2` header value
    fn cookie_header(&self) -> String;

    /// Store one `Set-Cookie` value
    fn set_cookie(&self, set_cookie: &str);
}

/// Split `a=1; b=2` into pairs; values may themselves contain `=`
pub fn parse_cookie_pairs(cookie: &str) -> Vec<(String, String)> {
    cookie
        .split(';')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(|field| match field.split_once('=') {
            Some((name, value)) => (name.to_string(), value.to_string()),
            None => (String::new(), field.to_string()),
        })
        .collect()
}

/// Merge cookie header values left to right; later values win per name
pub fn merge_cookie_str<'a>(cookies: impl IntoIterator<Item = &'a str>) -> String {
    let mut merged: Vec<(String, String)> = Vec::new();
    for (name, value) in cookies.into_iter().flat_map(parse_cookie_pairs) {
        match merged.iter_mut().find(|(existing, _)| *existing == name) {
            Some(pair) => pair.1 = value,
            None => merged.push((name, value)),
        }
    }
    merged
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Process-local cookie store keeping only `name=value`; attributes are ignored
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: Mutex<String>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieStore for MemoryCookieJar {
    fn cookie_header(&self) -> String {
        self.cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_cookie(&self, set_cookie: &str) {
        let pair = set_cookie.split(';').next().unwrap_or_default().trim();
        if pair.is_empty() {
            return;
        }
        let mut cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        *cookies = merge_cookie_str([cookies.as_str(), pair]);
    }
}

pub struct CookiePlugin {
    name: String,
    store: Arc<dyn CookieStore>,
}

impl CookiePlugin {
    pub fn new(store: Arc<dyn CookieStore>) -> Self {
        Self::named(DEFAULT_NAME, store)
    }

    pub fn named(name: impl Into<String>, store: Arc<dyn CookieStore>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }
}

#[async_trait]
impl Plugin for CookiePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn before_request(
        &self,
        request: &mut RequestDescriptor,
        _issuer: &IssuerContext,
    ) -> Result<Option<BeforeAction>> {
        let stored = self.store.cookie_header();
        let own = header_str(request.headers(), "cookie").unwrap_or_default();
        let merged = merge_cookie_str([stored.as_str(), own]);
        if !merged.is_empty() {
            put_header(request.headers_mut(), "cookie", &merged, false);
        }
        Ok(None)
    }

    fn after_request(
        &self,
        _request: &RequestDescriptor,
        outcome: &RequestOutcome,
        _issuer: &IssuerContext,
    ) -> Result<Option<AfterAction>> {
        if let Some(response) = outcome.response() {
            for set_cookie in &response.cookies {
                self.store.set_cookie(set_cookie);
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::outcome::Response;
    use crate::request::pipeline::RequestPipeline;
    use crate::testing::MockTransport;

    #[test]
    fn merge_should_let_later_values_win() {
        assert_eq!(
            merge_cookie_str(["uid=1; lang=en", "lang=fr;theme=dark"]),
            "uid=1; lang=fr; theme=dark"
        );
        assert_eq!(merge_cookie_str(["", ""]), "");
    }

    #[test]
    fn parse_should_keep_equals_inside_values() {
        assert_eq!(
            parse_cookie_pairs("ppu=a=b=c; x=1"),
            vec![
                ("ppu".to_string(), "a=b=c".to_string()),
                ("x".to_string(), "1".to_string())
            ]
        );
    }

    #[test]
    fn jar_should_ignore_cookie_attributes() {
        let jar = MemoryCookieJar::new();

        jar.set_cookie("uid=42; Path=/; HttpOnly");
        jar.set_cookie("session=abc; Max-Age=3600");
        jar.set_cookie("uid=43");

        assert_eq!(jar.cookie_header(), "uid=43; session=abc");
    }

    #[tokio::test]
    async fn plugin_should_send_stored_cookies_and_keep_request_values() {
        let jar = Arc::new(MemoryCookieJar::new());
        jar.set_cookie("uid=42");
        jar.set_cookie("lang=en");
        let transport = MockTransport::new();
        let pipeline = RequestPipeline::builder(transport.clone())
            .plugin(CookiePlugin::new(jar))
            .build();

        pipeline
            .execute(
                RequestDescriptor::get("/me").with_header("Cookie", "lang=fr"),
                &IssuerContext::default(),
            )
            .await;

        let calls = transport.calls();
        assert_eq!(header_str(&calls[0].headers, "cookie"), Some("uid=42; lang=fr"));
    }

    #[tokio::test]
    async fn plugin_should_store_cookies_from_successful_responses() {
        let jar = Arc::new(MemoryCookieJar::new());
        let transport = MockTransport::new().respond_with(RequestOutcome::Success(
            Response::new(200, "").with_cookie("uid=7; Path=/"),
        ));
        let pipeline = RequestPipeline::builder(transport)
            .plugin(CookiePlugin::new(jar.clone()))
            .build();

        pipeline
            .execute(RequestDescriptor::get("/login"), &IssuerContext::default())
            .await;

        assert_eq!(jar.cookie_header(), "uid=7");
    }
}
