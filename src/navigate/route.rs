//! # Route Entries and URL Helpers
//!
//! Logical routes are absolute page paths with an optional query string,
//! e.g. `/pages/detail/detail?id=3`. Two routes denote the same page when
//! their paths match, whatever their queries.

use serde_json::Value;
use url::{form_urlencoded, Position, Url};

/// One entry of the logical navigation history
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RouteEntry {
    /// Absolute logical path plus query
    pub url: String,
    /// A later entry shares this entry's path, so its page instance may be overwritten
    pub tainted: bool,
    /// Last known data of the page, saved before its instance was evicted
    pub saved_page: Option<Value>,
}

impl RouteEntry {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tainted: false,
            saved_page: None,
        }
    }

    /// The path part of the url, without query
    pub fn path(&self) -> &str {
        path_of(&self.url)
    }
}

fn path_of(url: &str) -> &str {
    url.split_once('?').map_or(url, |(path, _)| path)
}

/// Whether two urls address the same page (query ignored)
pub fn is_same_page(left: &str, right: &str) -> bool {
    path_of(left) == path_of(right)
}

/// Routes are parsed as paths under this origin; it never leaves the crate
const ROUTE_BASE: &str = "https://routes.invalid/";

fn parse_route(route: &str) -> Option<Url> {
    Url::parse(ROUTE_BASE)
        .and_then(|base| base.join(route))
        .map_err(|e| tracing::warn!(route, "Unparsable route: {e}"))
        .ok()
}

/// Path, query and fragment of a parsed route
fn route_of(url: &Url) -> String {
    url[Position::BeforePath..].to_string()
}

/// Build `/path?k=v&...` from a page path (leading slash optional) and its options
pub fn full_url<K, V>(path: &str, options: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut url = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    if !options.is_empty() {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(options.iter().map(|(k, v)| (k.as_ref(), v.as_ref())))
            .finish();
        url.push('?');
        url.push_str(&query);
    }
    url
}

/// Merge `extra` into the query of `url`; extra parameters win on name clashes.
///
/// Existing parameters keep their order; a parameter without a value is kept
/// as `name=`. Unparsable urls are returned unchanged.
pub fn append_url_param(url: &str, extra: &[(&str, &str)]) -> String {
    if extra.is_empty() {
        return url.to_string();
    }
    let Some(mut parsed) = parse_route(url) else {
        return url.to_string();
    };

    let mut params: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
    for &(name, value) in extra {
        match params.iter_mut().find(|(existing, _)| existing == name) {
            Some(param) => param.1 = value.to_string(),
            None => params.push((name.to_string(), value.to_string())),
        }
    }
    parsed.query_pairs_mut().clear().extend_pairs(params);

    route_of(&parsed)
}

/// Resolve a page path relative to the directory of `current`.
///
/// Absolute paths are returned unchanged. `.` segments are dropped and `..`
/// climbs one level, never above the root.
pub fn to_absolute_path(relative: &str, current: &str) -> String {
    if relative.starts_with('/') {
        return relative.to_string();
    }

    parse_route(current)
        .and_then(|base| base.join(relative).ok())
        .map_or_else(|| format!("/{relative}"), |resolved| route_of(&resolved))
}
