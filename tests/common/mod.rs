//! Common test utilities shared by the integration tests
//!
//! - issuer and page-stack fixtures
//! - navigator construction over a [`MockPlatform`]

#![allow(dead_code)]

use std::sync::Arc;
use waypost::testing::MockPlatform;
use waypost::{IssuerContext, NavigationReconciler, NavigatorConfig};

pub fn issuer() -> IssuerContext {
    IssuerContext::named("pages/index")
}

/// `/pages/p0` .. `/pages/p{n-1}`, bottom first
pub fn numbered_pages(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("/pages/p{i}")).collect()
}

pub fn navigator_over(platform: &MockPlatform) -> NavigationReconciler {
    navigator_with(platform, NavigatorConfig::default())
}

pub fn navigator_with(platform: &MockPlatform, config: NavigatorConfig) -> NavigationReconciler {
    NavigationReconciler::new(Arc::new(platform.clone()), config)
}

pub fn urls(navigator: &NavigationReconciler) -> Vec<String> {
    navigator.history().into_iter().map(|entry| entry.url).collect()
}
