//! # Login Plugin
//!
//! Makes sure requests flagged with `needs_login` carry a session, and
//! recovers once when the backend reports that the session expired.
//!
//! The plugin can only be built once a [`LoginCenter`] is supplied:
//!
//! ```ignore
//! let plugin = LoginPlugin::builder()
//!     .login_center(center)
//!     .auth_fail_checker(|outcome, _request| outcome.response().map_or(false, |r| r.status_code == 401))
//!     .build();
//! ```

use crate::error::RequestError;
use crate::request::descriptor::{IssuerContext, LoginMode, RequestDescriptor};
use crate::request::outcome::{RequestOutcome, Response};
use crate::request::pipeline::RequestPipeline;
use crate::request::plugin::{AfterAction, BeforeAction, Plugin};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub const DEFAULT_NAME: &str = "LoginPlugin";

/// Answer of a login attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResult {
    pub code: i32,
    pub err_msg: Option<String>,
}

impl LoginResult {
    /// Session obtained
    pub const OK: i32 = 0;
    /// Silent login failed; the request still goes out without a session
    pub const SILENT_FAILURE: i32 = -200;

    pub fn ok() -> Self {
        Self {
            code: Self::OK,
            err_msg: None,
        }
    }

    pub fn failed(code: i32, err_msg: impl Into<String>) -> Self {
        Self {
            code,
            err_msg: Some(err_msg.into()),
        }
    }

    pub fn allows_request(&self) -> bool {
        self.code == Self::OK || self.code == Self::SILENT_FAILURE
    }
}

/// The application's session manager
///
/// Implementations typically share one in-flight login between concurrent
/// callers; the plugin just awaits whatever `login` returns.
#[async_trait]
pub trait LoginCenter: Send + Sync {
    async fn login(&self, mode: LoginMode, issuer: &IssuerContext) -> LoginResult;

    /// Forget the local session
    fn clear_login(&self);
}

/// Decides from a finished request whether the backend rejected the session
pub type AuthFailChecker = Arc<dyn Fn(&RequestOutcome, &RequestDescriptor) -> bool + Send + Sync>;

/// Builder state before a login center is supplied
pub struct MissingCenter;

/// Builder state once a login center is supplied
pub struct WithCenter(Arc<dyn LoginCenter>);

pub struct LoginPluginBuilder<C> {
    name: String,
    center: C,
    auth_fail_checker: Option<AuthFailChecker>,
}

impl<C> LoginPluginBuilder<C> {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn auth_fail_checker<F>(mut self, checker: F) -> Self
    where
        F: Fn(&RequestOutcome, &RequestDescriptor) -> bool + Send + Sync + 'static,
    {
        self.auth_fail_checker = Some(Arc::new(checker));
        self
    }
}

impl LoginPluginBuilder<MissingCenter> {
    pub fn login_center(self, center: impl LoginCenter + 'static) -> LoginPluginBuilder<WithCenter> {
        self.shared_login_center(Arc::new(center))
    }

    pub fn shared_login_center(self, center: Arc<dyn LoginCenter>) -> LoginPluginBuilder<WithCenter> {
        LoginPluginBuilder {
            name: self.name,
            center: WithCenter(center),
            auth_fail_checker: self.auth_fail_checker,
        }
    }
}

impl LoginPluginBuilder<WithCenter> {
    pub fn build(self) -> LoginPlugin {
        let auth_fail_checker: AuthFailChecker = match self.auth_fail_checker {
            Some(checker) => checker,
            None => Arc::new(never_expired),
        };
        LoginPlugin {
            name: self.name,
            center: self.center.0,
            auth_fail_checker,
        }
    }
}

fn never_expired(_outcome: &RequestOutcome, _request: &RequestDescriptor) -> bool {
    false
}

pub struct LoginPlugin {
    name: String,
    center: Arc<dyn LoginCenter>,
    auth_fail_checker: AuthFailChecker,
}

impl LoginPlugin {
    pub fn builder() -> LoginPluginBuilder<MissingCenter> {
        LoginPluginBuilder {
            name: DEFAULT_NAME.to_string(),
            center: MissingCenter,
            auth_fail_checker: None,
        }
    }

    /// Send `request` through `pipeline` with a session of the given mode
    pub async fn request_with_login(
        pipeline: &RequestPipeline,
        request: RequestDescriptor,
        mode: LoginMode,
        issuer: &IssuerContext,
    ) -> Result<Response, RequestError> {
        pipeline
            .request(request.requiring_login(mode), issuer)
            .await
    }
}

#[async_trait]
impl Plugin for LoginPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn before_request_async(
        &self,
        request: &mut RequestDescriptor,
        issuer: &IssuerContext,
    ) -> Result<Option<BeforeAction>> {
        if !request.needs_login() {
            return Ok(None);
        }

        let login = self.center.login(request.login_mode(), issuer).await;
        if login.allows_request() {
            return Ok(Some(BeforeAction::Continue));
        }

        tracing::warn!(url = request.url(), code = login.code, "Login failed");
        let reason = match login.err_msg {
            Some(msg) => format!("login failed: {msg}"),
            None => "login failed".to_string(),
        };
        Ok(Some(BeforeAction::cancel(reason)))
    }

    async fn after_request_async(
        &self,
        request: &RequestDescriptor,
        outcome: &RequestOutcome,
        _issuer: &IssuerContext,
    ) -> Result<Option<AfterAction>> {
        if !request.needs_login() || !(self.auth_fail_checker)(outcome, request) {
            return Ok(None);
        }

        tracing::debug!(url = request.url(), "Backend session expired, logging in again");
        self.center.clear_login();
        Ok(Some(AfterAction::Retry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeCenter {
        codes: Mutex<Vec<i32>>,
        logins: AtomicUsize,
        clears: AtomicUsize,
        modes: Mutex<Vec<LoginMode>>,
    }

    impl FakeCenter {
        fn answering(codes: &[i32]) -> Arc<Self> {
            Arc::new(Self {
                codes: Mutex::new(codes.iter().rev().copied().collect()),
                ..Self::default()
            })
        }
    }

    #[async_trait]
    impl LoginCenter for FakeCenter {
        async fn login(&self, mode: LoginMode, _issuer: &IssuerContext) -> LoginResult {
            self.logins.fetch_add(1, Ordering::SeqCst);
            self.modes.lock().unwrap().push(mode);
            match self.codes.lock().unwrap().pop() {
                Some(LoginResult::OK) | None => LoginResult::ok(),
                Some(code) => LoginResult::failed(code, "denied"),
            }
        }

        fn clear_login(&self) {
            self.clears.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pipeline(center: Arc<FakeCenter>, transport: MockTransport) -> RequestPipeline {
        let plugin = LoginPlugin::builder()
            .shared_login_center(center)
            .auth_fail_checker(|outcome, _| {
                outcome.response().map_or(false, |response| response.status_code == 401)
            })
            .build();
        RequestPipeline::builder(transport).plugin(plugin).build()
    }

    #[tokio::test]
    async fn requests_without_login_flag_should_skip_login() {
        let center = FakeCenter::answering(&[]);
        let transport = MockTransport::new();
        let pipeline = pipeline(center.clone(), transport.clone());

        let outcome = pipeline
            .execute(RequestDescriptor::get("/public"), &IssuerContext::default())
            .await;

        assert!(outcome.is_success());
        assert_eq!(center.logins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_login_should_cancel_request() {
        let center = FakeCenter::answering(&[-1]);
        let transport = MockTransport::new();
        let pipeline = pipeline(center, transport.clone());

        let outcome = pipeline
            .execute(
                RequestDescriptor::get("/orders").requiring_login(LoginMode::Common),
                &IssuerContext::default(),
            )
            .await;

        assert_eq!(
            outcome.err_msg(),
            Some("cancelled by plugin LoginPlugin, reason: login failed: denied")
        );
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn silent_login_failure_should_still_send_request() {
        let center = FakeCenter::answering(&[LoginResult::SILENT_FAILURE]);
        let transport = MockTransport::new();
        let pipeline = pipeline(center.clone(), transport.clone());

        let outcome = pipeline
            .execute(
                RequestDescriptor::get("/feed").requiring_login(LoginMode::Silent),
                &IssuerContext::default(),
            )
            .await;

        assert!(outcome.is_success());
        assert_eq!(transport.call_count(), 1);
        assert_eq!(*center.modes.lock().unwrap(), vec![LoginMode::Silent]);
    }

    #[tokio::test]
    async fn expired_backend_session_should_clear_login_and_retry_once() {
        let center = FakeCenter::answering(&[]);
        let transport = MockTransport::new()
            .respond_with(RequestOutcome::success(401, "expired"))
            .respond_with(RequestOutcome::success(200, "orders"));
        let pipeline = pipeline(center.clone(), transport.clone());

        let response = LoginPlugin::request_with_login(
            &pipeline,
            RequestDescriptor::get("/orders"),
            LoginMode::Common,
            &IssuerContext::default(),
        )
        .await
        .unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(transport.call_count(), 2);
        assert_eq!(center.logins.load(Ordering::SeqCst), 2);
        assert_eq!(center.clears.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn persistent_auth_failure_should_return_second_result() {
        let center = FakeCenter::answering(&[]);
        let transport = MockTransport::new().respond_with(RequestOutcome::success(401, "expired"));
        let pipeline = pipeline(center.clone(), transport.clone());

        let outcome = pipeline
            .execute(
                RequestDescriptor::get("/orders").requiring_login(LoginMode::Force),
                &IssuerContext::default(),
            )
            .await;

        assert_eq!(outcome, RequestOutcome::success(401, "expired"));
        assert_eq!(transport.call_count(), 2);
        assert_eq!(center.clears.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn builder_should_use_default_name() {
        let plugin = LoginPlugin::builder()
            .login_center(FakeCenter::default())
            .build();

        assert_eq!(plugin.name(), DEFAULT_NAME);
    }
}
