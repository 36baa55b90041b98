//! ReqwestTransport against a local mock server

mod common;

use common::issuer;
use waypost::request::{header_str, ReqwestTransport, Transport};
use waypost::{RequestDescriptor, RequestOutcome, RequestPipeline};
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn success_should_carry_status_headers_and_cookies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(header("x-client", "waypost"))
        .and(body_string("user=a"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-trace", "t-1")
                .append_header("set-cookie", "sid=abc; Path=/")
                .append_header("set-cookie", "lang=en")
                .set_body_string("welcome"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let request = RequestDescriptor::post(format!("{}/login", server.uri()), "user=a")
        .with_header("x-client", "waypost");
    let outcome = ReqwestTransport::default().send(&request).await;

    let response = outcome.response().expect("success outcome");
    assert_eq!(response.status_code, 200);
    assert_eq!(response.text(), "welcome");
    assert_eq!(header_str(&response.headers, "x-trace"), Some("t-1"));
    assert_eq!(response.cookies, vec!["sid=abc; Path=/", "lang=en"]);
}

#[tokio::test]
async fn server_error_should_still_be_success_outcome() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
        .mount(&server)
        .await;

    let pipeline = RequestPipeline::builder(ReqwestTransport::default()).build();
    let response = pipeline
        .request(RequestDescriptor::get(format!("{}/broken", server.uri())), &issuer())
        .await
        .unwrap();

    assert_eq!(response.status_code, 500);
    assert_eq!(response.text(), "oops");
}

#[tokio::test]
async fn unreachable_host_should_be_failure_outcome() {
    let transport = ReqwestTransport::default();

    let outcome = transport
        .send(&RequestDescriptor::get("http://127.0.0.1:1/nothing"))
        .await;

    assert!(matches!(outcome, RequestOutcome::Failure { .. }));
    assert!(!outcome.err_msg().unwrap_or_default().is_empty());
}
