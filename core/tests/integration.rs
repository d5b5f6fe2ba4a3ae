//! Builder, expectation and transport against the live mock server.
//!
//! # Design
//! Each test starts its own mock server on a random port, then drives the
//! public API over real HTTP through the default ureq transport.

mod common;

use std::time::Duration;

use end2end::{
    Client, ClientConfig, ContentKind, Destination, Error, HttpMethod, RequestBuilder, TestContext,
};
use mock_server::{Echo, StatusBody, User, PASSWORD, USER};
use serde::Deserialize;

use common::{base_url, start_mock_server};

#[derive(Debug, Default, Deserialize, PartialEq)]
struct GithubResponse {
    message: String,
    documentation_url: String,
}

#[test]
fn request_with_basic_auth() {
    let base = base_url(start_mock_server());
    let ctx = TestContext::new("request_with_basic_auth");
    let mut got = GithubResponse::default();

    RequestBuilder::new(HttpMethod::Get, &base, "")
        .with_basic_auth("fooo", "barr")
        .expect_json(&mut got, 401)
        .call(&ctx);

    let want = GithubResponse {
        message: "Bad credentials".to_string(),
        documentation_url: "https://developer.github.com/v3".to_string(),
    };
    assert_eq!(got, want);
}

#[test]
fn request_with_expected_value() {
    let base = base_url(start_mock_server());
    let ctx = TestContext::new("request_with_expected_value");
    let mut got = User {
        login: String::new(),
    };

    let verdict = RequestBuilder::get(&format!("{base}/user"))
        .with_basic_auth(USER, PASSWORD)
        .expect(
            Destination::json_eq(&mut got, User { login: USER.to_string() }),
            200,
        )
        .call(&ctx);

    assert!(verdict.mismatches.is_empty());
    assert_eq!(got.login, USER);
}

#[test]
fn request_with_expect_status_only() {
    let base = base_url(start_mock_server());
    let ctx = TestContext::new("request_with_expect_status_only");

    let verdict = RequestBuilder::get(&base)
        .with_basic_auth("fooo", "barr")
        .expect_status(401)
        .call(&ctx);
    assert_eq!(verdict.status, 401);
}

#[test]
fn send_request_without_assert_the_response() {
    let base = base_url(start_mock_server());
    let ctx = TestContext::new("send_request_without_assert_the_response");

    RequestBuilder::get(&base)
        .with_basic_auth("fooo", "barr")
        .call(&ctx);
}

#[test]
fn send_request_without_check_status_code() {
    let base = base_url(start_mock_server());

    let resp = RequestBuilder::get(&base)
        .with_basic_auth("fooo", "barr")
        .send()
        .unwrap();

    assert_eq!(resp.status, 401);
    assert_eq!(ContentKind::from_content_type(resp.content_type()), ContentKind::Json);
}

#[test]
#[should_panic(expected = "return status code: 500")]
fn unexpected_status_is_fatal() {
    let base = base_url(start_mock_server());
    let ctx = TestContext::new("unexpected_status_is_fatal");
    let mut got = StatusBody { status: 0 };

    RequestBuilder::get(&format!("{base}/status/500"))
        .expect_json(&mut got, 200)
        .call(&ctx);
}

#[test]
fn unexpected_status_reports_both_codes() {
    let base = base_url(start_mock_server());
    let mut got = StatusBody { status: 0 };

    let err = RequestBuilder::get(&format!("{base}/status/500"))
        .expect_json(&mut got, 200)
        .try_call()
        .unwrap_err();

    let text = err.to_string();
    assert!(text.contains("return status code: 200"), "{text}");
    assert!(text.contains("return status code: 500"), "{text}");
    assert!(text.contains(r#"{"status":500}"#), "{text}");
}

#[test]
fn error_payload_tolerates_other_status() {
    let base = base_url(start_mock_server());
    let ctx = TestContext::new("error_payload_tolerates_other_status");
    let mut got = StatusBody { status: 0 };

    let verdict = RequestBuilder::get(&format!("{base}/status/404"))
        .expect_error(&mut got, 200)
        .call(&ctx);

    assert!(verdict.status_tolerated);
    assert_eq!(got.status, 404);
}

#[test]
fn images_are_validated_and_reencoded() {
    let client = Client::new(&base_url(start_mock_server()));

    for (format, expected) in [
        ("png", image::ImageFormat::Png),
        ("jpeg", image::ImageFormat::Jpeg),
        ("gif", image::ImageFormat::Gif),
    ] {
        let mut out = Vec::new();
        client
            .get(&format!("/images/{format}"))
            .expect_image(&mut out, 200)
            .try_call()
            .unwrap();

        let img = image::load_from_memory_with_format(&out, expected).unwrap();
        assert_eq!((img.width(), img.height()), (8, 8), "{format}");
    }
}

#[test]
fn broken_image_is_decode_error() {
    let client = Client::new(&base_url(start_mock_server()));
    let mut out = Vec::new();

    let err = client
        .get("/images/broken")
        .expect_image(&mut out, 200)
        .try_call()
        .unwrap_err();
    assert!(matches!(err, Error::Decode { kind: ContentKind::Png, .. }));
}

#[test]
fn echo_sees_everything_the_builder_set() {
    let client = Client::new(&base_url(start_mock_server()));
    let ctx = TestContext::new("echo_sees_everything_the_builder_set");
    let mut echo = Echo::default();

    client
        .endpoint("/echo?page=1")
        .with_json(HttpMethod::Post, &serde_json::json!({"title": "Buy milk"}))
        .with_bearer_token("t0ken")
        .with_headers([("X-Trace", "1"), ("X-Trace", "2")])
        .with_query_params([("page", "2"), ("q", "a b")])
        .expect_json(&mut echo, 200)
        .call(&ctx);

    assert_eq!(echo.method, "POST");
    assert_eq!(echo.path, "/echo");
    assert_eq!(echo.query.as_deref(), Some("page=2&q=a+b"));
    assert_eq!(echo.headers["authorization"], vec!["Bearer t0ken"]);
    assert_eq!(echo.headers["x-trace"], vec!["1", "2"]);
    assert_eq!(echo.headers["content-type"], vec!["application/json"]);
    assert_eq!(echo.body, r#"{"title":"Buy milk"}"#);
}

#[test]
fn connection_refused_is_transport_error() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let err = RequestBuilder::get(&base_url(addr)).send().unwrap_err();
    assert!(matches!(err, Error::Transport { method: HttpMethod::Get, .. }));
}

#[test]
fn configured_timeout_cuts_slow_requests() {
    let base = base_url(start_mock_server());
    let client = Client::with_config(
        &base,
        &ClientConfig::default().with_timeout(Duration::from_millis(100)),
    );

    let err = client.get("/delay/2000").send().unwrap_err();
    assert!(matches!(err, Error::Transport { .. }));
}
