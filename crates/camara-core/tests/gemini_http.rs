//! HTTP contract tests for [`GeminiClient`] against a wiremock server.

use std::time::Duration;

use camara_core::{GeminiClient, GeminiConfig, LanguageModel, ModelError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/v1beta/models/gemini-test:generateContent";

fn client_for(server: &MockServer) -> GeminiClient {
    let mut config = GeminiConfig::new("AIzaTestKey");
    config.base_url = server.uri();
    config.model = "gemini-test".into();
    config.timeout = Duration::from_secs(2);
    GeminiClient::new(config).unwrap()
}

fn completion_body(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    })
}

#[tokio::test]
async fn sends_key_and_two_parts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "AIzaTestKey"))
        .and(body_partial_json(json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": "instruction" }, { "text": "document" }]
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("[]")))
        .expect(1)
        .mount(&server)
        .await;

    let completion = client_for(&server)
        .generate("instruction", "document")
        .await
        .unwrap();
    assert_eq!(completion, "[]");
}

#[tokio::test]
async fn rate_limit_maps_to_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let err = client_for(&server).generate("i", "d").await.unwrap_err();
    match err {
        ModelError::RateLimited { retry_after } => {
            assert_eq!(retry_after, Some(Duration::from_secs(7)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn server_error_keeps_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
        .mount(&server)
        .await;

    let err = client_for(&server).generate("i", "d").await.unwrap_err();
    match err {
        ModelError::Status { status, body } => {
            assert_eq!(status, 403);
            assert!(body.contains("API key not valid"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn blocked_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "promptFeedback": { "blockReason": "SAFETY" } })),
        )
        .mount(&server)
        .await;

    let err = client_for(&server).generate("i", "d").await.unwrap_err();
    assert!(matches!(err, ModelError::Blocked(_)));
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body("[]"))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let mut config = GeminiConfig::new("AIzaTestKey");
    config.base_url = server.uri();
    config.model = "gemini-test".into();
    config.timeout = Duration::from_millis(200);
    let client = GeminiClient::new(config).unwrap();

    let err = client.generate("i", "d").await.unwrap_err();
    assert!(matches!(err, ModelError::Timeout(_)));
}

#[tokio::test]
async fn non_json_body_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server).generate("i", "d").await.unwrap_err();
    assert!(matches!(err, ModelError::Http(_)));
}
