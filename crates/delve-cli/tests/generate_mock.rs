use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use tempfile::tempdir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Builds an OpenAI-style SSE body from text deltas.
fn sse_response(chunks: &[&str]) -> ResponseTemplate {
    let mut body = String::new();
    for chunk in chunks {
        let event = json!({"choices": [{"index": 0, "delta": {"content": chunk}}]});
        body.push_str(&format!("data: {event}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

#[tokio::test]
async fn test_generate_streams_text_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(sse_response(&["Rust ", "is ", "a ", "systems ", "language."]))
        .mount(&server)
        .await;
    let home = tempdir().unwrap();

    cargo_bin_cmd!("delve")
        .env("DELVE_HOME", home.path())
        .env("OPENAI_API_KEY", "test-key")
        .env("OPENAI_BASE_URL", server.uri())
        .args(["generate", "describe rust"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rust is a systems language."));
}

#[tokio::test]
async fn test_generate_no_stream_uses_single_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "stream": false,
            "temperature": 0.25,
            "max_tokens": 64,
            "model": "custom-model"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "One-shot reply"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let home = tempdir().unwrap();

    cargo_bin_cmd!("delve")
        .env("DELVE_HOME", home.path())
        .env("OPENAI_API_KEY", "test-key")
        .env("OPENAI_BASE_URL", server.uri())
        .args([
            "--model",
            "custom-model",
            "generate",
            "hello",
            "--no-stream",
            "--temperature",
            "0.25",
            "--max-tokens",
            "64",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("One-shot reply"));
}

#[tokio::test]
async fn test_generate_surfaces_http_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        })))
        .mount(&server)
        .await;
    let home = tempdir().unwrap();

    cargo_bin_cmd!("delve")
        .env("DELVE_HOME", home.path())
        .env("OPENAI_API_KEY", "bad-key")
        .env("OPENAI_BASE_URL", server.uri())
        .args(["generate", "hello"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Incorrect API key provided"));
}
