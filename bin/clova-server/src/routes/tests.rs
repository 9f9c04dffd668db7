use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use clova_core::{
    ChatMessage, FinishReason, Generation, GenerationEngine, RuntimeError, TextGenerator,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use tracing_test::traced_test;

use super::build;
use crate::config::Config;
use crate::middleware::trace::{MAX_BODY_BYTES, X_TRACE_ID};
use crate::state::AppState;

/// Records every call and echoes the last message back. A last message of
/// `fail` produces a backend error, `long` a prompt that overflows the cap.
struct EchoGenerator {
    delay: Duration,
    seen: Arc<Mutex<Vec<(usize, usize)>>>,
}

impl TextGenerator for EchoGenerator {
    fn model_id(&self) -> &str {
        "naver-hyperclovax/test"
    }

    fn generate(
        &mut self,
        messages: &[ChatMessage],
        max_length: usize,
        _cancelled: &dyn Fn() -> bool,
    ) -> Result<Generation, RuntimeError> {
        self.seen.lock().unwrap().push((messages.len(), max_length));
        std::thread::sleep(self.delay);

        let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        match last {
            "fail" => {
                return Err(RuntimeError::TokenizeFailed {
                    source: anyhow::anyhow!("tokenizer exploded"),
                });
            }
            "long" => {
                return Err(RuntimeError::PromptTooLong {
                    prompt_tokens: max_length + 5,
                    max_length,
                });
            }
            _ => {}
        }
        Ok(Generation {
            text: format!("<|im_start|>user\n{last}<|im_end|>\n<|im_start|>assistant\nhello<|endofturn|>"),
            prompt_tokens: 3,
            total_tokens: max_length.min(4),
            finish_reason: FinishReason::Stop,
        })
    }
}

fn app_with(delay: Duration, config: Config) -> (Router, Arc<Mutex<Vec<(usize, usize)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let generator = EchoGenerator {
        delay,
        seen: Arc::clone(&seen),
    };
    let engine = GenerationEngine::start(generator, config.queue_capacity).unwrap();
    let state = Arc::new(AppState {
        config: Arc::new(config),
        engine,
    });
    (build(state), seen)
}

fn app() -> (Router, Arc<Mutex<Vec<(usize, usize)>>>) {
    app_with(Duration::ZERO, Config::default())
}

fn post_generate(body: &str) -> Request<Body> {
    Request::post("/generate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap()
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn health_reports_model_id() {
    let (app, _) = app();
    let (status, body) = send(app, Request::get("/").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "model": "naver-hyperclovax/test"}));
}

#[tokio::test]
async fn empty_messages_short_circuit() {
    let (app, seen) = app();
    let (status, body) = send(app, post_generate(r#"{"messages": [], "max_length": 5}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"text": ""}));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_messages_ignore_max_length() {
    let (app, seen) = app();
    let (status, body) = send(app, post_generate(r#"{"messages": [], "max_length": 0}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "");
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_messages_accept_negative_max_length() {
    let (app, seen) = app();
    let (status, body) = send(app, post_generate(r#"{"messages": [], "max_length": -1}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"text": ""}));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn negative_max_length_is_bad_request() {
    let (app, seen) = app();
    let (status, body) = send(
        app,
        post_generate(r#"{"messages": [{"role": "user", "content": "hi"}], "max_length": -3}"#),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("-3"));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn prompt_longer_than_max_length_is_bad_request() {
    let (app, seen) = app();
    let (status, body) = send(
        app,
        post_generate(r#"{"messages": [{"role": "user", "content": "long"}], "max_length": 8}"#),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("max_length is 8"));
    assert!(body.get("text").is_none());
    assert_eq!(*seen.lock().unwrap(), vec![(1, 8)]);
}

#[tokio::test]
async fn oversized_body_is_rejected_before_the_handler() {
    let (app, seen) = app();
    let content = "x".repeat(MAX_BODY_BYTES);
    let body = json!({"messages": [{"role": "user", "content": content}]}).to_string();
    let response = app.oneshot(post_generate(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(response.headers().contains_key(X_TRACE_ID));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].as_str().unwrap().contains("exceeds"));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_role_is_client_error() {
    let (app, seen) = app();
    let (status, body) = send(
        app,
        post_generate(r#"{"messages": [{"role": "bogus", "content": "x"}]}"#),
    )
    .await;

    assert!(status.is_client_error(), "got {status}");
    assert!(body["error"].is_string());
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_json_is_client_error() {
    let (app, seen) = app();
    let (status, body) = send(app, post_generate("{\"messages\": [")).await;

    assert!(status.is_client_error(), "got {status}");
    assert!(body["error"].is_string());
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn zero_max_length_is_bad_request() {
    let (app, seen) = app();
    let (status, _) = send(
        app,
        post_generate(r#"{"messages": [{"role": "user", "content": "hi"}], "max_length": 0}"#),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn generate_returns_full_sequence() {
    let (app, seen) = app();
    let body = json!({
        "messages": [
            {"role": "tool_list", "content": ""},
            {"role": "system", "content": "be brief"},
            {"role": "user", "content": "hi"},
        ],
        "max_length": 64,
    });
    let (status, body) = send(app, post_generate(&body.to_string())).await;

    assert_eq!(status, StatusCode::OK);
    let text = body["text"].as_str().unwrap();
    assert!(text.starts_with("<|im_start|>user\nhi"));
    assert!(text.ends_with("<|endofturn|>"));
    assert_eq!(*seen.lock().unwrap(), vec![(3, 64)]);
}

#[tokio::test]
async fn max_length_defaults_to_1024() {
    let (app, seen) = app();
    send(
        app,
        post_generate(r#"{"messages": [{"role": "user", "content": "hi"}]}"#),
    )
    .await;

    assert_eq!(*seen.lock().unwrap(), vec![(1, 1024)]);
}

#[tokio::test]
#[traced_test]
async fn backend_fault_is_500_and_server_keeps_serving() {
    let (app, _) = app();
    let (status, body) = send(
        app.clone(),
        post_generate(r#"{"messages": [{"role": "user", "content": "fail"}]}"#),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "generation failed");
    assert!(!body.to_string().contains("tokenizer exploded"));
    assert!(logs_contain("generation runtime error"));

    let (status, _) = send(
        app,
        post_generate(r#"{"messages": [{"role": "user", "content": "ok"}]}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_answers_during_generation() {
    let (app, _) = app_with(Duration::from_millis(500), Config::default());

    let slow = tokio::spawn(send(
        app.clone(),
        post_generate(r#"{"messages": [{"role": "user", "content": "slow"}]}"#),
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let health = tokio::time::timeout(
        Duration::from_millis(200),
        send(app, Request::get("/").body(Body::empty()).unwrap()),
    )
    .await
    .expect("health check must not wait for generation");
    assert_eq!(health.0, StatusCode::OK);

    assert_eq!(slow.await.unwrap().0, StatusCode::OK);
}

#[tokio::test]
async fn trace_id_is_echoed() {
    let (app, _) = app();
    let id = "6f0b7a5e-3c1d-4e59-9a2b-0c1d2e3f4a5b";
    let response = app
        .oneshot(
            Request::get("/")
                .header(X_TRACE_ID, id)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()[X_TRACE_ID], id);
}

#[tokio::test]
async fn openapi_document_can_be_disabled() {
    let (enabled, _) = app();
    let (status, body) = send(
        enabled,
        Request::get("/api-docs/openapi.json").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/generate"].is_object());

    let config = Config {
        enable_openapi: false,
        ..Config::default()
    };
    let (disabled, _) = app_with(Duration::ZERO, config);
    let (status, _) = send(
        disabled,
        Request::get("/api-docs/openapi.json").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
