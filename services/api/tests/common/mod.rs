//! Shared harness: the real router over the in-memory store, with scripted
//! text-generation backends.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use api_lib::adapters::{DocumentExtractor, InMemoryStore, LoggingResetNotifier, StoreMonitor};
use api_lib::config::Config;
use api_lib::web::{router, AppState, TokenIssuer};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use study_assistant_core::ports::{
    GenerationRequest, PortError, PortResult, TextGenerationService,
};
use study_assistant_core::{AssistantSettings, StudyAssistant, UploadPipeline};
use tower::ServiceExt;

pub const ONE_QUESTION: &str = "Q1. What is the powerhouse of the cell?\n\
A) Nucleus\n\
B) Mitochondria\n\
C) Ribosome\n\
D) Golgi apparatus\n\
Correct Answer: B\n";

/// A generation backend that always gives the same reply.
pub struct Scripted {
    reply: Result<String, String>,
}

impl Scripted {
    pub fn ok(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
        })
    }
}

#[async_trait]
impl TextGenerationService for Scripted {
    async fn generate(&self, _request: &GenerationRequest) -> PortResult<String> {
        self.reply.clone().map_err(PortError::Unexpected)
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub tokens: TokenIssuer,
}

fn test_config() -> Config {
    Config {
        bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
        database_url: None,
        log_level: tracing::Level::DEBUG,
        openai_api_key: "test-key".to_string(),
        summary_model: "test-model".to_string(),
        questions_model: "test-model".to_string(),
        question_count: 5,
        ai_timeout: Duration::from_secs(5),
        max_prompt_chars: 12_000,
        jwt_secret: "integration-test-secret".to_string(),
        token_ttl: chrono::Duration::minutes(5),
        cookie_secure: false,
        frontend_url: "http://localhost:3000".to_string(),
        store_retry_delay: Duration::from_millis(1),
    }
}

impl TestApp {
    /// A healthy backend: a mitochondria summary and one well-formed question.
    pub fn new() -> Self {
        Self::with_generators(
            Scripted::ok("Mitochondria is the powerhouse of the cell, producing ATP."),
            Scripted::ok(ONE_QUESTION),
        )
    }

    /// A backend whose every call fails.
    pub fn with_failing_backend() -> Self {
        Self::with_generators(
            Scripted::failing("insufficient_quota"),
            Scripted::failing("insufficient_quota"),
        )
    }

    pub fn with_generators(
        summarizer: Arc<dyn TextGenerationService>,
        question_writer: Arc<dyn TextGenerationService>,
    ) -> Self {
        let config = Arc::new(test_config());
        let store = Arc::new(InMemoryStore::new());
        let monitor = StoreMonitor::new();
        monitor.mark_ready();

        let assistant = Arc::new(StudyAssistant::new(
            summarizer,
            question_writer,
            AssistantSettings::default(),
        ));
        let pipeline = Arc::new(UploadPipeline::new(
            store.clone(),
            store.clone(),
            Arc::new(DocumentExtractor::new()),
            assistant,
        ));
        let tokens = TokenIssuer::new(&config.jwt_secret, config.token_ttl);

        let state = Arc::new(AppState {
            sessions: store.clone(),
            blobs: store.clone(),
            users: store.clone(),
            notifier: Arc::new(LoggingResetNotifier),
            pipeline,
            tokens: tokens.clone(),
            config,
            store_status: monitor.subscribe(),
        });

        Self {
            router: router(state),
            store,
            tokens,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// Sends the request and returns the status and the JSON body.
    pub async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.send(request).await;
        let status = response.status();
        (status, json_body(response).await)
    }

    /// Starts a guest session and returns its id.
    pub async fn guest(&self) -> String {
        let (status, body) = self.call(post_json("/api/guest/login", None, Value::Null)).await;
        assert_eq!(status, StatusCode::OK);
        body["guestId"].as_str().expect("guestId").to_string()
    }

    /// Creates a session as `guest` and returns its id.
    pub async fn create_session(&self, guest: &str, name: &str, subject: &str) -> String {
        let (status, body) = self
            .call(post_json(
                "/api/study/sessions",
                Some(guest),
                serde_json::json!({ "name": name, "subject": subject }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().expect("session id").to_string()
    }

    pub async fn upload(
        &self,
        guest: &str,
        session_id: &str,
        file_name: &str,
        content: &[u8],
    ) -> (StatusCode, Value) {
        self.call(upload_request(guest, session_id, file_name, content))
            .await
    }
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("JSON body")
    }
}

/// A request carrying the guest id in the `guestId` cookie.
pub fn guest_request(method: &str, uri: &str, guest: Option<&str>) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(uri);
    match guest {
        Some(g) => builder.header(header::COOKIE, format!("guestId={}", g)),
        None => builder,
    }
}

pub fn get(uri: &str, guest: Option<&str>) -> Request<Body> {
    guest_request("GET", uri, guest).body(Body::empty()).unwrap()
}

pub fn delete(uri: &str, guest: Option<&str>) -> Request<Body> {
    guest_request("DELETE", uri, guest).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, guest: Option<&str>, body: Value) -> Request<Body> {
    json_request("POST", uri, guest, body)
}

pub fn json_request(method: &str, uri: &str, guest: Option<&str>, body: Value) -> Request<Body> {
    guest_request(method, uri, guest)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

const BOUNDARY: &str = "study-assistant-test-boundary";

pub fn multipart_body(field: &str, file_name: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 256);
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: text/plain\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(
    guest: &str,
    session_id: &str,
    file_name: &str,
    content: &[u8],
) -> Request<Body> {
    guest_request(
        "POST",
        &format!("/api/study/sessions/{session_id}/upload"),
        Some(guest),
    )
    .header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
    )
    .body(Body::from(multipart_body("file", file_name, content)))
    .unwrap()
}
