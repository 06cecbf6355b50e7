//! End-to-end HTTP scenarios for anonymous sessions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use tower::ServiceExt;

use repurpose::auth::Authenticator;
use repurpose::config::Settings;
use repurpose::repository::DbContext;
use repurpose::server::{create_router, AppState};
use repurpose::storage::LocalObjectStore;
use repurpose::transcription::{
    TranscriptionError, TranscriptionProvider, TranscriptionRequest, TranscriptionResult,
};

const SECRET: &str = "integration-secret";
const BOUNDARY: &str = "----repurpose-test-boundary";

const TRANSCRIPT: &str = "Welcome to the weekly product podcast. This episode covers how our team \
    plans releases, how we decide what to cut when deadlines slip, and what we learned from \
    shipping three major features in a single quarter. We also answer listener questions about \
    hiring, remote collaboration, and keeping documentation current when everything changes fast. \
    Stay until the end for a short announcement about next month's live recording.";

struct FakeWhisper;

#[async_trait]
impl TranscriptionProvider for FakeWhisper {
    fn name(&self) -> &str {
        "fake"
    }

    async fn transcribe(
        &self,
        request: TranscriptionRequest,
    ) -> Result<TranscriptionResult, TranscriptionError> {
        assert!(!request.bytes.is_empty());
        Ok(TranscriptionResult {
            text: TRANSCRIPT.to_string(),
            language: Some("en".to_string()),
            duration_seconds: Some(185.0),
            confidence: Some(0.91),
            segments: Vec::new(),
            model: "fake-whisper".to_string(),
        })
    }
}

async fn setup() -> (Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::with_data_dir(dir.path().to_path_buf());
    let db = DbContext::sqlite(&dir.path().join("flow.db"));
    db.init_schema().await.unwrap();

    let state = AppState::new(
        db,
        Arc::new(LocalObjectStore::new(dir.path().join("objects"))),
        Arc::new(FakeWhisper),
        Authenticator::hs256(SECRET),
        &settings,
    );
    (create_router(state), dir)
}

fn bearer(user_id: &str) -> String {
    #[derive(serde::Serialize)]
    struct Claims<'a> {
        sub: &'a str,
        exp: i64,
    }
    let token = encode(
        &Header::default(),
        &Claims {
            sub: user_id,
            exp: chrono::Utc::now().timestamp() + 3600,
        },
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {}", token)
}

fn upload_request(ip: &str, file_name: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\nWeekly episode\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
             Content-Type: audio/mpeg\r\n\r\n",
            b = BOUNDARY,
            f = file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/anonymous/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header("x-forwarded-for", ip)
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_upload_poll_preview_and_claim() {
    let (app, _dir) = setup().await;

    let (status, upload) = send(&app, upload_request("198.51.100.7", "test.mp3", b"ID3\x03episode")).await;
    assert_eq!(status, StatusCode::OK, "{upload}");
    let token = upload["session_token"].as_str().unwrap().to_string();
    assert_eq!(token.len(), 64);
    assert_eq!(upload["file_name"], "test.mp3");
    assert_eq!(upload["status"], "uploaded");

    let mut completed = false;
    for _ in 0..200 {
        let (status, body) = send(&app, get(&format!("/anonymous/{}/status", token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_expired"], false);
        if body["status"] == "completed" {
            assert_eq!(body["progress_percentage"], 100);
            completed = true;
            break;
        }
        assert_ne!(body["status"], "failed", "{body}");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(completed, "transcription never completed");

    let (status, preview) = send(&app, get(&format!("/anonymous/{}", token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(preview["signup_required"], true);
    assert_eq!(preview["is_blurred"], true);
    let excerpt = preview["transcription_preview"]["preview_text"].as_str().unwrap();
    assert!(!excerpt.is_empty());
    assert!(excerpt.chars().count() <= 150);
    assert!(excerpt.len() < TRANSCRIPT.len());
    assert_eq!(
        preview["transcription_preview"]["total_word_count"],
        TRANSCRIPT.split_whitespace().count()
    );

    // Claiming needs an account
    let (status, body) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri(format!("/anonymous/{}/claim", token))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let claim = |user: &str| {
        Request::builder()
            .method("POST")
            .uri(format!("/anonymous/{}/claim", token))
            .header(header::AUTHORIZATION, bearer(user))
            .body(Body::empty())
            .unwrap()
    };

    let (status, claimed) = send(&app, claim("user_alice")).await;
    assert_eq!(status, StatusCode::OK, "{claimed}");
    assert_eq!(claimed["success"], true);
    assert_eq!(claimed["project_id"], upload["project_id"]);
    assert_eq!(claimed["full_content"], TRANSCRIPT);

    let (status, again) = send(&app, claim("user_bob")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(again["error"], "already_claimed");

    // The project now belongs to the claimant
    let (status, projects) = send(
        &app,
        Request::builder()
            .uri("/projects")
            .header(header::AUTHORIZATION, bearer("user_alice"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(projects.as_array().unwrap().len(), 1);
    assert_eq!(projects[0]["id"], upload["project_id"]);

    let (status, detail) = send(
        &app,
        Request::builder()
            .uri(format!("/projects/{}", upload["project_id"].as_str().unwrap()))
            .header(header::AUTHORIZATION, bearer("user_bob"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(detail["error"], "project_not_found");

    let (status, body) = send(&app, get(&format!("/anonymous/{}", token))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_claimed");
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let (app, _dir) = setup().await;

    let mut bytes = b"ID3\x03".to_vec();
    bytes.resize(50 * 1024 * 1024, 0);
    let (status, body) = send(&app, upload_request("198.51.100.8", "test.mp3", &bytes)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "file_too_large");
    assert_eq!(body["details"]["max_size_mb"], 10);
    assert!(body["signup_suggestion"].is_string());

    // A rejected upload does not use quota
    let (_, info) = send(
        &app,
        Request::builder()
            .uri("/anonymous/rate-limit")
            .header("x-forwarded-for", "198.51.100.8")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(info["uploads_used_hour"], 0);
}

#[tokio::test]
async fn test_unsupported_file_type() {
    let (app, _dir) = setup().await;

    let (status, body) = send(&app, upload_request("198.51.100.9", "notes.pdf", b"%PDF-1.4")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_file_type");
}

#[tokio::test]
async fn test_fourth_upload_in_an_hour_is_rate_limited() {
    let (app, _dir) = setup().await;

    for _ in 0..3 {
        let (status, body) = send(&app, upload_request("203.0.113.50", "test.mp3", b"ID3\x03x")).await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    let response = app
        .clone()
        .oneshot(upload_request("203.0.113.50", "test.mp3", b"ID3\x03x"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "rate_limit_exceeded");
    assert!(body["retry_after"].as_u64().unwrap() > 0);

    // Other clients are unaffected
    let (status, _) = send(&app, upload_request("203.0.113.51", "test.mp3", b"ID3\x03x")).await;
    assert_eq!(status, StatusCode::OK);
}
