//! Anonymous upload sessions: upload, poll, preview and claim.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::preview::{conversion_message, excerpt, reading_time_minutes};
use super::token::{generate_token, hash_token};
use super::validation::{size_mb, validate_upload, UploadInput, UploadLimits};
use super::{JobRunner, ServiceError, ServiceResult};
use crate::config::{LimitsConfig, SessionConfig};
use crate::models::{AnonymousSession, Project, ProjectStatus, SessionStatus, Transcription};
use crate::rate_limit::{RateLimitInfo, UploadRateLimiter};
use crate::repository::{stored_now, ClaimOutcome, DbContext, PendingJob};
use crate::storage::{anonymous_object_key, BoxedObjectStore};

/// Progress reported while processing never reaches 100 until the job finishes.
const MAX_PROCESSING_PROGRESS: i64 = 90;

/// Minimum "time remaining" shown while processing.
const MIN_REMAINING_SECS: i64 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub session_token: String,
    pub project_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub status: SessionStatus,
    pub estimated_time_seconds: u64,
    pub expires_at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percentage: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<u64>,
    pub is_expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionPreview {
    pub preview_text: String,
    pub total_word_count: u32,
    pub duration_seconds: Option<f64>,
    pub language: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub file_name: String,
    pub file_size_mb: f64,
    pub duration_minutes: f64,
    /// Minutes to read the full transcript.
    pub estimated_reading_time: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewResponse {
    pub status: SessionStatus,
    pub transcription_preview: TranscriptionPreview,
    pub is_blurred: bool,
    pub signup_required: bool,
    pub conversion_message: String,
    pub file_info: FileInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimResponse {
    pub success: bool,
    pub project_id: String,
    pub transcription_id: Option<String>,
    pub full_content: Option<String>,
    pub claimed_at: DateTime<Utc>,
}

/// Coarse progress for a session: `(percentage, seconds remaining)`.
pub fn progress(
    session: &AnonymousSession,
    now: DateTime<Utc>,
    estimated_secs: u64,
) -> (Option<u8>, Option<u64>) {
    let estimate = estimated_secs as i64;
    match session.status {
        SessionStatus::Uploaded => (Some(0), Some(estimated_secs)),
        SessionStatus::Processing => {
            let started = session.processing_started_at.unwrap_or(session.created_at);
            let elapsed = (now - started).num_seconds().max(0);
            let pct = (elapsed * 30 / 60).min(MAX_PROCESSING_PROGRESS);
            let remaining = (estimate - elapsed).max(MIN_REMAINING_SECS);
            (Some(pct as u8), Some(remaining as u64))
        }
        SessionStatus::Completed | SessionStatus::Claimed => (Some(100), Some(0)),
        SessionStatus::Failed => (None, None),
    }
}

/// Session lifecycle for unauthenticated visitors.
#[derive(Clone)]
pub struct AnonymousService {
    db: DbContext,
    store: BoxedObjectStore,
    limiter: UploadRateLimiter,
    jobs: JobRunner,
    limits: UploadLimits,
    session: SessionConfig,
}

impl AnonymousService {
    pub fn new(
        db: DbContext,
        store: BoxedObjectStore,
        limiter: UploadRateLimiter,
        jobs: JobRunner,
        limits: &LimitsConfig,
        session: SessionConfig,
    ) -> Self {
        Self {
            db,
            store,
            limiter,
            jobs,
            limits: UploadLimits {
                max_bytes: limits.anonymous_max_bytes(),
                allowed_extensions: limits.allowed_extensions.clone(),
            },
            session,
        }
    }

    /// Validate, admit, store and enqueue an anonymous upload.
    pub async fn create_upload(
        &self,
        ip: &str,
        input: UploadInput,
    ) -> ServiceResult<UploadResponse> {
        let valid = validate_upload(&input, &self.limits)?;
        self.limiter.acquire(ip).await?;

        let now = stored_now();
        let token = generate_token();
        let session_id = uuid::Uuid::new_v4().to_string();
        let project_id = uuid::Uuid::new_v4().to_string();
        let storage_path = anonymous_object_key(&session_id, &input.file_name);
        let file_size = input.bytes.len() as u64;

        self.store
            .put(&storage_path, &input.bytes, Some(&valid.content_type))
            .await?;

        let session = AnonymousSession {
            id: session_id.clone(),
            token_hash: hash_token(&token),
            project_id: project_id.clone(),
            transcription_id: None,
            file_name: input.file_name.clone(),
            file_size,
            content_type: Some(valid.content_type.clone()),
            storage_path: storage_path.clone(),
            language: valid.language.clone(),
            status: SessionStatus::Uploaded,
            error_message: None,
            ip_address: ip.to_string(),
            processing_started_at: None,
            expires_at: now + Duration::days(self.session.ttl_days),
            claimed_by_user_id: None,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        };
        let project = Project {
            id: project_id.clone(),
            user_id: None,
            title: valid.title,
            description: valid.description,
            anonymous_session_id: Some(session_id.clone()),
            status: ProjectStatus::Uploaded,
            file_name: input.file_name.clone(),
            file_size,
            storage_path: storage_path.clone(),
            language: valid.language.clone(),
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.db.sessions().create(&session, &project).await {
            if let Err(cleanup) = self.store.delete(&storage_path).await {
                warn!(session_id = %session_id, error = %cleanup, "Failed to remove orphaned upload");
            }
            return Err(e.into());
        }

        info!(
            session_id = %session_id,
            project_id = %project_id,
            ip,
            bytes = file_size,
            "Anonymous upload accepted"
        );

        self.jobs.enqueue(PendingJob {
            project_id: project_id.clone(),
            session_id: Some(session_id),
            storage_path,
            file_name: input.file_name.clone(),
            language: valid.language,
        });

        let estimate = self.session.estimated_processing_secs;
        Ok(UploadResponse {
            session_token: token,
            project_id,
            file_name: input.file_name,
            file_size,
            status: SessionStatus::Uploaded,
            estimated_time_seconds: estimate,
            expires_at: session.expires_at,
            message: format!(
                "File uploaded successfully. Processing will complete in approximately {} seconds.",
                estimate
            ),
        })
    }

    /// Load a live session, mapping unknown and expired tokens to errors.
    async fn live_session(&self, token: &str, now: DateTime<Utc>) -> ServiceResult<AnonymousSession> {
        let session = self
            .db
            .sessions()
            .get_by_token_hash(&hash_token(token))
            .await?
            .ok_or(ServiceError::NotFound)?;
        if session.is_expired_at(now) {
            return Err(ServiceError::Expired);
        }
        Ok(session)
    }

    pub async fn status(&self, token: &str) -> ServiceResult<StatusResponse> {
        self.status_at(token, Utc::now()).await
    }

    pub async fn status_at(&self, token: &str, now: DateTime<Utc>) -> ServiceResult<StatusResponse> {
        let session = self.live_session(token, now).await?;
        let (progress_percentage, estimated_time_remaining) =
            progress(&session, now, self.session.estimated_processing_secs);

        Ok(StatusResponse {
            status: session.status,
            progress_percentage,
            estimated_time_remaining,
            is_expired: false,
            error_message: match session.status {
                SessionStatus::Failed => session.error_message,
                _ => None,
            },
            created_at: session.created_at,
            expires_at: session.expires_at,
        })
    }

    pub async fn preview(&self, token: &str) -> ServiceResult<PreviewResponse> {
        self.preview_at(token, Utc::now()).await
    }

    pub async fn preview_at(&self, token: &str, now: DateTime<Utc>) -> ServiceResult<PreviewResponse> {
        let session = self.live_session(token, now).await?;

        match session.status {
            SessionStatus::Uploaded | SessionStatus::Processing => {
                let (progress_percentage, _) =
                    progress(&session, now, self.session.estimated_processing_secs);
                return Err(ServiceError::StillProcessing {
                    status: session.status,
                    progress_percentage,
                });
            }
            SessionStatus::Failed => {
                return Err(ServiceError::ProcessingFailed(
                    session
                        .error_message
                        .unwrap_or_else(|| "Transcription failed".to_string()),
                ))
            }
            SessionStatus::Claimed => return Err(ServiceError::AlreadyClaimed),
            SessionStatus::Completed => {}
        }

        let transcription = self.session_transcription(&session).await?;
        let duration_minutes = transcription.duration_minutes();

        Ok(PreviewResponse {
            status: session.status,
            transcription_preview: TranscriptionPreview {
                preview_text: excerpt(&transcription.content, self.session.preview_chars),
                total_word_count: transcription.word_count,
                duration_seconds: transcription.duration_seconds,
                language: transcription.language.clone(),
                confidence: transcription.confidence,
            },
            is_blurred: true,
            signup_required: true,
            conversion_message: conversion_message(duration_minutes, transcription.word_count),
            file_info: FileInfo {
                file_name: session.file_name,
                file_size_mb: size_mb(session.file_size),
                duration_minutes: (duration_minutes * 10.0).round() / 10.0,
                estimated_reading_time: reading_time_minutes(transcription.word_count),
            },
        })
    }

    async fn session_transcription(
        &self,
        session: &AnonymousSession,
    ) -> ServiceResult<Transcription> {
        let transcriptions = self.db.transcriptions();
        let linked = match session.transcription_id {
            Some(ref id) => transcriptions.get(id).await?,
            None => None,
        };
        let transcription = match linked {
            Some(t) => Some(t),
            None => transcriptions.latest_for_project(&session.project_id).await?,
        };
        transcription.ok_or_else(|| {
            ServiceError::Internal(format!(
                "completed session {} has no transcription",
                session.id
            ))
        })
    }

    /// Transfer the session's project and transcription to `user_id`.
    pub async fn claim(&self, token: &str, user_id: &str) -> ServiceResult<ClaimResponse> {
        self.claim_at(token, user_id, Utc::now()).await
    }

    pub async fn claim_at(
        &self,
        token: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<ClaimResponse> {
        match self
            .db
            .sessions()
            .claim(&hash_token(token), user_id, now)
            .await?
        {
            ClaimOutcome::Claimed(claimed) => {
                info!(
                    session_id = %claimed.session_id,
                    project_id = %claimed.project_id,
                    user_id,
                    "Session claimed"
                );
                Ok(ClaimResponse {
                    success: true,
                    project_id: claimed.project_id,
                    transcription_id: claimed.transcription_id,
                    full_content: claimed.full_content,
                    claimed_at: claimed.claimed_at,
                })
            }
            ClaimOutcome::NotFound => Err(ServiceError::NotFound),
            ClaimOutcome::Expired => Err(ServiceError::Expired),
            ClaimOutcome::AlreadyClaimed => Err(ServiceError::AlreadyClaimed),
        }
    }

    /// Upload quota for a client IP.
    pub async fn rate_limit_info(&self, ip: &str) -> ServiceResult<RateLimitInfo> {
        Ok(self.limiter.info(ip).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::rate_limit::{InMemoryRateLimitBackend, RateLimitConfig};
    use crate::repository::test_support::{anonymous_upload, test_context};
    use crate::services::jobs::test_support::ScriptedProvider;
    use crate::services::ValidationError;
    use crate::storage::LocalObjectStore;
    use crate::transcription::TranscriptionConfig;

    const TEXT: &str = "Welcome back to the show. Today we are talking about compounding \
        habits and why small changes matter. Our guest has spent a decade studying this. \
        We start with mornings and how routines shape the rest of the day for most people.";

    async fn service() -> (tempfile::TempDir, DbContext, AnonymousService) {
        let (dir, db) = test_context().await;
        let store: BoxedObjectStore = Arc::new(LocalObjectStore::new(dir.path().join("objects")));
        let jobs = JobRunner::new(
            db.clone(),
            store.clone(),
            Arc::new(ScriptedProvider::succeeding(TEXT)),
            TranscriptionConfig {
                base_delay_ms: 1,
                ..Default::default()
            },
            2,
        );
        let limiter = UploadRateLimiter::new(
            Arc::new(InMemoryRateLimitBackend::new()),
            RateLimitConfig::default(),
        );
        let service = AnonymousService::new(
            db.clone(),
            store,
            limiter,
            jobs,
            &LimitsConfig::default(),
            SessionConfig::default(),
        );
        (dir, db, service)
    }

    fn mp3(bytes: Vec<u8>) -> UploadInput {
        UploadInput {
            file_name: "test.mp3".to_string(),
            content_type: Some("audio/mpeg".to_string()),
            bytes,
            ..Default::default()
        }
    }

    async fn wait_for_status(service: &AnonymousService, token: &str, status: SessionStatus) {
        for _ in 0..100 {
            if service.status(token).await.unwrap().status == status {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("session never reached {status}");
    }

    #[test]
    fn test_progress_policy() {
        let now = Utc::now();
        let (mut session, _) = anonymous_upload("p", now - Duration::seconds(100));
        assert_eq!(progress(&session, now, 45), (Some(0), Some(45)));

        session.status = SessionStatus::Processing;
        session.processing_started_at = Some(now - Duration::seconds(20));
        assert_eq!(progress(&session, now, 45), (Some(10), Some(25)));

        session.processing_started_at = Some(now - Duration::seconds(400));
        assert_eq!(progress(&session, now, 45), (Some(90), Some(5)));

        session.status = SessionStatus::Completed;
        assert_eq!(progress(&session, now, 45), (Some(100), Some(0)));
        session.status = SessionStatus::Failed;
        assert_eq!(progress(&session, now, 45), (None, None));
    }

    #[tokio::test]
    async fn test_upload_poll_preview_claim() {
        let (_dir, db, service) = service().await;

        let upload = service
            .create_upload("198.51.100.1", mp3(b"ID3\x03audio-bytes".to_vec()))
            .await
            .unwrap();
        assert_eq!(upload.session_token.len(), 64);
        assert_eq!(upload.status, SessionStatus::Uploaded);
        assert!(upload.message.contains("approximately 45 seconds"));

        // The raw token is never persisted
        let stored = db
            .sessions()
            .get_by_token_hash(&upload.session_token)
            .await
            .unwrap();
        assert!(stored.is_none());

        wait_for_status(&service, &upload.session_token, SessionStatus::Completed).await;

        let preview = service.preview(&upload.session_token).await.unwrap();
        assert!(preview.is_blurred && preview.signup_required);
        assert!(preview.transcription_preview.preview_text.chars().count() <= 150);
        assert_ne!(preview.transcription_preview.preview_text, TEXT);
        assert_eq!(preview.transcription_preview.total_word_count, 41);
        assert!(preview
            .conversion_message
            .starts_with("Your 3-minute audio has been transcribed into 41 words."));

        let claim = service
            .claim(&upload.session_token, "user_1")
            .await
            .unwrap();
        assert!(claim.success);
        assert_eq!(claim.full_content.as_deref(), Some(TEXT));

        assert!(matches!(
            service.claim(&upload.session_token, "user_2").await,
            Err(ServiceError::AlreadyClaimed)
        ));
        assert!(matches!(
            service.preview(&upload.session_token).await,
            Err(ServiceError::AlreadyClaimed)
        ));
        assert_eq!(
            service.status(&upload.session_token).await.unwrap().status,
            SessionStatus::Claimed
        );
    }

    #[tokio::test]
    async fn test_reported_expiry_matches_stored_expiry() {
        let (_dir, _db, service) = service().await;
        let upload = service
            .create_upload("198.51.100.9", mp3(b"ID3\x03audio-bytes".to_vec()))
            .await
            .unwrap();

        let status = service.status(&upload.session_token).await.unwrap();
        assert_eq!(status.expires_at, upload.expires_at);
        assert_eq!(upload.expires_at.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[tokio::test]
    async fn test_unknown_and_expired_tokens() {
        let (_dir, db, service) = service().await;
        assert!(matches!(
            service.status("nope").await,
            Err(ServiceError::NotFound)
        ));

        let token = generate_token();
        let (session, project) =
            anonymous_upload(&hash_token(&token), Utc::now() - Duration::days(8));
        db.sessions().create(&session, &project).await.unwrap();

        assert!(matches!(service.status(&token).await, Err(ServiceError::Expired)));
        assert!(matches!(service.preview(&token).await, Err(ServiceError::Expired)));
        assert!(matches!(
            service.claim(&token, "u").await,
            Err(ServiceError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_preview_while_processing() {
        let (_dir, db, service) = service().await;
        let token = generate_token();
        let (session, project) = anonymous_upload(&hash_token(&token), Utc::now());
        db.sessions().create(&session, &project).await.unwrap();

        match service.preview(&token).await {
            Err(ServiceError::StillProcessing {
                status,
                progress_percentage,
            }) => {
                assert_eq!(status, SessionStatus::Uploaded);
                assert_eq!(progress_percentage, Some(0));
            }
            other => panic!("expected still processing, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_upload_does_not_consume_quota() {
        let (_dir, _db, service) = service().await;
        let err = service
            .create_upload("203.0.113.9", mp3(Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::EmptyFile)
        ));

        let info = service.rate_limit_info("203.0.113.9").await.unwrap();
        assert_eq!(info.uploads_used_hour, 0);
        assert_eq!(info.uploads_remaining_hour, 3);
    }

    #[tokio::test]
    async fn test_fourth_upload_is_rate_limited() {
        let (_dir, _db, service) = service().await;
        for _ in 0..3 {
            service
                .create_upload("203.0.113.10", mp3(b"ID3data".to_vec()))
                .await
                .unwrap();
        }
        match service
            .create_upload("203.0.113.10", mp3(b"ID3data".to_vec()))
            .await
        {
            Err(ServiceError::RateLimited {
                retry_after_secs, ..
            }) => assert!(retry_after_secs > 0),
            other => panic!("expected rate limit, got {other:?}"),
        }

        // Other clients are unaffected
        service
            .create_upload("203.0.113.11", mp3(b"ID3data".to_vec()))
            .await
            .unwrap();
    }
}
