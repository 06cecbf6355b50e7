//! Diesel row types and conversions to domain models.

use diesel::prelude::*;

use super::{format_timestamp, parse_datetime, parse_datetime_opt};
use crate::models::{
    AnonymousSession, Output, OutputKind, OutputStatus, Project, ProjectStatus, SessionStatus,
    Transcription,
};
use crate::schema::{anonymous_sessions, outputs, projects, transcriptions, upload_events};

/// Anonymous session row.
#[derive(Queryable, Debug, Clone)]
#[diesel(table_name = anonymous_sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SessionRecord {
    pub id: String,
    pub token_hash: String,
    pub project_id: String,
    pub transcription_id: Option<String>,
    pub file_name: String,
    pub file_size: i64,
    pub content_type: Option<String>,
    pub storage_path: String,
    pub language: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub ip_address: String,
    pub processing_started_at: Option<String>,
    pub expires_at: String,
    pub claimed_by_user_id: Option<String>,
    pub claimed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// New anonymous session for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = anonymous_sessions)]
pub struct NewSession<'a> {
    pub id: &'a str,
    pub token_hash: &'a str,
    pub project_id: &'a str,
    pub transcription_id: Option<&'a str>,
    pub file_name: &'a str,
    pub file_size: i64,
    pub content_type: Option<&'a str>,
    pub storage_path: &'a str,
    pub language: Option<&'a str>,
    pub status: &'a str,
    pub error_message: Option<&'a str>,
    pub ip_address: &'a str,
    pub processing_started_at: Option<String>,
    pub expires_at: String,
    pub claimed_by_user_id: Option<&'a str>,
    pub claimed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl<'a> From<&'a AnonymousSession> for NewSession<'a> {
    fn from(session: &'a AnonymousSession) -> Self {
        Self {
            id: &session.id,
            token_hash: &session.token_hash,
            project_id: &session.project_id,
            transcription_id: session.transcription_id.as_deref(),
            file_name: &session.file_name,
            file_size: session.file_size as i64,
            content_type: session.content_type.as_deref(),
            storage_path: &session.storage_path,
            language: session.language.as_deref(),
            status: session.status.as_str(),
            error_message: session.error_message.as_deref(),
            ip_address: &session.ip_address,
            processing_started_at: session.processing_started_at.map(format_timestamp),
            expires_at: format_timestamp(session.expires_at),
            claimed_by_user_id: session.claimed_by_user_id.as_deref(),
            claimed_at: session.claimed_at.map(format_timestamp),
            created_at: format_timestamp(session.created_at),
            updated_at: format_timestamp(session.updated_at),
        }
    }
}

impl From<SessionRecord> for AnonymousSession {
    fn from(record: SessionRecord) -> Self {
        Self {
            status: SessionStatus::from_str(&record.status).unwrap_or(SessionStatus::Failed),
            file_size: record.file_size.max(0) as u64,
            processing_started_at: parse_datetime_opt(record.processing_started_at),
            expires_at: parse_datetime(&record.expires_at),
            claimed_at: parse_datetime_opt(record.claimed_at),
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
            id: record.id,
            token_hash: record.token_hash,
            project_id: record.project_id,
            transcription_id: record.transcription_id,
            file_name: record.file_name,
            content_type: record.content_type,
            storage_path: record.storage_path,
            language: record.language,
            error_message: record.error_message,
            ip_address: record.ip_address,
            claimed_by_user_id: record.claimed_by_user_id,
        }
    }
}

/// Project row.
#[derive(Queryable, Debug, Clone)]
#[diesel(table_name = projects)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProjectRecord {
    pub id: String,
    pub user_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub anonymous_session_id: Option<String>,
    pub status: String,
    pub file_name: String,
    pub file_size: i64,
    pub storage_path: String,
    pub language: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// New project for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = projects)]
pub struct NewProject<'a> {
    pub id: &'a str,
    pub user_id: Option<&'a str>,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub anonymous_session_id: Option<&'a str>,
    pub status: &'a str,
    pub file_name: &'a str,
    pub file_size: i64,
    pub storage_path: &'a str,
    pub language: Option<&'a str>,
    pub created_at: String,
    pub updated_at: String,
}

impl<'a> From<&'a Project> for NewProject<'a> {
    fn from(project: &'a Project) -> Self {
        Self {
            id: &project.id,
            user_id: project.user_id.as_deref(),
            title: &project.title,
            description: project.description.as_deref(),
            anonymous_session_id: project.anonymous_session_id.as_deref(),
            status: project.status.as_str(),
            file_name: &project.file_name,
            file_size: project.file_size as i64,
            storage_path: &project.storage_path,
            language: project.language.as_deref(),
            created_at: format_timestamp(project.created_at),
            updated_at: format_timestamp(project.updated_at),
        }
    }
}

impl From<ProjectRecord> for Project {
    fn from(record: ProjectRecord) -> Self {
        Self {
            status: ProjectStatus::from_str(&record.status).unwrap_or(ProjectStatus::Failed),
            file_size: record.file_size.max(0) as u64,
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
            id: record.id,
            user_id: record.user_id,
            title: record.title,
            description: record.description,
            anonymous_session_id: record.anonymous_session_id,
            file_name: record.file_name,
            storage_path: record.storage_path,
            language: record.language,
        }
    }
}

/// Transcription row.
#[derive(Queryable, Debug, Clone)]
#[diesel(table_name = transcriptions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TranscriptionRecord {
    pub id: String,
    pub project_id: String,
    pub user_id: Option<String>,
    pub content: String,
    pub language: Option<String>,
    pub duration_seconds: Option<f64>,
    pub word_count: i32,
    pub confidence: Option<f64>,
    pub segments: String,
    pub provider: String,
    pub model: String,
    pub processing_time_ms: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// New transcription for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = transcriptions)]
pub struct NewTranscription<'a> {
    pub id: &'a str,
    pub project_id: &'a str,
    pub user_id: Option<&'a str>,
    pub content: &'a str,
    pub language: Option<&'a str>,
    pub duration_seconds: Option<f64>,
    pub word_count: i32,
    pub confidence: Option<f64>,
    pub segments: String,
    pub provider: &'a str,
    pub model: &'a str,
    pub processing_time_ms: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl<'a> From<&'a Transcription> for NewTranscription<'a> {
    fn from(t: &'a Transcription) -> Self {
        Self {
            id: &t.id,
            project_id: &t.project_id,
            user_id: t.user_id.as_deref(),
            content: &t.content,
            language: t.language.as_deref(),
            duration_seconds: t.duration_seconds,
            word_count: i32::try_from(t.word_count).unwrap_or(i32::MAX),
            confidence: t.confidence,
            segments: serde_json::to_string(&t.segments).unwrap_or_else(|_| "[]".to_string()),
            provider: &t.provider,
            model: &t.model,
            processing_time_ms: i64::try_from(t.processing_time_ms).unwrap_or(i64::MAX),
            created_at: format_timestamp(t.created_at),
            updated_at: format_timestamp(t.updated_at),
        }
    }
}

impl From<TranscriptionRecord> for Transcription {
    fn from(record: TranscriptionRecord) -> Self {
        Self {
            segments: serde_json::from_str(&record.segments).unwrap_or_default(),
            word_count: record.word_count.max(0) as u32,
            processing_time_ms: record.processing_time_ms.max(0) as u64,
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
            id: record.id,
            project_id: record.project_id,
            user_id: record.user_id,
            content: record.content,
            language: record.language,
            duration_seconds: record.duration_seconds,
            confidence: record.confidence,
            provider: record.provider,
            model: record.model,
        }
    }
}

/// Output job row.
#[derive(Queryable, Debug, Clone)]
#[diesel(table_name = outputs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct OutputRecord {
    pub id: String,
    pub project_id: String,
    pub user_id: String,
    pub kind: String,
    pub status: String,
    pub request: String,
    pub body: Option<String>,
    pub metadata: String,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// New output job for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = outputs)]
pub struct NewOutput<'a> {
    pub id: &'a str,
    pub project_id: &'a str,
    pub user_id: &'a str,
    pub kind: &'a str,
    pub status: &'a str,
    pub request: String,
    pub body: Option<&'a str>,
    pub metadata: String,
    pub error_message: Option<&'a str>,
    pub created_at: String,
    pub updated_at: String,
}

impl<'a> From<&'a Output> for NewOutput<'a> {
    fn from(output: &'a Output) -> Self {
        Self {
            id: &output.id,
            project_id: &output.project_id,
            user_id: &output.user_id,
            kind: output.kind.as_str(),
            status: output.status.as_str(),
            request: output.request.to_string(),
            body: output.body.as_deref(),
            metadata: output.metadata.to_string(),
            error_message: output.error_message.as_deref(),
            created_at: format_timestamp(output.created_at),
            updated_at: format_timestamp(output.updated_at),
        }
    }
}

impl From<OutputRecord> for Output {
    fn from(record: OutputRecord) -> Self {
        Self {
            kind: OutputKind::from_str(&record.kind).unwrap_or(OutputKind::Blog),
            status: OutputStatus::from_str(&record.status).unwrap_or(OutputStatus::Failed),
            request: serde_json::from_str(&record.request).unwrap_or(serde_json::Value::Null),
            metadata: serde_json::from_str(&record.metadata)
                .unwrap_or_else(|_| serde_json::json!({})),
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
            id: record.id,
            project_id: record.project_id,
            user_id: record.user_id,
            body: record.body,
            error_message: record.error_message,
        }
    }
}

/// Upload admission record counted by the rate limiter.
#[derive(Insertable, Debug)]
#[diesel(table_name = upload_events)]
pub struct NewUploadEvent<'a> {
    pub id: &'a str,
    pub ip_address: &'a str,
    pub created_at: &'a str,
}
