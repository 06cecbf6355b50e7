//! Repository layer for database persistence.
//!
//! All database access uses Diesel ORM. Supports both SQLite and PostgreSQL backends.

pub mod context;
pub mod job;
pub mod output;
pub mod pool;
pub mod project;
pub mod records;
pub mod session;
pub mod transcription;
pub mod util;

pub use context::DbContext;
pub use job::{PendingJob, TranscriptionJobRepository};
pub use output::{OutputChanges, OutputRepository, StatusChange};
pub use pool::{DbError, DbPool};
pub use project::ProjectRepository;
pub use session::{ClaimOutcome, ClaimedSession, SessionRepository, SweptSession};
pub use transcription::TranscriptionRepository;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Current time truncated to the precision timestamps are stored with.
pub fn stored_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Format a timestamp for storage.
///
/// Fixed-width microsecond precision keeps lexicographic order equal to
/// chronological order, so text comparisons in SQL are time comparisons.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixtures shared by repository and service tests.

    use chrono::{DateTime, Duration, SubsecRound, Utc};
    use tempfile::TempDir;

    use super::DbContext;
    use crate::models::{AnonymousSession, Project, ProjectStatus, SessionStatus};

    /// Fresh SQLite database in a temporary directory.
    pub async fn test_context() -> (TempDir, DbContext) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = DbContext::sqlite(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        (dir, ctx)
    }

    /// An unclaimed session and its placeholder project, not yet persisted.
    pub fn anonymous_upload(
        token_hash: &str,
        created_at: DateTime<Utc>,
    ) -> (AnonymousSession, Project) {
        let created_at = created_at.trunc_subsecs(6);
        let session_id = uuid::Uuid::new_v4().to_string();
        let project_id = uuid::Uuid::new_v4().to_string();
        let storage_path = format!("anonymous/{}/test.mp3", session_id);
        let session = AnonymousSession {
            id: session_id.clone(),
            token_hash: token_hash.to_string(),
            project_id: project_id.clone(),
            transcription_id: None,
            file_name: "test.mp3".to_string(),
            file_size: 2048,
            content_type: Some("audio/mpeg".to_string()),
            storage_path: storage_path.clone(),
            language: Some("en".to_string()),
            status: SessionStatus::Uploaded,
            error_message: None,
            ip_address: "203.0.113.7".to_string(),
            processing_started_at: None,
            expires_at: created_at + Duration::days(7),
            claimed_by_user_id: None,
            claimed_at: None,
            created_at,
            updated_at: created_at,
        };
        let project = Project {
            id: project_id,
            user_id: None,
            title: "Episode 12".to_string(),
            description: None,
            anonymous_session_id: Some(session_id),
            status: ProjectStatus::Uploaded,
            file_name: "test.mp3".to_string(),
            file_size: 2048,
            storage_path,
            language: Some("en".to_string()),
            created_at,
            updated_at: created_at,
        };
        (session, project)
    }
}
