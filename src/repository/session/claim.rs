//! Atomic claim of an anonymous session by an authenticated user.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::SessionRepository;
use crate::models::SessionStatus;
use crate::repository::format_timestamp;
use crate::repository::pool::DbError;
use crate::schema::{anonymous_sessions, projects, transcriptions};
use crate::with_conn;

/// Result of a claim attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Claimed(ClaimedSession),
    NotFound,
    Expired,
    AlreadyClaimed,
}

/// Ownership transferred by a successful claim.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedSession {
    pub session_id: String,
    pub project_id: String,
    /// `None` when the session was claimed before transcription finished.
    pub transcription_id: Option<String>,
    pub full_content: Option<String>,
    pub claimed_at: DateTime<Utc>,
}

impl SessionRepository {
    /// Claim the session identified by `token_hash` for `user_id`.
    ///
    /// Runs as one transaction whose first statement is a compare-and-set on the
    /// session row. A concurrent claim blocks on that row and then matches zero
    /// rows, so exactly one claimer wins and the other sees `AlreadyClaimed`.
    /// Project and transcription ownership are reassigned in the same transaction.
    pub async fn claim(
        &self,
        token_hash: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, DbError> {
        let now_str = format_timestamp(now);
        let now_ref = now_str.as_str();
        let claimed = SessionStatus::Claimed.as_str();

        with_conn!(self.pool, conn => {
            conn.transaction::<_, DbError, _>(|conn| {
                async move {
                    let updated = diesel::update(
                        anonymous_sessions::table
                            .filter(anonymous_sessions::token_hash.eq(token_hash))
                            .filter(anonymous_sessions::status.ne(claimed))
                            .filter(anonymous_sessions::expires_at.ge(now_ref)),
                    )
                    .set((
                        anonymous_sessions::status.eq(claimed),
                        anonymous_sessions::claimed_by_user_id.eq(user_id),
                        anonymous_sessions::claimed_at.eq(now_ref),
                        anonymous_sessions::updated_at.eq(now_ref),
                    ))
                    .execute(conn)
                    .await?;

                    if updated == 0 {
                        let status: Option<String> = anonymous_sessions::table
                            .filter(anonymous_sessions::token_hash.eq(token_hash))
                            .select(anonymous_sessions::status)
                            .first::<String>(conn)
                            .await
                            .optional()?;
                        return Ok(match status.as_deref() {
                            None => ClaimOutcome::NotFound,
                            Some(s) if s == claimed => ClaimOutcome::AlreadyClaimed,
                            Some(_) => ClaimOutcome::Expired,
                        });
                    }

                    let (session_id, project_id): (String, String) = anonymous_sessions::table
                        .filter(anonymous_sessions::token_hash.eq(token_hash))
                        .select((anonymous_sessions::id, anonymous_sessions::project_id))
                        .first(conn)
                        .await?;

                    diesel::update(projects::table.find(&project_id))
                        .set((
                            projects::user_id.eq(user_id),
                            projects::updated_at.eq(now_ref),
                        ))
                        .execute(conn)
                        .await?;

                    diesel::update(
                        transcriptions::table.filter(transcriptions::project_id.eq(&project_id)),
                    )
                    .set((
                        transcriptions::user_id.eq(user_id),
                        transcriptions::updated_at.eq(now_ref),
                    ))
                    .execute(conn)
                    .await?;

                    let transcription: Option<(String, String)> = transcriptions::table
                        .filter(transcriptions::project_id.eq(&project_id))
                        .order(transcriptions::created_at.desc())
                        .select((transcriptions::id, transcriptions::content))
                        .first(conn)
                        .await
                        .optional()?;

                    let (transcription_id, full_content) = match transcription {
                        Some((id, content)) => (Some(id), Some(content)),
                        None => (None, None),
                    };

                    Ok(ClaimOutcome::Claimed(ClaimedSession {
                        session_id,
                        project_id,
                        transcription_id,
                        full_content,
                        claimed_at: now,
                    }))
                }
                .scope_boxed()
            })
            .await
        })
    }
}
