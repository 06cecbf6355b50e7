//! State writes made by the background transcription job.
//!
//! The job is the only writer of `processing -> completed | failed`. Every write
//! that touches a session is a compare-and-set on its status, so a concurrent
//! claim is never overwritten.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::{format_timestamp, stored_now};
use super::pool::{DbError, DbPool};
use super::records::NewTranscription;
use crate::models::{ProjectStatus, SessionStatus, Transcription};
use crate::schema::{anonymous_sessions, projects, transcriptions};
use crate::with_conn;

/// A project whose media still has to be transcribed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingJob {
    pub project_id: String,
    pub session_id: Option<String>,
    pub storage_path: String,
    pub file_name: String,
    pub language: Option<String>,
}

#[derive(Clone)]
pub struct TranscriptionJobRepository {
    pool: DbPool,
}

impl TranscriptionJobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Move a project (and its session, if any) into `processing`.
    ///
    /// Returns `false` when there is nothing left to do: the project is gone or
    /// already finished. A project already in `processing` is resumed.
    pub async fn begin(
        &self,
        project_id: &str,
        session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let now = format_timestamp(now);
        let now = now.as_str();
        let pending = vec![
            ProjectStatus::Uploaded.as_str(),
            ProjectStatus::Processing.as_str(),
        ];

        with_conn!(self.pool, conn => {
            conn.transaction::<_, DbError, _>(|conn| {
                async move {
                    let updated = diesel::update(
                        projects::table
                            .find(project_id)
                            .filter(projects::status.eq_any(pending)),
                    )
                    .set((
                        projects::status.eq(ProjectStatus::Processing.as_str()),
                        projects::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .await?;

                    if updated == 0 {
                        return Ok(false);
                    }

                    if let Some(session_id) = session_id {
                        diesel::update(
                            anonymous_sessions::table
                                .find(session_id)
                                .filter(anonymous_sessions::status.eq(SessionStatus::Uploaded.as_str())),
                        )
                        .set((
                            anonymous_sessions::status.eq(SessionStatus::Processing.as_str()),
                            anonymous_sessions::processing_started_at.eq(now),
                            anonymous_sessions::updated_at.eq(now),
                        ))
                        .execute(conn)
                        .await?;
                    }

                    Ok(true)
                }
                .scope_boxed()
            })
            .await
        })
    }

    /// Store a finished transcription and mark the project and session completed.
    ///
    /// The transcription is owned by whoever owns the project at commit time, so a
    /// claim that lands while the provider call is running still ends up owning it.
    /// Returns `None` if the project was deleted in the meantime.
    pub async fn complete(
        &self,
        project_id: &str,
        session_id: Option<&str>,
        draft: &Transcription,
    ) -> Result<Option<Transcription>, DbError> {
        let now = stored_now();
        let now_str = format_timestamp(now);
        let now_ref = now_str.as_str();

        with_conn!(self.pool, conn => {
            conn.transaction::<_, DbError, _>(|conn| {
                async move {
                    // Lock the session row first so a concurrent claim serializes with
                    // us. A claimed row matches nothing and stays untouched.
                    if let Some(session_id) = session_id {
                        diesel::update(
                            anonymous_sessions::table
                                .find(session_id)
                                .filter(anonymous_sessions::status.ne(SessionStatus::Claimed.as_str())),
                        )
                        .set(anonymous_sessions::updated_at.eq(now_ref))
                            .execute(conn)
                            .await?;
                    }

                    let owner: Option<Option<String>> = projects::table
                        .find(project_id)
                        .select(projects::user_id)
                        .first::<Option<String>>(conn)
                        .await
                        .optional()?;
                    let Some(owner) = owner else {
                        return Ok(None);
                    };

                    let mut stored = draft.clone();
                    stored.project_id = project_id.to_string();
                    stored.user_id = owner;
                    stored.created_at = now;
                    stored.updated_at = now;

                    diesel::insert_into(transcriptions::table)
                        .values(NewTranscription::from(&stored))
                        .execute(conn)
                        .await?;

                    diesel::update(projects::table.find(project_id))
                        .set((
                            projects::status.eq(ProjectStatus::Completed.as_str()),
                            projects::updated_at.eq(now_ref),
                        ))
                        .execute(conn)
                        .await?;

                    if let Some(session_id) = session_id {
                        diesel::update(
                            anonymous_sessions::table
                                .find(session_id)
                                .filter(anonymous_sessions::status.eq(SessionStatus::Processing.as_str())),
                        )
                        .set((
                            anonymous_sessions::status.eq(SessionStatus::Completed.as_str()),
                            anonymous_sessions::transcription_id.eq(stored.id.as_str()),
                            anonymous_sessions::error_message.eq(None::<String>),
                            anonymous_sessions::updated_at.eq(now_ref),
                        ))
                        .execute(conn)
                        .await?;
                    }

                    Ok(Some(stored))
                }
                .scope_boxed()
            })
            .await
        })
    }

    /// Record a terminal failure visible to the polling client.
    pub async fn fail(
        &self,
        project_id: &str,
        session_id: Option<&str>,
        message: &str,
    ) -> Result<(), DbError> {
        let now = format_timestamp(Utc::now());
        let now = now.as_str();

        with_conn!(self.pool, conn => {
            conn.transaction::<_, DbError, _>(|conn| {
                async move {
                    if let Some(session_id) = session_id {
                        diesel::update(
                            anonymous_sessions::table
                                .find(session_id)
                                .filter(anonymous_sessions::status.eq(SessionStatus::Processing.as_str())),
                        )
                        .set((
                            anonymous_sessions::status.eq(SessionStatus::Failed.as_str()),
                            anonymous_sessions::error_message.eq(message),
                            anonymous_sessions::updated_at.eq(now),
                        ))
                        .execute(conn)
                        .await?;
                    }

                    diesel::update(
                        projects::table
                            .find(project_id)
                            .filter(projects::status.eq(ProjectStatus::Processing.as_str())),
                    )
                    .set((
                        projects::status.eq(ProjectStatus::Failed.as_str()),
                        projects::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .await?;

                    Ok(())
                }
                .scope_boxed()
            })
            .await
        })
    }

    /// Projects left in `uploaded` or `processing`, e.g. after a restart.
    pub async fn pending(&self) -> Result<Vec<PendingJob>, DbError> {
        let pending = vec![
            ProjectStatus::Uploaded.as_str(),
            ProjectStatus::Processing.as_str(),
        ];

        let rows: Vec<(String, Option<String>, String, String, Option<String>)> =
            with_conn!(self.pool, conn => {
                projects::table
                    .filter(projects::status.eq_any(pending))
                    .order(projects::created_at.asc())
                    .select((
                        projects::id,
                        projects::anonymous_session_id,
                        projects::storage_path,
                        projects::file_name,
                        projects::language,
                    ))
                    .load(&mut conn)
                    .await?
            });

        Ok(rows
            .into_iter()
            .map(
                |(project_id, session_id, storage_path, file_name, language)| PendingJob {
                    project_id,
                    session_id,
                    storage_path,
                    file_name,
                    language,
                },
            )
            .collect())
    }
}
