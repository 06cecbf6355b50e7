//! Removal of expired, unclaimed sessions.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::SessionRepository;
use crate::models::SessionStatus;
use crate::repository::format_timestamp;
use crate::repository::pool::DbError;
use crate::schema::{anonymous_sessions, outputs, projects, transcriptions};
use crate::with_conn;

/// A session deleted by the sweep. The stored object still has to be removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweptSession {
    pub session_id: String,
    pub project_id: String,
    pub storage_path: String,
}

impl SessionRepository {
    /// Delete every session that is expired at `now` along with its project rows.
    ///
    /// Each row is removed in its own transaction guarded by the same predicate
    /// the claim uses, so a session claimed between listing and deleting survives.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<SweptSession>, DbError> {
        let now_str = format_timestamp(now);
        let claimed = SessionStatus::Claimed.as_str();

        let candidates: Vec<(String, String, String)> = with_conn!(self.pool, conn => {
            anonymous_sessions::table
                .filter(anonymous_sessions::expires_at.lt(&now_str))
                .filter(anonymous_sessions::status.ne(claimed))
                .select((
                    anonymous_sessions::id,
                    anonymous_sessions::project_id,
                    anonymous_sessions::storage_path,
                ))
                .load(&mut conn)
                .await?
        });

        let mut swept = Vec::with_capacity(candidates.len());
        for (session_id, project_id, storage_path) in candidates {
            if self
                .delete_if_expired(&session_id, &project_id, &now_str)
                .await?
            {
                swept.push(SweptSession {
                    session_id,
                    project_id,
                    storage_path,
                });
            }
        }

        Ok(swept)
    }

    async fn delete_if_expired(
        &self,
        session_id: &str,
        project_id: &str,
        now: &str,
    ) -> Result<bool, DbError> {
        let claimed = SessionStatus::Claimed.as_str();

        with_conn!(self.pool, conn => {
            conn.transaction::<_, DbError, _>(|conn| {
                async move {
                    let deleted = diesel::delete(
                        anonymous_sessions::table
                            .filter(anonymous_sessions::id.eq(session_id))
                            .filter(anonymous_sessions::status.ne(claimed))
                            .filter(anonymous_sessions::expires_at.lt(now)),
                    )
                    .execute(conn)
                    .await?;

                    if deleted == 0 {
                        return Ok(false);
                    }

                    diesel::delete(outputs::table.filter(outputs::project_id.eq(project_id)))
                        .execute(conn)
                        .await?;
                    diesel::delete(
                        transcriptions::table.filter(transcriptions::project_id.eq(project_id)),
                    )
                    .execute(conn)
                    .await?;
                    diesel::delete(projects::table.find(project_id))
                        .execute(conn)
                        .await?;

                    Ok(true)
                }
                .scope_boxed()
            })
            .await
        })
    }
}
