//! Anonymous session repository.
//!
//! Every mutation is a guarded single-row statement inside a transaction. The
//! expiry predicate lives in SQL (`expires_at` compared with a timestamp taken
//! once per operation), so claim and cleanup agree on what "expired" means.

mod claim;
mod cleanup;

pub use claim::{ClaimOutcome, ClaimedSession};
pub use cleanup::SweptSession;

use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::pool::{DbError, DbPool};
use super::records::{NewProject, NewSession, SessionRecord};
use crate::models::{AnonymousSession, Project};
use crate::schema::{anonymous_sessions, projects};
use crate::with_conn;

/// Repository for anonymous upload sessions.
#[derive(Clone)]
pub struct SessionRepository {
    pool: DbPool,
}

impl SessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a session together with its placeholder project.
    pub async fn create(
        &self,
        session: &AnonymousSession,
        project: &Project,
    ) -> Result<(), DbError> {
        let new_session = NewSession::from(session);
        let new_project = NewProject::from(project);

        with_conn!(self.pool, conn => {
            conn.transaction::<_, DbError, _>(|conn| {
                async move {
                    diesel::insert_into(anonymous_sessions::table)
                        .values(&new_session)
                        .execute(conn)
                        .await?;
                    diesel::insert_into(projects::table)
                        .values(&new_project)
                        .execute(conn)
                        .await?;
                    Ok(())
                }
                .scope_boxed()
            })
            .await
        })
    }

    /// Look up a session by the SHA-256 digest of its token.
    pub async fn get_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<AnonymousSession>, DbError> {
        let record: Option<SessionRecord> = with_conn!(self.pool, conn => {
            anonymous_sessions::table
                .filter(anonymous_sessions::token_hash.eq(token_hash))
                .first::<SessionRecord>(&mut conn)
                .await
                .optional()?
        });
        Ok(record.map(AnonymousSession::from))
    }

    pub async fn get(&self, id: &str) -> Result<Option<AnonymousSession>, DbError> {
        let record: Option<SessionRecord> = with_conn!(self.pool, conn => {
            anonymous_sessions::table
                .find(id)
                .first::<SessionRecord>(&mut conn)
                .await
                .optional()?
        });
        Ok(record.map(AnonymousSession::from))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::models::SessionStatus;
    use crate::repository::test_support::{anonymous_upload, test_context};

    #[tokio::test]
    async fn test_create_and_lookup_by_token_hash() {
        let (_dir, ctx) = test_context().await;
        let (session, project) = anonymous_upload("hash-a", Utc::now());
        ctx.sessions().create(&session, &project).await.unwrap();

        let loaded = ctx
            .sessions()
            .get_by_token_hash("hash-a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.status, SessionStatus::Uploaded);
        assert_eq!(loaded.project_id, project.id);
        assert_eq!(loaded.expires_at, session.expires_at);

        let project = ctx.projects().get(&project.id).await.unwrap().unwrap();
        assert_eq!(project.user_id, None);
        assert_eq!(project.anonymous_session_id.as_deref(), Some(session.id.as_str()));

        assert!(ctx
            .sessions()
            .get_by_token_hash("unknown")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_token_hash_is_unique() {
        let (_dir, ctx) = test_context().await;
        let (first, first_project) = anonymous_upload("same-hash", Utc::now());
        let (second, second_project) = anonymous_upload("same-hash", Utc::now());

        ctx.sessions().create(&first, &first_project).await.unwrap();
        assert!(ctx.sessions().create(&second, &second_project).await.is_err());
        // The failed insert rolled back its project as well
        assert!(ctx.projects().get(&second_project.id).await.unwrap().is_none());
    }
}
