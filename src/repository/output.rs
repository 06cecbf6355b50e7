//! Output job repository.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::format_timestamp;
use super::pool::{DbError, DbPool};
use super::records::{NewOutput, OutputRecord};
use crate::models::{Output, OutputStatus};
use crate::schema::outputs;
use crate::with_conn;

/// Content fields a user may edit on an output.
#[derive(Debug, Clone, Default)]
pub struct OutputChanges {
    pub body: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// A status move that only lands while the output is still in `from`.
#[derive(Debug, Clone, Copy)]
pub struct StatusChange<'a> {
    pub from: OutputStatus,
    pub to: OutputStatus,
    pub error_message: Option<&'a str>,
}

#[derive(Clone)]
pub struct OutputRepository {
    pool: DbPool,
}

impl OutputRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, output: &Output) -> Result<(), DbError> {
        with_conn!(self.pool, conn => {
            diesel::insert_into(outputs::table)
                .values(NewOutput::from(output))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    /// Get an output only if `user_id` owns it.
    pub async fn get_owned(&self, id: &str, user_id: &str) -> Result<Option<Output>, DbError> {
        let record: Option<OutputRecord> = with_conn!(self.pool, conn => {
            outputs::table
                .find(id)
                .filter(outputs::user_id.eq(user_id))
                .first::<OutputRecord>(&mut conn)
                .await
                .optional()?
        });
        Ok(record.map(Output::from))
    }

    /// Newest first.
    pub async fn list_for_project(&self, project_id: &str) -> Result<Vec<Output>, DbError> {
        let records: Vec<OutputRecord> = with_conn!(self.pool, conn => {
            outputs::table
                .filter(outputs::project_id.eq(project_id))
                .order(outputs::created_at.desc())
                .load::<OutputRecord>(&mut conn)
                .await?
        });
        Ok(records.into_iter().map(Output::from).collect())
    }

    /// Apply content edits and an optional status move in one transaction.
    ///
    /// Returns `false` and writes nothing if the output is gone or the status
    /// move lost its compare-and-set.
    pub async fn update(
        &self,
        id: &str,
        changes: &OutputChanges,
        status: Option<StatusChange<'_>>,
    ) -> Result<bool, DbError> {
        if let Some(change) = status {
            if !change.from.can_transition_to(change.to) {
                return Ok(false);
            }
        }
        let now = format_timestamp(Utc::now());
        let now = now.as_str();
        let metadata = changes.metadata.as_ref().map(|m| m.to_string());
        let metadata = metadata.as_deref();
        let body = changes.body.as_deref();

        with_conn!(self.pool, conn => {
            conn.transaction::<_, DbError, _>(|conn| {
                async move {
                    if let Some(change) = status {
                        let moved = diesel::update(
                            outputs::table
                                .find(id)
                                .filter(outputs::status.eq(change.from.as_str())),
                        )
                        .set((
                            outputs::status.eq(change.to.as_str()),
                            outputs::error_message.eq(change.error_message),
                            outputs::updated_at.eq(now),
                        ))
                        .execute(conn)
                        .await?;
                        if moved == 0 {
                            return Ok(false);
                        }
                    }

                    let target = outputs::table.find(id);
                    let updated = match (body, metadata) {
                        (Some(body), Some(metadata)) => diesel::update(target)
                            .set((
                                outputs::body.eq(body),
                                outputs::metadata.eq(metadata),
                                outputs::updated_at.eq(now),
                            ))
                            .execute(conn)
                            .await?,
                        (Some(body), None) => diesel::update(target)
                            .set((outputs::body.eq(body), outputs::updated_at.eq(now)))
                            .execute(conn)
                            .await?,
                        (None, Some(metadata)) => diesel::update(target)
                            .set((outputs::metadata.eq(metadata), outputs::updated_at.eq(now)))
                            .execute(conn)
                            .await?,
                        (None, None) => target.count().get_result::<i64>(conn).await? as usize,
                    };
                    Ok(updated > 0)
                }
                .scope_boxed()
            })
            .await
        })
    }

    pub async fn delete(&self, id: &str) -> Result<bool, DbError> {
        let deleted = with_conn!(self.pool, conn => {
            diesel::delete(outputs::table.find(id))
                .execute(&mut conn)
                .await?
        });
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::models::{OutputKind, Project, ProjectStatus};
    use crate::repository::test_support::test_context;
    use crate::repository::DbContext;

    async fn seeded_output(ctx: &DbContext) -> Output {
        let now = Utc::now();
        let project = Project {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: Some("owner".to_string()),
            title: "Talk".to_string(),
            description: None,
            anonymous_session_id: None,
            status: ProjectStatus::Completed,
            file_name: "talk.wav".to_string(),
            file_size: 10,
            storage_path: "users/owner/talk.wav".to_string(),
            language: None,
            created_at: now,
            updated_at: now,
        };
        ctx.projects().create(&project).await.unwrap();

        let output = Output {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project.id,
            user_id: "owner".to_string(),
            kind: OutputKind::Blog,
            status: OutputStatus::Queued,
            request: json!({"tone": "casual"}),
            body: None,
            metadata: json!({}),
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        ctx.outputs().create(&output).await.unwrap();
        output
    }

    fn moving(from: OutputStatus, to: OutputStatus) -> Option<StatusChange<'static>> {
        Some(StatusChange {
            from,
            to,
            error_message: None,
        })
    }

    #[tokio::test]
    async fn test_status_only_moves_forward() {
        let (_dir, ctx) = test_context().await;
        let output = seeded_output(&ctx).await;
        let repo = ctx.outputs();
        let none = OutputChanges::default();

        assert!(repo
            .update(&output.id, &none, moving(OutputStatus::Queued, OutputStatus::Processing))
            .await
            .unwrap());
        // Stale `from` is rejected
        assert!(!repo
            .update(&output.id, &none, moving(OutputStatus::Queued, OutputStatus::Processing))
            .await
            .unwrap());
        assert!(repo
            .update(&output.id, &none, moving(OutputStatus::Processing, OutputStatus::Completed))
            .await
            .unwrap());
        assert!(!repo
            .update(&output.id, &none, moving(OutputStatus::Completed, OutputStatus::Processing))
            .await
            .unwrap());

        let loaded = repo.get_owned(&output.id, "owner").await.unwrap().unwrap();
        assert_eq!(loaded.status, OutputStatus::Completed);
        assert_eq!(loaded.request, json!({"tone": "casual"}));
    }

    #[tokio::test]
    async fn test_lost_status_race_keeps_content() {
        let (_dir, ctx) = test_context().await;
        let output = seeded_output(&ctx).await;
        let repo = ctx.outputs();

        // Another writer moves the output on first
        assert!(repo
            .update(
                &output.id,
                &OutputChanges::default(),
                moving(OutputStatus::Queued, OutputStatus::Processing),
            )
            .await
            .unwrap());

        let stale = OutputChanges {
            body: Some("overwritten?".to_string()),
            metadata: Some(json!({"stale": true})),
        };
        assert!(!repo
            .update(&output.id, &stale, moving(OutputStatus::Queued, OutputStatus::Failed))
            .await
            .unwrap());

        let loaded = repo.get_owned(&output.id, "owner").await.unwrap().unwrap();
        assert_eq!(loaded.status, OutputStatus::Processing);
        assert_eq!(loaded.body, None);
        assert_eq!(loaded.metadata, json!({}));
    }

    #[tokio::test]
    async fn test_update_content_and_delete() {
        let (_dir, ctx) = test_context().await;
        let output = seeded_output(&ctx).await;
        let repo = ctx.outputs();

        let changes = OutputChanges {
            body: Some("# Draft".to_string()),
            metadata: Some(json!({"words": 2})),
        };
        assert!(repo.update(&output.id, &changes, None).await.unwrap());
        let loaded = repo.get_owned(&output.id, "owner").await.unwrap().unwrap();
        assert_eq!(loaded.body.as_deref(), Some("# Draft"));
        assert_eq!(loaded.metadata, json!({"words": 2}));

        assert!(repo.get_owned(&output.id, "intruder").await.unwrap().is_none());
        assert_eq!(repo.list_for_project(&output.project_id).await.unwrap().len(), 1);
        assert!(repo.delete(&output.id).await.unwrap());
        assert!(!repo.delete(&output.id).await.unwrap());
        assert!(!repo.update(&output.id, &changes, None).await.unwrap());
    }
}
