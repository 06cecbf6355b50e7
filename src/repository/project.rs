//! Project repository.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::pool::{DbError, DbPool};
use super::records::{NewProject, ProjectRecord};
use crate::models::Project;
use crate::schema::projects;
use crate::with_conn;

#[derive(Clone)]
pub struct ProjectRepository {
    pool: DbPool,
}

impl ProjectRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a project owned by an authenticated user.
    pub async fn create(&self, project: &Project) -> Result<(), DbError> {
        with_conn!(self.pool, conn => {
            diesel::insert_into(projects::table)
                .values(NewProject::from(project))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    pub async fn get(&self, id: &str) -> Result<Option<Project>, DbError> {
        let record: Option<ProjectRecord> = with_conn!(self.pool, conn => {
            projects::table
                .find(id)
                .first::<ProjectRecord>(&mut conn)
                .await
                .optional()?
        });
        Ok(record.map(Project::from))
    }

    /// Get a project only if `user_id` owns it.
    pub async fn get_owned(&self, id: &str, user_id: &str) -> Result<Option<Project>, DbError> {
        let record: Option<ProjectRecord> = with_conn!(self.pool, conn => {
            projects::table
                .find(id)
                .filter(projects::user_id.eq(user_id))
                .first::<ProjectRecord>(&mut conn)
                .await
                .optional()?
        });
        Ok(record.map(Project::from))
    }

    /// Newest first.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Project>, DbError> {
        let records: Vec<ProjectRecord> = with_conn!(self.pool, conn => {
            projects::table
                .filter(projects::user_id.eq(user_id))
                .order(projects::created_at.desc())
                .load::<ProjectRecord>(&mut conn)
                .await?
        });
        Ok(records.into_iter().map(Project::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::models::{Project, ProjectStatus};
    use crate::repository::test_support::test_context;

    fn owned_project(user_id: &str, title: &str, age_minutes: i64) -> Project {
        let created = Utc::now() - Duration::minutes(age_minutes);
        Project {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: Some(user_id.to_string()),
            title: title.to_string(),
            description: Some("weekly show".to_string()),
            anonymous_session_id: None,
            status: ProjectStatus::Uploaded,
            file_name: "ep.mp3".to_string(),
            file_size: 1024,
            storage_path: "users/u/ep.mp3".to_string(),
            language: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[tokio::test]
    async fn test_list_and_ownership() {
        let (_dir, ctx) = test_context().await;
        let repo = ctx.projects();
        let older = owned_project("alice", "Older", 10);
        let newer = owned_project("alice", "Newer", 1);
        let other = owned_project("bob", "Bob's", 5);
        for p in [&older, &newer, &other] {
            repo.create(p).await.unwrap();
        }

        let titles: Vec<String> = repo
            .list_for_user("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["Newer", "Older"]);

        assert!(repo.get_owned(&other.id, "alice").await.unwrap().is_none());
        assert!(repo.get_owned(&other.id, "bob").await.unwrap().is_some());
    }
}
