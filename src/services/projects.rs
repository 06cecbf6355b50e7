//! Project and output operations for signed-in users.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::validation::{validate_upload, UploadInput, UploadLimits};
use super::{JobRunner, ServiceError, ServiceResult};
use crate::config::{LimitsConfig, SessionConfig};
use crate::models::{Output, OutputKind, OutputStatus, Project, ProjectStatus, Transcription};
use crate::repository::{stored_now, DbContext, OutputChanges, PendingJob, StatusChange};
use crate::storage::{user_object_key, BoxedObjectStore};

#[derive(Debug, Clone, Serialize)]
pub struct ProjectUploadResponse {
    pub project_id: String,
    pub status: ProjectStatus,
    pub estimated_time_seconds: u64,
}

/// A project with its latest transcription, if any.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub transcription: Option<Transcription>,
}

/// Partial update of an output.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputPatch {
    pub body: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub status: Option<OutputStatus>,
    pub error_message: Option<String>,
}

#[derive(Clone)]
pub struct ProjectService {
    db: DbContext,
    store: BoxedObjectStore,
    jobs: JobRunner,
    limits: UploadLimits,
    estimated_processing_secs: u64,
}

impl ProjectService {
    pub fn new(
        db: DbContext,
        store: BoxedObjectStore,
        jobs: JobRunner,
        limits: &LimitsConfig,
        session: &SessionConfig,
    ) -> Self {
        Self {
            db,
            store,
            jobs,
            limits: UploadLimits {
                max_bytes: limits.authenticated_max_bytes(),
                allowed_extensions: limits.allowed_extensions.clone(),
            },
            estimated_processing_secs: session.estimated_processing_secs,
        }
    }

    /// Direct upload by a signed-in user. Not rate limited.
    pub async fn upload(
        &self,
        user_id: &str,
        input: UploadInput,
    ) -> ServiceResult<ProjectUploadResponse> {
        let valid = validate_upload(&input, &self.limits)?;
        let now = stored_now();
        let project_id = uuid::Uuid::new_v4().to_string();
        let storage_path = user_object_key(user_id, &project_id, &input.file_name);

        self.store
            .put(&storage_path, &input.bytes, Some(&valid.content_type))
            .await?;

        let project = Project {
            id: project_id.clone(),
            user_id: Some(user_id.to_string()),
            title: valid.title,
            description: valid.description,
            anonymous_session_id: None,
            status: ProjectStatus::Uploaded,
            file_name: input.file_name.clone(),
            file_size: input.bytes.len() as u64,
            storage_path: storage_path.clone(),
            language: valid.language.clone(),
            created_at: now,
            updated_at: now,
        };
        if let Err(e) = self.db.projects().create(&project).await {
            if let Err(cleanup) = self.store.delete(&storage_path).await {
                warn!(project_id = %project_id, error = %cleanup, "Failed to remove orphaned upload");
            }
            return Err(e.into());
        }
        info!(project_id = %project_id, user_id, "Project uploaded");

        self.jobs.enqueue(PendingJob {
            project_id: project_id.clone(),
            session_id: None,
            storage_path,
            file_name: input.file_name,
            language: valid.language,
        });

        Ok(ProjectUploadResponse {
            project_id,
            status: ProjectStatus::Uploaded,
            estimated_time_seconds: self.estimated_processing_secs,
        })
    }

    pub async fn list(&self, user_id: &str) -> ServiceResult<Vec<Project>> {
        Ok(self.db.projects().list_for_user(user_id).await?)
    }

    async fn owned_project(&self, user_id: &str, project_id: &str) -> ServiceResult<Project> {
        self.db
            .projects()
            .get_owned(project_id, user_id)
            .await?
            .ok_or(ServiceError::ProjectNotFound)
    }

    pub async fn get(&self, user_id: &str, project_id: &str) -> ServiceResult<ProjectDetail> {
        let project = self.owned_project(user_id, project_id).await?;
        let transcription = self
            .db
            .transcriptions()
            .latest_for_project(&project.id)
            .await?;
        Ok(ProjectDetail {
            project,
            transcription,
        })
    }

    /// Queue an output job for a transcribed project.
    pub async fn generate(
        &self,
        user_id: &str,
        project_id: &str,
        kind: &str,
        request: serde_json::Value,
    ) -> ServiceResult<Output> {
        let kind = OutputKind::from_str(kind)
            .ok_or_else(|| ServiceError::InvalidOutputKind(kind.to_string()))?;
        let project = self.owned_project(user_id, project_id).await?;
        if self
            .db
            .transcriptions()
            .latest_for_project(&project.id)
            .await?
            .is_none()
        {
            return Err(ServiceError::TranscriptionNotReady);
        }

        let now = stored_now();
        let output = Output {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project.id,
            user_id: user_id.to_string(),
            kind,
            status: OutputStatus::Queued,
            request: if request.is_null() {
                serde_json::json!({})
            } else {
                request
            },
            body: None,
            metadata: serde_json::json!({}),
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        self.db.outputs().create(&output).await?;
        info!(output_id = %output.id, kind = kind.as_str(), "Output queued");
        Ok(output)
    }

    pub async fn list_outputs(&self, user_id: &str, project_id: &str) -> ServiceResult<Vec<Output>> {
        let project = self.owned_project(user_id, project_id).await?;
        Ok(self.db.outputs().list_for_project(&project.id).await?)
    }

    pub async fn get_output(&self, user_id: &str, output_id: &str) -> ServiceResult<Output> {
        self.db
            .outputs()
            .get_owned(output_id, user_id)
            .await?
            .ok_or(ServiceError::OutputNotFound)
    }

    /// Apply content edits and an optional forward status change.
    ///
    /// The status edge is checked before anything is written.
    pub async fn update_output(
        &self,
        user_id: &str,
        output_id: &str,
        patch: OutputPatch,
    ) -> ServiceResult<Output> {
        let current = self.get_output(user_id, output_id).await?;
        let outputs = self.db.outputs();

        let target = patch.status.filter(|to| *to != current.status);
        if let Some(to) = target {
            if !current.status.can_transition_to(to) {
                return Err(ServiceError::InvalidTransition {
                    from: current.status,
                    to,
                });
            }
        }

        let changes = OutputChanges {
            body: patch.body,
            metadata: patch.metadata,
        };
        let status = target.map(|to| StatusChange {
            from: current.status,
            to,
            error_message: patch.error_message.as_deref(),
        });
        if !outputs.update(&current.id, &changes, status).await? {
            return Err(match target {
                // Someone else moved it first
                Some(to) => ServiceError::InvalidTransition {
                    from: current.status,
                    to,
                },
                None => ServiceError::OutputNotFound,
            });
        }

        self.get_output(user_id, output_id).await
    }

    pub async fn delete_output(&self, user_id: &str, output_id: &str) -> ServiceResult<()> {
        let output = self.get_output(user_id, output_id).await?;
        if !self.db.outputs().delete(&output.id).await? {
            return Err(ServiceError::OutputNotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::repository::test_support::test_context;
    use crate::services::jobs::test_support::ScriptedProvider;
    use crate::services::JobOutcome;
    use crate::storage::LocalObjectStore;
    use crate::transcription::TranscriptionConfig;

    async fn service() -> (tempfile::TempDir, JobRunner, ProjectService) {
        let (dir, db) = test_context().await;
        let store: BoxedObjectStore = Arc::new(LocalObjectStore::new(dir.path().join("objects")));
        let jobs = JobRunner::new(
            db.clone(),
            store.clone(),
            Arc::new(ScriptedProvider::succeeding("A short talk about gardens.")),
            TranscriptionConfig::default(),
            1,
        );
        let service = ProjectService::new(
            db,
            store,
            jobs.clone(),
            &LimitsConfig::default(),
            &SessionConfig::default(),
        );
        (dir, jobs, service)
    }

    fn wav(bytes: Vec<u8>) -> UploadInput {
        UploadInput {
            file_name: "talk.wav".to_string(),
            content_type: Some("audio/wav".to_string()),
            bytes,
            name: Some("Garden talk".to_string()),
            ..Default::default()
        }
    }

    async fn transcribed_project(jobs: &JobRunner, service: &ProjectService, user: &str) -> String {
        let upload = service.upload(user, wav(b"RIFFdata".to_vec())).await.unwrap();
        let project = service.get(user, &upload.project_id).await.unwrap().project;
        // Drive the job inline; a concurrently spawned run is skipped or finds it done
        let outcome = jobs
            .run(&PendingJob {
                project_id: project.id.clone(),
                session_id: None,
                storage_path: project.storage_path.clone(),
                file_name: project.file_name.clone(),
                language: None,
            })
            .await
            .unwrap();
        assert!(matches!(outcome, JobOutcome::Completed | JobOutcome::Skipped));
        for _ in 0..100 {
            if service.get(user, &project.id).await.unwrap().transcription.is_some() {
                return project.id;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("project was never transcribed");
    }

    fn stored_files(dir: &std::path::Path) -> usize {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return 0;
        };
        entries
            .flatten()
            .map(|entry| {
                let path = entry.path();
                if path.is_dir() {
                    stored_files(&path)
                } else {
                    1
                }
            })
            .sum()
    }

    #[tokio::test]
    async fn test_failed_insert_removes_stored_media() {
        let dir = tempfile::tempdir().unwrap();
        // Schema never initialized, so the project insert fails
        let db = DbContext::sqlite(&dir.path().join("empty.db"));
        let objects = dir.path().join("objects");
        let store: BoxedObjectStore = Arc::new(LocalObjectStore::new(objects.clone()));
        let jobs = JobRunner::new(
            db.clone(),
            store.clone(),
            Arc::new(ScriptedProvider::succeeding("unused")),
            TranscriptionConfig::default(),
            1,
        );
        let service = ProjectService::new(
            db,
            store,
            jobs,
            &LimitsConfig::default(),
            &SessionConfig::default(),
        );

        let result = service.upload("user_a", wav(b"RIFFdata".to_vec())).await;
        assert!(matches!(result, Err(ServiceError::Database(_))));
        assert_eq!(stored_files(&objects), 0);
    }

    #[tokio::test]
    async fn test_authenticated_upload_allows_larger_files() {
        let (_dir, _jobs, service) = service().await;
        let mut bytes = b"RIFF".to_vec();
        bytes.resize(12 * 1024 * 1024, 0);
        let upload = service.upload("user_1", wav(bytes)).await.unwrap();
        assert_eq!(upload.status, ProjectStatus::Uploaded);

        let projects = service.list("user_1").await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].title, "Garden talk");
        assert!(service.list("user_2").await.unwrap().is_empty());

        let mut huge = b"RIFF".to_vec();
        huge.resize(26 * 1024 * 1024, 0);
        assert!(matches!(
            service.upload("user_1", wav(huge)).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_projects_are_private() {
        let (_dir, jobs, service) = service().await;
        let project_id = transcribed_project(&jobs, &service, "owner").await;
        assert!(matches!(
            service.get("intruder", &project_id).await,
            Err(ServiceError::ProjectNotFound)
        ));
        assert!(matches!(
            service.list_outputs("intruder", &project_id).await,
            Err(ServiceError::ProjectNotFound)
        ));
    }

    #[tokio::test]
    async fn test_output_lifecycle() {
        let (_dir, jobs, service) = service().await;
        let project_id = transcribed_project(&jobs, &service, "owner").await;

        assert!(matches!(
            service
                .generate("owner", &project_id, "podcast", json!({}))
                .await,
            Err(ServiceError::InvalidOutputKind(_))
        ));

        let output = service
            .generate("owner", &project_id, "blog", json!({"tone": "warm"}))
            .await
            .unwrap();
        assert_eq!(output.status, OutputStatus::Queued);
        assert_eq!(
            service.list_outputs("owner", &project_id).await.unwrap().len(),
            1
        );

        let updated = service
            .update_output(
                "owner",
                &output.id,
                OutputPatch {
                    body: Some("Draft".to_string()),
                    status: Some(OutputStatus::Processing),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, OutputStatus::Processing);
        assert_eq!(updated.body.as_deref(), Some("Draft"));

        let err = service
            .update_output(
                "owner",
                &output.id,
                OutputPatch {
                    status: Some(OutputStatus::Queued),
                    body: Some("ignored".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition { .. }));
        assert_eq!(
            service.get_output("owner", &output.id).await.unwrap().body.as_deref(),
            Some("Draft")
        );

        assert!(matches!(
            service.get_output("intruder", &output.id).await,
            Err(ServiceError::OutputNotFound)
        ));
        service.delete_output("owner", &output.id).await.unwrap();
        assert!(matches!(
            service.delete_output("owner", &output.id).await,
            Err(ServiceError::OutputNotFound)
        ));
    }

    #[tokio::test]
    async fn test_generate_requires_transcription() {
        let (dir, _jobs, _) = service().await;
        // A runner with no provider success: project stays untranscribed
        let db = DbContext::sqlite(&dir.path().join("test.db"));
        let store: BoxedObjectStore = Arc::new(LocalObjectStore::new(dir.path().join("objects")));
        let idle = JobRunner::new(
            db.clone(),
            store.clone(),
            Arc::new(crate::transcription::DisabledTranscriber),
            TranscriptionConfig::default(),
            1,
        );
        let service = ProjectService::new(
            db,
            store,
            idle,
            &LimitsConfig::default(),
            &SessionConfig::default(),
        );
        let upload = service.upload("owner", wav(b"RIFFdata".to_vec())).await.unwrap();
        assert!(matches!(
            service
                .generate("owner", &upload.project_id, "email", json!(null))
                .await,
            Err(ServiceError::TranscriptionNotReady)
        ));
    }
}
