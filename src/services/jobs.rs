//! Background transcription jobs.
//!
//! Jobs run on the tokio runtime. A semaphore bounds how many provider calls
//! are in flight; everything else about a job lives in the database, so a
//! restart simply re-enqueues whatever is still pending.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::models::{count_words, Transcription};
use crate::rate_limit::backoff_delay;
use crate::repository::{stored_now, DbContext, DbError, PendingJob};
use crate::storage::BoxedObjectStore;
use crate::transcription::{
    BoxedTranscriptionProvider, TranscriptionConfig, TranscriptionError, TranscriptionRequest,
    TranscriptionResult,
};

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
    /// Nothing to do: the project finished already or no longer exists.
    Skipped,
}

struct Inner {
    db: DbContext,
    store: BoxedObjectStore,
    provider: BoxedTranscriptionProvider,
    config: TranscriptionConfig,
    permits: Semaphore,
}

/// Runs transcription jobs with bounded concurrency and retry.
#[derive(Clone)]
pub struct JobRunner {
    inner: Arc<Inner>,
}

impl JobRunner {
    pub fn new(
        db: DbContext,
        store: BoxedObjectStore,
        provider: BoxedTranscriptionProvider,
        config: TranscriptionConfig,
        max_concurrent: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                store,
                provider,
                config,
                permits: Semaphore::new(max_concurrent.max(1)),
            }),
        }
    }

    /// Run `job` in the background.
    pub fn enqueue(&self, job: PendingJob) -> JoinHandle<()> {
        let runner = self.clone();
        tokio::spawn(async move {
            match runner.run(&job).await {
                Ok(outcome) => debug!(project_id = %job.project_id, ?outcome, "Job finished"),
                Err(e) => error!(
                    project_id = %job.project_id,
                    error = %e,
                    "Failed to record transcription job result"
                ),
            }
        })
    }

    /// Re-enqueue every project left in `uploaded` or `processing`.
    pub async fn resume_pending(&self) -> Result<usize, DbError> {
        let pending = self.inner.db.jobs().pending().await?;
        let count = pending.len();
        for job in pending {
            self.enqueue(job);
        }
        if count > 0 {
            info!("Resumed {} pending transcription job(s)", count);
        }
        Ok(count)
    }

    /// Execute one job to completion.
    pub async fn run(&self, job: &PendingJob) -> Result<JobOutcome, DbError> {
        let Ok(_permit) = self.inner.permits.acquire().await else {
            return Ok(JobOutcome::Skipped);
        };

        let jobs = self.inner.db.jobs();
        let session_id = job.session_id.as_deref();

        if !jobs.begin(&job.project_id, session_id, Utc::now()).await? {
            return Ok(JobOutcome::Skipped);
        }
        info!(project_id = %job.project_id, "Transcription started");

        let bytes = match self.inner.store.get(&job.storage_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(project_id = %job.project_id, error = %e, "Stored media unavailable");
                jobs.fail(&job.project_id, session_id, "Uploaded file could not be read")
                    .await?;
                return Ok(JobOutcome::Failed);
            }
        };

        let request = TranscriptionRequest {
            file_name: job.file_name.clone(),
            bytes,
            language: job.language.clone(),
        };

        let started = Instant::now();
        match self.transcribe_with_retry(&job.project_id, request).await {
            Ok(result) => {
                let draft = self.draft(job, result, started.elapsed());
                match jobs.complete(&job.project_id, session_id, &draft).await? {
                    Some(stored) => {
                        info!(
                            project_id = %job.project_id,
                            words = stored.word_count,
                            elapsed_ms = stored.processing_time_ms,
                            "Transcription completed"
                        );
                        Ok(JobOutcome::Completed)
                    }
                    None => Ok(JobOutcome::Skipped),
                }
            }
            Err(e) => {
                warn!(project_id = %job.project_id, error = %e, "Transcription failed");
                jobs.fail(
                    &job.project_id,
                    session_id,
                    &format!("Transcription failed: {}", e),
                )
                .await?;
                Ok(JobOutcome::Failed)
            }
        }
    }

    /// Call the provider with a per-attempt timeout and exponential backoff.
    async fn transcribe_with_retry(
        &self,
        project_id: &str,
        request: TranscriptionRequest,
    ) -> Result<TranscriptionResult, TranscriptionError> {
        let config = &self.inner.config;
        let max_attempts = config.max_attempts.max(1);
        let timeout = Duration::from_secs(config.timeout_secs);
        let mut attempt = 0;

        loop {
            let call = self.inner.provider.transcribe(request.clone());
            let err = match tokio::time::timeout(timeout, call).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => e,
                Err(_) => TranscriptionError::Request(format!(
                    "timed out after {}s",
                    config.timeout_secs
                )),
            };

            attempt += 1;
            if attempt >= max_attempts || !err.is_retryable() {
                return Err(err);
            }

            let mut delay = backoff_delay(attempt - 1, config.base_delay_ms);
            if let Some(retry_after) = err.retry_after() {
                delay = delay.max(retry_after);
            }
            warn!(
                project_id,
                attempt,
                max_attempts,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "Transcription attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn draft(
        &self,
        job: &PendingJob,
        result: TranscriptionResult,
        elapsed: Duration,
    ) -> Transcription {
        let now = stored_now();
        Transcription {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: job.project_id.clone(),
            user_id: None,
            word_count: count_words(&result.text),
            content: result.text,
            language: result.language.or_else(|| job.language.clone()),
            duration_seconds: result.duration_seconds,
            confidence: result.confidence,
            segments: result.segments,
            provider: self.inner.provider.name().to_string(),
            model: result.model,
            processing_time_ms: elapsed.as_millis() as u64,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::transcription::{
        TranscriptionError, TranscriptionProvider, TranscriptionRequest, TranscriptionResult,
    };

    /// Fails the first `failures` calls, then returns `text`.
    pub struct ScriptedProvider {
        pub text: String,
        pub failures: u32,
        pub retryable: bool,
        pub calls: AtomicU32,
    }

    impl ScriptedProvider {
        pub fn succeeding(text: &str) -> Self {
            Self::flaky(text, 0)
        }

        pub fn flaky(text: &str, failures: u32) -> Self {
            Self {
                text: text.to_string(),
                failures,
                retryable: true,
                calls: AtomicU32::new(0),
            }
        }

        pub fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TranscriptionProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn transcribe(
            &self,
            _request: TranscriptionRequest,
        ) -> Result<TranscriptionResult, TranscriptionError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(if self.retryable {
                    TranscriptionError::Api {
                        status: 503,
                        message: "overloaded".to_string(),
                    }
                } else {
                    TranscriptionError::Api {
                        status: 400,
                        message: "unsupported audio".to_string(),
                    }
                });
            }
            Ok(TranscriptionResult {
                text: self.text.clone(),
                language: Some("en".to_string()),
                duration_seconds: Some(150.0),
                confidence: Some(0.93),
                segments: Vec::new(),
                model: "scripted-1".to_string(),
            })
        }
    }
}
