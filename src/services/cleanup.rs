//! Periodic removal of expired anonymous sessions.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::ServiceResult;
use crate::rate_limit::UploadRateLimiter;
use crate::repository::DbContext;
use crate::storage::BoxedObjectStore;

/// What one sweep removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub sessions_deleted: usize,
    pub objects_deleted: usize,
    pub object_errors: usize,
    pub upload_events_pruned: u64,
}

#[derive(Clone)]
pub struct CleanupService {
    db: DbContext,
    store: BoxedObjectStore,
    limiter: UploadRateLimiter,
}

impl CleanupService {
    pub fn new(db: DbContext, store: BoxedObjectStore, limiter: UploadRateLimiter) -> Self {
        Self { db, store, limiter }
    }

    /// Delete every session expired at `now`, then its stored media.
    ///
    /// Rows go first. Object deletion happens after the row is gone and is
    /// best effort: failures are counted and logged, never retried here.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> ServiceResult<CleanupReport> {
        let swept = self.db.sessions().sweep_expired(now).await?;
        let mut report = CleanupReport {
            sessions_deleted: swept.len(),
            ..Default::default()
        };

        for session in &swept {
            match self.store.delete(&session.storage_path).await {
                Ok(()) => report.objects_deleted += 1,
                Err(e) => {
                    report.object_errors += 1;
                    warn!(
                        session_id = %session.session_id,
                        error = %e,
                        "Failed to delete stored media for expired session"
                    );
                }
            }
        }

        report.upload_events_pruned = self.limiter.prune(now).await?;

        if report.sessions_deleted > 0 || report.upload_events_pruned > 0 {
            info!(
                sessions = report.sessions_deleted,
                objects = report.objects_deleted,
                object_errors = report.object_errors,
                upload_events = report.upload_events_pruned,
                "Cleanup sweep finished"
            );
        }
        Ok(report)
    }

    /// Run `sweep_once` every `interval` until the task is aborted.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep_once(Utc::now()).await {
                    error!(error = %e, "Cleanup sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::rate_limit::{InMemoryRateLimitBackend, RateLimitConfig};
    use crate::repository::test_support::{anonymous_upload, test_context};
    use crate::storage::{LocalObjectStore, ObjectStore};

    #[tokio::test]
    async fn test_sweep_deletes_rows_then_objects() {
        let (dir, db) = test_context().await;
        let store = Arc::new(LocalObjectStore::new(dir.path().join("objects")));
        let limiter = UploadRateLimiter::new(
            Arc::new(InMemoryRateLimitBackend::new()),
            RateLimitConfig::default(),
        );
        let now = Utc::now();

        let (stale, stale_project) = anonymous_upload("stale", now - ChronoDuration::days(9));
        let (fresh, fresh_project) = anonymous_upload("fresh", now);
        for (session, project) in [(&stale, &stale_project), (&fresh, &fresh_project)] {
            store
                .put(&session.storage_path, b"audio", None)
                .await
                .unwrap();
            db.sessions().create(session, project).await.unwrap();
        }

        // An event from two days ago is outside every window
        limiter
            .acquire_at("203.0.113.7", now - ChronoDuration::days(2))
            .await
            .unwrap();

        let cleanup = CleanupService::new(db.clone(), store.clone(), limiter);
        let report = cleanup.sweep_once(now).await.unwrap();
        assert_eq!(
            report,
            CleanupReport {
                sessions_deleted: 1,
                objects_deleted: 1,
                object_errors: 0,
                upload_events_pruned: 1,
            }
        );

        assert!(store.get(&stale.storage_path).await.is_err());
        assert!(store.get(&fresh.storage_path).await.is_ok());
        assert!(db.sessions().get(&fresh.id).await.unwrap().is_some());

        // Nothing left to do
        assert_eq!(cleanup.sweep_once(now).await.unwrap().sessions_deleted, 0);
    }
}
