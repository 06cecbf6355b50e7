//! In-memory rate limit backend for single-process operation.
//!
//! State is not persisted across restarts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::backend::{check_windows, RateLimitBackend, RateLimitResult};
use super::config::{Window, WindowScope};

/// In-memory upload counters keyed by client IP.
#[derive(Clone, Default)]
pub struct InMemoryRateLimitBackend {
    events: Arc<RwLock<HashMap<String, Vec<DateTime<Utc>>>>>,
}

impl InMemoryRateLimitBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently tracked.
    pub async fn tracked_keys(&self) -> usize {
        self.events.read().await.len()
    }
}

#[async_trait]
impl RateLimitBackend for InMemoryRateLimitBackend {
    async fn try_acquire(
        &self,
        key: &str,
        windows: &[Window],
        now: DateTime<Utc>,
    ) -> RateLimitResult<()> {
        let mut events = self.events.write().await;
        let entry = events.entry(key.to_string()).or_default();

        // Nothing before the current day window can matter again
        let horizon = WindowScope::Day.start(now);
        entry.retain(|t| *t >= horizon);

        let used: Vec<u32> = windows
            .iter()
            .map(|w| {
                let since = w.scope.start(now);
                entry.iter().filter(|t| **t >= since).count() as u32
            })
            .collect();

        check_windows(windows, &used, now)?;
        entry.push(now);
        Ok(())
    }

    async fn count_since(&self, key: &str, since: DateTime<Utc>) -> RateLimitResult<u32> {
        let events = self.events.read().await;
        Ok(events
            .get(key)
            .map(|e| e.iter().filter(|t| **t >= since).count() as u32)
            .unwrap_or(0))
    }

    async fn prune(&self, before: DateTime<Utc>) -> RateLimitResult<u64> {
        let mut events = self.events.write().await;
        let mut removed = 0u64;
        for entry in events.values_mut() {
            let len = entry.len();
            entry.retain(|t| *t >= before);
            removed += (len - entry.len()) as u64;
        }
        events.retain(|_, e| !e.is_empty());
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::RateLimitError;
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn test_keys_are_independent() {
        let backend = InMemoryRateLimitBackend::new();
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap();
        let windows = [Window::hour(1)];

        backend.try_acquire("10.0.0.1", &windows, now).await.unwrap();
        assert!(matches!(
            backend.try_acquire("10.0.0.1", &windows, now).await,
            Err(RateLimitError::Exceeded { .. })
        ));
        backend.try_acquire("10.0.0.2", &windows, now).await.unwrap();
        assert_eq!(backend.tracked_keys().await, 2);
    }

    #[tokio::test]
    async fn test_rejected_attempts_are_not_counted() {
        let backend = InMemoryRateLimitBackend::new();
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap();
        let windows = [Window::hour(1)];

        backend.try_acquire("ip", &windows, now).await.unwrap();
        let _ = backend.try_acquire("ip", &windows, now).await;
        let since = WindowScope::Hour.start(now);
        assert_eq!(backend.count_since("ip", since).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_prune() {
        let backend = InMemoryRateLimitBackend::new();
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap();
        let windows = [Window::day(10)];
        backend
            .try_acquire("ip", &windows, now - Duration::hours(2))
            .await
            .unwrap();
        backend.try_acquire("ip", &windows, now).await.unwrap();

        assert_eq!(backend.prune(now - Duration::hours(1)).await.unwrap(), 1);
        assert_eq!(backend.prune(now + Duration::hours(1)).await.unwrap(), 1);
        assert_eq!(backend.tracked_keys().await, 0);
    }
}
