//! Per-IP upload admission gate.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::backend::{RateLimitBackend, RateLimitError, RateLimitResult};
use super::config::{RateLimitConfig, Window, WindowScope};

/// Type alias for a shared rate limit backend.
pub type BoxedRateLimitBackend = Arc<dyn RateLimitBackend>;

/// Usage snapshot for one client, shaped for "N uploads remaining" displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    pub uploads_used_hour: u32,
    pub uploads_used_day: u32,
    pub uploads_remaining_hour: u32,
    pub uploads_remaining_day: u32,
    pub reset_time_hour: DateTime<Utc>,
    pub reset_time_day: DateTime<Utc>,
    pub is_limited: bool,
}

/// Fixed-window upload limiter (clock hour and UTC day) keyed by client IP.
///
/// Exceeding a window is a hard rejection carrying the seconds until it resets.
#[derive(Clone)]
pub struct UploadRateLimiter {
    backend: BoxedRateLimitBackend,
    config: RateLimitConfig,
}

impl UploadRateLimiter {
    pub fn new(backend: BoxedRateLimitBackend, config: RateLimitConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn windows(&self) -> [Window; 2] {
        [
            Window::hour(self.config.uploads_per_hour),
            Window::day(self.config.uploads_per_day),
        ]
    }

    /// Admit one upload from `ip` or reject it.
    pub async fn acquire(&self, ip: &str) -> RateLimitResult<()> {
        self.acquire_at(ip, Utc::now()).await
    }

    pub async fn acquire_at(&self, ip: &str, now: DateTime<Utc>) -> RateLimitResult<()> {
        match self.backend.try_acquire(ip, &self.windows(), now).await {
            Ok(()) => {
                debug!(ip, "Upload admitted");
                Ok(())
            }
            Err(e @ RateLimitError::Exceeded { .. }) => {
                info!(ip, error = %e, "Upload rejected by rate limit");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Current usage for `ip`. Read-only.
    pub async fn info(&self, ip: &str) -> RateLimitResult<RateLimitInfo> {
        self.info_at(ip, Utc::now()).await
    }

    pub async fn info_at(&self, ip: &str, now: DateTime<Utc>) -> RateLimitResult<RateLimitInfo> {
        let used_hour = self
            .backend
            .count_since(ip, WindowScope::Hour.start(now))
            .await?;
        let used_day = self
            .backend
            .count_since(ip, WindowScope::Day.start(now))
            .await?;

        let remaining_hour = self.config.uploads_per_hour.saturating_sub(used_hour);
        let remaining_day = self.config.uploads_per_day.saturating_sub(used_day);

        Ok(RateLimitInfo {
            uploads_used_hour: used_hour,
            uploads_used_day: used_day,
            uploads_remaining_hour: remaining_hour,
            uploads_remaining_day: remaining_day,
            reset_time_hour: WindowScope::Hour.reset(now),
            reset_time_day: WindowScope::Day.reset(now),
            is_limited: remaining_hour == 0 || remaining_day == 0,
        })
    }

    /// Forget events that can no longer fall inside any window.
    pub async fn prune(&self, now: DateTime<Utc>) -> RateLimitResult<u64> {
        self.backend
            .prune(WindowScope::Day.start(now) - Duration::days(1))
            .await
    }
}
