//! Pluggable backend trait for upload counters.
//!
//! Allows swapping between in-memory (single process) and database
//! (multi-process, persisted) storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::config::{Window, WindowScope};

/// Result type for rate limit operations.
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Errors from rate limit operations.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Upload limit of {limit} per {scope} reached, retry in {retry_after_secs}s")]
    Exceeded {
        scope: WindowScope,
        limit: u32,
        retry_after_secs: u64,
    },
    #[error("Database error: {0}")]
    Database(String),
}

impl From<diesel::result::Error> for RateLimitError {
    fn from(e: diesel::result::Error) -> Self {
        RateLimitError::Database(e.to_string())
    }
}

/// Trait for upload counter storage.
///
/// Implementations must be thread-safe and make `try_acquire` atomic per key.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Record one upload for `key` at `now` if every window still has room.
    async fn try_acquire(
        &self,
        key: &str,
        windows: &[Window],
        now: DateTime<Utc>,
    ) -> RateLimitResult<()>;

    /// Number of uploads recorded for `key` at or after `since`.
    async fn count_since(&self, key: &str, since: DateTime<Utc>) -> RateLimitResult<u32>;

    /// Drop records older than `before`. Returns how many were removed.
    async fn prune(&self, before: DateTime<Utc>) -> RateLimitResult<u64>;
}

/// Check `used` counts (excluding the current attempt) against each window.
///
/// When several windows are full, the one that stays closed longest is reported.
pub fn check_windows(
    windows: &[Window],
    used: &[u32],
    now: DateTime<Utc>,
) -> RateLimitResult<()> {
    let violation = windows
        .iter()
        .zip(used)
        .filter(|(window, used)| **used >= window.limit)
        .map(|(window, _)| {
            let retry_after = (window.scope.reset(now) - now).num_seconds().max(1) as u64;
            (window, retry_after)
        })
        .max_by_key(|(_, retry_after)| *retry_after);

    match violation {
        Some((window, retry_after_secs)) => Err(RateLimitError::Exceeded {
            scope: window.scope,
            limit: window.limit,
            retry_after_secs,
        }),
        None => Ok(()),
    }
}
