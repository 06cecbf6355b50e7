//! Upload rate limiting for anonymous clients.
//!
//! Fixed hour and day windows per client IP with pluggable storage:
//! - In-memory (ephemeral, single process)
//! - SQLite/PostgreSQL via Diesel (persistent, shared between processes)

mod backend;
mod config;
mod database;
mod limiter;
mod memory;

use std::sync::Arc;

pub use backend::{check_windows, RateLimitBackend, RateLimitError, RateLimitResult};
pub use config::{RateLimitBackendKind, RateLimitConfig, Window, WindowScope};
pub use database::DieselRateLimitBackend;
pub use limiter::{BoxedRateLimitBackend, RateLimitInfo, UploadRateLimiter};
pub use memory::InMemoryRateLimitBackend;

use crate::repository::DbPool;

/// Build the limiter selected by `config.backend`.
pub fn create_rate_limiter(config: &RateLimitConfig, pool: &DbPool) -> UploadRateLimiter {
    let backend: BoxedRateLimitBackend = match config.backend {
        RateLimitBackendKind::Memory => Arc::new(InMemoryRateLimitBackend::new()),
        RateLimitBackendKind::Database => Arc::new(DieselRateLimitBackend::new(pool.clone())),
    };
    UploadRateLimiter::new(backend, config.clone())
}

/// Calculate exponential backoff delay for a given attempt.
pub fn backoff_delay(attempt: u32, base_ms: u64) -> std::time::Duration {
    let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    std::time::Duration::from_millis(delay_ms.min(60_000))
}

/// Parse Retry-After header value (seconds).
/// Returns duration to wait, or None if header is missing/invalid.
pub fn parse_retry_after(header_value: Option<&str>) -> Option<std::time::Duration> {
    let value = header_value?;
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| std::time::Duration::from_secs(secs.min(60)))
}
