//! Rate limiter configuration and window types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Storage backend for upload counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackendKind {
    /// In-memory (single process, not persisted)
    Memory,
    /// Database via Diesel (SQLite or PostgreSQL, persisted, multi-process)
    #[default]
    Database,
}

/// Anonymous upload quotas. These are product levers, so they live in config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub backend: RateLimitBackendKind,
    /// Uploads allowed per client IP per clock hour.
    pub uploads_per_hour: u32,
    /// Uploads allowed per client IP per UTC day.
    pub uploads_per_day: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            backend: RateLimitBackendKind::Database,
            uploads_per_hour: 3,
            uploads_per_day: 5,
        }
    }
}

/// Granularity of a fixed counting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowScope {
    Hour,
    Day,
}

impl WindowScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }

    fn length_secs(&self) -> i64 {
        match self {
            Self::Hour => 3_600,
            Self::Day => 86_400,
        }
    }

    /// Start of the window containing `now` (top of the hour, or UTC midnight).
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let secs = now.timestamp();
        let start = secs - secs.rem_euclid(self.length_secs());
        DateTime::from_timestamp(start, 0).unwrap_or(now)
    }

    /// When the window containing `now` rolls over.
    pub fn reset(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.start(now) + Duration::seconds(self.length_secs())
    }
}

impl std::fmt::Display for WindowScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fixed window and the number of uploads it admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub scope: WindowScope,
    pub limit: u32,
}

impl Window {
    pub fn hour(limit: u32) -> Self {
        Self {
            scope: WindowScope::Hour,
            limit,
        }
    }

    pub fn day(limit: u32) -> Self {
        Self {
            scope: WindowScope::Day,
            limit,
        }
    }
}
