//! Transcription results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A timed span of transcribed speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Transcription {
    pub id: String,
    pub project_id: String,
    pub user_id: Option<String>,
    pub content: String,
    pub language: Option<String>,
    pub duration_seconds: Option<f64>,
    pub word_count: u32,
    /// Mean segment confidence in `[0, 1]`, when the provider reports one.
    pub confidence: Option<f64>,
    pub segments: Vec<Segment>,
    pub provider: String,
    pub model: String,
    pub processing_time_ms: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transcription {
    pub fn duration_minutes(&self) -> f64 {
        self.duration_seconds.unwrap_or(0.0) / 60.0
    }
}

/// Count whitespace-separated words.
pub fn count_words(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}
