//! Speech-to-text providers.

mod groq;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use groq::GroqTranscriber;

use crate::models::Segment;

/// Input to a provider call.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// ISO 639-1 hint. `None` lets the provider detect the language.
    pub language: Option<String>,
}

/// Provider output before it is attached to a project.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionResult {
    pub text: String,
    pub language: Option<String>,
    pub duration_seconds: Option<f64>,
    pub confidence: Option<f64>,
    pub segments: Vec<Segment>,
    pub model: String,
}

#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// Provider asked us to slow down.
    #[error("provider rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("failed to parse provider response: {0}")]
    Parse(String),
    #[error("transcription provider is not configured")]
    NotConfigured,
}

impl TranscriptionError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Request(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Parse(_) | Self::NotConfigured => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Short provider name stored with each transcription.
    fn name(&self) -> &str;

    async fn transcribe(
        &self,
        request: TranscriptionRequest,
    ) -> Result<TranscriptionResult, TranscriptionError>;
}

pub type BoxedTranscriptionProvider = Arc<dyn TranscriptionProvider>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Groq,
    /// Every job fails with `NotConfigured`. Useful for local development without a key.
    None,
}

/// Transcription section of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub base_url: String,
    /// Per-attempt timeout.
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    /// Read from `GROQ_API_KEY`, never from the config file.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Groq,
            model: "whisper-large-v3".to_string(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            timeout_secs: 120,
            max_attempts: 3,
            base_delay_ms: 1_000,
            api_key: None,
        }
    }
}

/// Provider that refuses every request.
pub struct DisabledTranscriber;

#[async_trait]
impl TranscriptionProvider for DisabledTranscriber {
    fn name(&self) -> &str {
        "none"
    }

    async fn transcribe(
        &self,
        _request: TranscriptionRequest,
    ) -> Result<TranscriptionResult, TranscriptionError> {
        Err(TranscriptionError::NotConfigured)
    }
}

/// Build the configured provider.
pub fn create_provider(
    config: &TranscriptionConfig,
) -> Result<BoxedTranscriptionProvider, TranscriptionError> {
    match config.provider {
        ProviderKind::Groq => Ok(Arc::new(GroqTranscriber::from_config(config)?)),
        ProviderKind::None => Ok(Arc::new(DisabledTranscriber)),
    }
}
