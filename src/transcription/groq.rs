//! Groq Whisper transcription via the OpenAI-compatible API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{
    TranscriptionConfig, TranscriptionError, TranscriptionProvider, TranscriptionRequest,
    TranscriptionResult,
};
use crate::models::Segment;
use crate::rate_limit::parse_retry_after;

pub struct GroqTranscriber {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

/// `verbose_json` response shape.
#[derive(Debug, Deserialize)]
struct VerboseResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    segments: Vec<VerboseSegment>,
}

#[derive(Debug, Deserialize)]
struct VerboseSegment {
    start: f64,
    end: f64,
    text: String,
    #[serde(default)]
    avg_logprob: Option<f64>,
}

impl GroqTranscriber {
    pub fn from_config(config: &TranscriptionConfig) -> Result<Self, TranscriptionError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(TranscriptionError::NotConfigured)?;

        // The job runner applies its own per-attempt timeout; this is a backstop
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.saturating_add(30)))
            .build()
            .map_err(|e| TranscriptionError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }
}

/// Convert a `verbose_json` body into a provider result.
///
/// Confidence is the mean of `exp(avg_logprob)` over segments that report it.
fn parse_verbose(body: &str, model: &str) -> Result<TranscriptionResult, TranscriptionError> {
    let parsed: VerboseResponse =
        serde_json::from_str(body).map_err(|e| TranscriptionError::Parse(e.to_string()))?;

    let probs: Vec<f64> = parsed
        .segments
        .iter()
        .filter_map(|s| s.avg_logprob)
        .map(|lp| lp.exp().clamp(0.0, 1.0))
        .collect();
    let confidence = if probs.is_empty() {
        None
    } else {
        Some(probs.iter().sum::<f64>() / probs.len() as f64)
    };

    Ok(TranscriptionResult {
        text: parsed.text.trim().to_string(),
        language: parsed.language,
        duration_seconds: parsed.duration,
        confidence,
        segments: parsed
            .segments
            .into_iter()
            .map(|s| Segment {
                start: s.start,
                end: s.end,
                text: s.text.trim().to_string(),
            })
            .collect(),
        model: model.to_string(),
    })
}

#[async_trait]
impl TranscriptionProvider for GroqTranscriber {
    fn name(&self) -> &str {
        "groq"
    }

    async fn transcribe(
        &self,
        request: TranscriptionRequest,
    ) -> Result<TranscriptionResult, TranscriptionError> {
        let url = format!("{}/audio/transcriptions", self.base_url);
        let mime = mime_guess::from_path(&request.file_name)
            .first_or_octet_stream()
            .to_string();
        let size = request.bytes.len();

        let file = Part::bytes(request.bytes)
            .file_name(request.file_name)
            .mime_str(&mime)
            .map_err(|e| TranscriptionError::Request(e.to_string()))?;
        let mut form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");
        if let Some(language) = request.language {
            form = form.text("language", language);
        }

        debug!(model = %self.model, bytes = size, "Sending audio to Groq");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscriptionError::Request(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(
                resp.headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok()),
            );
            return Err(TranscriptionError::RateLimited { retry_after });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| TranscriptionError::Request(e.to_string()))?;
        if !status.is_success() {
            return Err(TranscriptionError::Api {
                status: status.as_u16(),
                message: body.chars().take(300).collect(),
            });
        }

        parse_verbose(&body, &self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verbose_response() {
        let body = r#"{
            "task": "transcribe",
            "language": "english",
            "duration": 12.5,
            "text": " Hello and welcome. Today we talk shop. ",
            "segments": [
                {"id": 0, "start": 0.0, "end": 4.0, "text": " Hello and welcome.", "avg_logprob": 0.0},
                {"id": 1, "start": 4.0, "end": 12.5, "text": " Today we talk shop.", "avg_logprob": -0.6931471805599453}
            ]
        }"#;

        let result = parse_verbose(body, "whisper-large-v3").unwrap();
        assert_eq!(result.text, "Hello and welcome. Today we talk shop.");
        assert_eq!(result.language.as_deref(), Some("english"));
        assert_eq!(result.duration_seconds, Some(12.5));
        assert_eq!(result.segments.len(), 2);
        assert_eq!(result.segments[1].text, "Today we talk shop.");
        let confidence = result.confidence.unwrap();
        assert!((confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_parse_minimal_response() {
        let result = parse_verbose(r#"{"text": "hi"}"#, "m").unwrap();
        assert_eq!(result.text, "hi");
        assert_eq!(result.confidence, None);
        assert!(result.segments.is_empty());
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_verbose("<html>", "m"),
            Err(TranscriptionError::Parse(_))
        ));
    }

    #[test]
    fn test_from_config_trims_base_url() {
        let config = TranscriptionConfig {
            base_url: "https://api.groq.com/openai/v1/".to_string(),
            api_key: Some("gsk_test".to_string()),
            ..Default::default()
        };
        let groq = GroqTranscriber::from_config(&config).unwrap();
        assert_eq!(groq.base_url, "https://api.groq.com/openai/v1");
    }
}
