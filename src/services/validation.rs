//! Upload validation.

use std::path::Path;

use serde_json::json;
use thiserror::Error;

/// Maximum length of a project display name, in characters.
const MAX_NAME_CHARS: usize = 200;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A multipart upload as received from the client.
#[derive(Debug, Clone, Default)]
pub struct UploadInput {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
}

/// Limits applied to one kind of upload.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub max_bytes: u64,
    pub allowed_extensions: Vec<String>,
}

/// The parts of an upload that survived validation, normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedUpload {
    pub title: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub content_type: String,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("The uploaded file is empty")]
    EmptyFile,
    #[error("Unsupported file type. Allowed formats: {}", allowed.join(", "))]
    InvalidFileType { allowed: Vec<String> },
    #[error("File is too large ({file_size_mb} MB). Maximum size is {max_size_mb} MB")]
    FileTooLarge { file_size_mb: f64, max_size_mb: u64 },
    #[error("{0}")]
    InvalidRequest(String),
}

impl ValidationError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyFile => "empty_file",
            Self::InvalidFileType { .. } => "invalid_file_type",
            Self::FileTooLarge { .. } => "file_too_large",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InvalidFileType { allowed } => Some(json!({ "allowed_extensions": allowed })),
            Self::FileTooLarge {
                file_size_mb,
                max_size_mb,
            } => Some(json!({
                "file_size_mb": file_size_mb,
                "max_size_mb": max_size_mb,
            })),
            _ => None,
        }
    }
}

/// Size in MB rounded to two decimals.
pub fn size_mb(bytes: u64) -> f64 {
    ((bytes as f64 / BYTES_PER_MB) * 100.0).round() / 100.0
}

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Validate an upload against `limits`.
///
/// Checks run cheapest first: emptiness, extension, declared type, size,
/// then content sniffing.
pub fn validate_upload(
    input: &UploadInput,
    limits: &UploadLimits,
) -> Result<ValidatedUpload, ValidationError> {
    if input.bytes.is_empty() {
        return Err(ValidationError::EmptyFile);
    }

    let invalid_type = || ValidationError::InvalidFileType {
        allowed: limits.allowed_extensions.clone(),
    };

    let extension = extension_of(&input.file_name).ok_or_else(invalid_type)?;
    if !limits
        .allowed_extensions
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&extension))
    {
        return Err(invalid_type());
    }

    let declared = input
        .content_type
        .as_deref()
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream");
    if let Some(ref ct) = declared {
        if !ct.starts_with("audio/") {
            return Err(invalid_type());
        }
    }

    let size = input.bytes.len() as u64;
    if size > limits.max_bytes {
        return Err(ValidationError::FileTooLarge {
            file_size_mb: size_mb(size),
            max_size_mb: limits.max_bytes / (1024 * 1024),
        });
    }

    if let Some(kind) = infer::get(&input.bytes) {
        let audio = kind.matcher_type() == infer::MatcherType::Audio;
        // M4A is an MP4 container and may sniff as video
        let mp4_audio = extension == "m4a" && kind.mime_type() == "video/mp4";
        if !audio && !mp4_audio {
            return Err(invalid_type());
        }
    }

    let title = match input.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => Path::new(&input.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Untitled".to_string()),
    };
    if title.chars().count() > MAX_NAME_CHARS {
        return Err(ValidationError::InvalidRequest(format!(
            "Name must be at most {} characters",
            MAX_NAME_CHARS
        )));
    }

    let language = match input.language.as_deref().map(str::trim) {
        None | Some("") | Some("auto") => None,
        Some(code)
            if (2..=3).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphabetic()) =>
        {
            Some(code.to_ascii_lowercase())
        }
        Some(code) => {
            return Err(ValidationError::InvalidRequest(format!(
                "Invalid language code '{}'",
                code
            )))
        }
    };

    let content_type = declared.unwrap_or_else(|| {
        mime_guess::from_ext(&extension)
            .first_or_octet_stream()
            .to_string()
    });

    Ok(ValidatedUpload {
        title,
        description: input
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string),
        language,
        content_type,
    })
}
