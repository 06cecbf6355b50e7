//! Multipart upload form parsing.

use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;

use super::super::error::ApiError;
use crate::services::UploadInput;

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "file_too_large",
            "Request body exceeds the maximum upload size.",
        )
    } else {
        ApiError::bad_request(format!("Malformed upload form: {}", e.body_text()))
    }
}

fn optional_text(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Read `file`, `name`, `description` and `language` fields.
///
/// Unknown fields are skipped. A missing `file` part is an `invalid_request`.
pub async fn read_upload(mut multipart: Multipart) -> Result<UploadInput, ApiError> {
    let mut input = UploadInput::default();
    let mut saw_file = false;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                input.file_name = field.file_name().unwrap_or("upload").to_string();
                input.content_type = field.content_type().map(str::to_string);
                input.bytes = field.bytes().await.map_err(multipart_error)?.to_vec();
                saw_file = true;
            }
            "name" => input.name = optional_text(field.text().await.map_err(multipart_error)?),
            "description" => {
                input.description = optional_text(field.text().await.map_err(multipart_error)?)
            }
            "language" => {
                input.language = optional_text(field.text().await.map_err(multipart_error)?)
            }
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }

    if !saw_file {
        return Err(ApiError::bad_request("The form must include a 'file' part."));
    }
    Ok(input)
}
