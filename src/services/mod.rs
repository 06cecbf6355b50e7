//! Service layer for repurpose business logic.
//!
//! Services own the domain rules and are shared by the HTTP server and the CLI.

pub mod anonymous;
pub mod cleanup;
pub mod jobs;
pub mod preview;
pub mod projects;
pub mod token;
pub mod validation;

pub use anonymous::{
    AnonymousService, ClaimResponse, FileInfo, PreviewResponse, StatusResponse,
    TranscriptionPreview, UploadResponse,
};
pub use cleanup::{CleanupReport, CleanupService};
pub use jobs::{JobOutcome, JobRunner};
pub use projects::{OutputPatch, ProjectDetail, ProjectService, ProjectUploadResponse};
pub use validation::{UploadInput, UploadLimits, ValidationError};

use thiserror::Error;

use crate::models::{OutputStatus, SessionStatus};
use crate::rate_limit::{RateLimitError, WindowScope};
use crate::repository::DbError;
use crate::storage::StorageError;

/// Errors surfaced by services. The HTTP layer maps each to a status and code.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("upload limit of {limit} per {scope} reached")]
    RateLimited {
        scope: WindowScope,
        limit: u32,
        retry_after_secs: u64,
    },
    #[error("session not found")]
    NotFound,
    #[error("session expired")]
    Expired,
    #[error("session already claimed")]
    AlreadyClaimed,
    #[error("transcription still in progress")]
    StillProcessing {
        status: SessionStatus,
        progress_percentage: Option<u8>,
    },
    #[error("transcription failed: {0}")]
    ProcessingFailed(String),
    #[error("project not found")]
    ProjectNotFound,
    #[error("output not found")]
    OutputNotFound,
    #[error("cannot move output from {from} to {to}")]
    InvalidTransition {
        from: OutputStatus,
        to: OutputStatus,
    },
    #[error("unknown output kind '{0}'")]
    InvalidOutputKind(String),
    #[error("transcription is not ready")]
    TranscriptionNotReady,
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("{0}")]
    Internal(String),
}

impl From<RateLimitError> for ServiceError {
    fn from(e: RateLimitError) -> Self {
        match e {
            RateLimitError::Exceeded {
                scope,
                limit,
                retry_after_secs,
            } => Self::RateLimited {
                scope,
                limit,
                retry_after_secs,
            },
            RateLimitError::Database(msg) => Self::Internal(format!("rate limiter: {}", msg)),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
