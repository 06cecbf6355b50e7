//! Anonymous upload sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an anonymous session.
///
/// ```text
/// uploaded -> processing -> completed
///                        -> failed
/// {uploaded, processing, completed, failed} -> claimed
/// ```
///
/// `claimed` is terminal. Expiry is not a state; see [`AnonymousSession::is_expired_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
    Claimed,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 5] = [
        Self::Uploaded,
        Self::Processing,
        Self::Completed,
        Self::Failed,
        Self::Claimed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Claimed => "claimed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(Self::Uploaded),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "claimed" => Some(Self::Claimed),
            _ => None,
        }
    }

    /// Whether `self -> next` is an allowed edge of the session lifecycle.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        match (self, next) {
            (Self::Claimed, _) => false,
            (_, Self::Claimed) => true,
            (Self::Uploaded, Self::Processing)
            | (Self::Processing, Self::Completed)
            | (Self::Processing, Self::Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An anonymous upload awaiting transcription or claim.
#[derive(Debug, Clone)]
pub struct AnonymousSession {
    pub id: String,
    /// SHA-256 hex digest of the bearer token. The token itself is never stored.
    pub token_hash: String,
    pub project_id: String,
    pub transcription_id: Option<String>,
    pub file_name: String,
    pub file_size: u64,
    pub content_type: Option<String>,
    pub storage_path: String,
    pub language: Option<String>,
    pub status: SessionStatus,
    pub error_message: Option<String>,
    pub ip_address: String,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub claimed_by_user_id: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnonymousSession {
    /// Unclaimed sessions expire once `expires_at` has passed. Claimed sessions never do.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status != SessionStatus::Claimed && self.expires_at < now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}
