//! Object storage for uploaded media.
//!
//! Objects are addressed by a relative key such as `anonymous/{session_id}/{file}`.
//! Two backends are available:
//! - Local filesystem under the data directory
//! - Supabase Storage over its REST API

mod local;
mod supabase;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use local::LocalObjectStore;
pub use supabase::SupabaseObjectStore;

/// Maximum length of a sanitized file name component.
const MAX_FILENAME_LEN: usize = 100;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("invalid object key: {0}")]
    InvalidKey(String),
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage request failed: {0}")]
    Http(String),
    #[error("storage backend misconfigured: {0}")]
    Config(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A flat key/value blob store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `bytes` under `key`, replacing any existing object.
    async fn put(&self, key: &str, bytes: &[u8], content_type: Option<&str>) -> StorageResult<()>;

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Remove the object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

pub type BoxedObjectStore = Arc<dyn ObjectStore>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    #[default]
    Local,
    Supabase,
}

/// Storage section of the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    /// Supabase bucket name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    /// Supabase project URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Service role key. Only ever read from the environment.
    #[serde(skip)]
    pub service_key: Option<String>,
}

/// Sanitize a user-supplied file name for use in an object key.
///
/// Keeps ASCII alphanumerics plus `.`, `-` and `_`. Everything else becomes `_`.
/// Leading dots are stripped so the result is never hidden or a parent reference.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    let cleaned = if cleaned.len() > MAX_FILENAME_LEN {
        // Keep the extension when truncating
        match cleaned.rfind('.') {
            Some(dot) if cleaned.len() - dot <= 10 => {
                let ext = &cleaned[dot..];
                format!("{}{}", &cleaned[..MAX_FILENAME_LEN - ext.len()], ext)
            }
            _ => cleaned[..MAX_FILENAME_LEN].to_string(),
        }
    } else {
        cleaned.to_string()
    };

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Key for a file uploaded through an anonymous session.
pub fn anonymous_object_key(session_id: &str, file_name: &str) -> String {
    format!("anonymous/{}/{}", session_id, sanitize_filename(file_name))
}

/// Key for a file uploaded by a signed-in user.
pub fn user_object_key(user_id: &str, project_id: &str, file_name: &str) -> String {
    format!(
        "users/{}/{}/{}",
        sanitize_filename(user_id),
        project_id,
        sanitize_filename(file_name)
    )
}

/// Build the configured object store. Local objects live under `objects_dir`.
pub fn create_object_store(
    config: &StorageConfig,
    objects_dir: &Path,
) -> StorageResult<BoxedObjectStore> {
    match config.backend {
        StorageBackendKind::Local => Ok(Arc::new(LocalObjectStore::new(objects_dir))),
        StorageBackendKind::Supabase => Ok(Arc::new(SupabaseObjectStore::from_config(config)?)),
    }
}

/// Reject keys that could escape the store root.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "..")
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
