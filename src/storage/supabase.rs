//! Supabase Storage backend.
//!
//! Uses the Storage REST API: `{url}/storage/v1/object/{bucket}/{key}` with the
//! service role key as bearer token.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::{validate_key, ObjectStore, StorageConfig, StorageError, StorageResult};

pub struct SupabaseObjectStore {
    client: Client,
    base_url: String,
    bucket: String,
    service_key: String,
}

impl SupabaseObjectStore {
    pub fn new(
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        service_key: impl Into<String>,
    ) -> StorageResult<Self> {
        let base_url = base_url.into();
        let parsed = url::Url::parse(&base_url)
            .map_err(|e| StorageError::Config(format!("invalid storage URL '{}': {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(StorageError::Config(format!(
                "storage URL must be http(s): {}",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| StorageError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            service_key: service_key.into(),
        })
    }

    /// Build from the storage config section. URL, bucket and key must all be set.
    pub fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| StorageError::Config("SUPABASE_URL is not set".to_string()))?;
        let bucket = config
            .bucket
            .as_deref()
            .ok_or_else(|| StorageError::Config("storage bucket is not set".to_string()))?;
        let key = config
            .service_key
            .as_deref()
            .ok_or_else(|| StorageError::Config("SUPABASE_SERVICE_KEY is not set".to_string()))?;
        Self::new(url, bucket, key)
    }

    fn object_url(&self, key: &str) -> StorageResult<String> {
        validate_key(key)?;
        Ok(format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url, self.bucket, key
        ))
    }
}

async fn error_body(resp: reqwest::Response) -> String {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>())
}

#[async_trait]
impl ObjectStore for SupabaseObjectStore {
    async fn put(&self, key: &str, bytes: &[u8], content_type: Option<&str>) -> StorageResult<()> {
        let url = self.object_url(key)?;
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.service_key)
            .header("x-upsert", "true")
            .header(
                reqwest::header::CONTENT_TYPE,
                content_type.unwrap_or("application/octet-stream"),
            )
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| StorageError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(StorageError::Http(error_body(resp).await));
        }
        debug!("Uploaded {} bytes to bucket {}", bytes.len(), self.bucket);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let url = self.object_url(key)?;
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.service_key)
            .send()
            .await
            .map_err(|e| StorageError::Http(e.to_string()))?;

        match resp.status() {
            s if s.is_success() => Ok(resp
                .bytes()
                .await
                .map_err(|e| StorageError::Http(e.to_string()))?
                .to_vec()),
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => {
                Err(StorageError::NotFound(key.to_string()))
            }
            _ => Err(StorageError::Http(error_body(resp).await)),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let url = self.object_url(key)?;
        let resp = self
            .client
            .delete(&url)
            .bearer_auth(&self.service_key)
            .send()
            .await
            .map_err(|e| StorageError::Http(e.to_string()))?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            _ => Err(StorageError::Http(error_body(resp).await)),
        }
    }
}
