//! Configuration management for repurpose using the prefer crate.
//!
//! Precedence, lowest first: built-in defaults, config file, environment
//! variables, CLI flags.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::auth::AuthConfig;
use crate::rate_limit::{RateLimitBackendKind, RateLimitConfig};
use crate::repository::util::{is_postgres_url, redact_url_password};
use crate::repository::{DbContext, DbError};
use crate::storage::StorageConfig;
use crate::transcription::TranscriptionConfig;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "repurpose.db";

/// Subdirectory of the data dir holding locally stored objects.
const OBJECTS_SUBDIR: &str = "objects";

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. Empty means any origin.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
        }
    }
}

/// Upload size and type limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub anonymous_max_mb: u64,
    pub authenticated_max_mb: u64,
    /// Hard cap on request bodies. Larger than the file limits so oversized
    /// files still get a structured `file_too_large` response.
    pub max_request_body_mb: u64,
    pub allowed_extensions: Vec<String>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            anonymous_max_mb: 10,
            authenticated_max_mb: 25,
            max_request_body_mb: 64,
            allowed_extensions: ["mp3", "wav", "m4a", "aac", "ogg"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl LimitsConfig {
    pub fn anonymous_max_bytes(&self) -> u64 {
        self.anonymous_max_mb * BYTES_PER_MB
    }

    pub fn authenticated_max_bytes(&self) -> u64 {
        self.authenticated_max_mb * BYTES_PER_MB
    }

    pub fn max_request_body_bytes(&self) -> usize {
        (self.max_request_body_mb * BYTES_PER_MB) as usize
    }
}

/// Anonymous session lifetime and presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_days: i64,
    /// Upper bound on preview excerpt length, in characters.
    pub preview_chars: usize,
    pub estimated_processing_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_days: 7,
            preview_chars: 150,
            estimated_processing_secs: 45,
            cleanup_interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub max_concurrent: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self { max_concurrent: 2 }
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database URL (overrides the SQLite file in `data_dir` if set).
    pub database_url: Option<String>,
    pub server: ServerConfig,
    pub limits: LimitsConfig,
    pub rate_limit: RateLimitConfig,
    pub session: SessionConfig,
    pub transcription: TranscriptionConfig,
    pub jobs: JobsConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
}

impl Default for Settings {
    fn default() -> Self {
        // Falls back gracefully: local data dir -> home dir -> current dir
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("repurpose");

        Self::with_data_dir(data_dir)
    }
}

impl Settings {
    /// Create default settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            database_url: None,
            server: ServerConfig::default(),
            limits: LimitsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            session: SessionConfig::default(),
            transcription: TranscriptionConfig::default(),
            jobs: JobsConfig::default(),
            storage: StorageConfig::default(),
            auth: AuthConfig::default(),
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        match self.database_url {
            Some(ref url) => url.clone(),
            None => format!("sqlite:{}", self.database_path().display()),
        }
    }

    /// Check if using PostgreSQL (vs SQLite).
    pub fn is_postgres(&self) -> bool {
        self.database_url
            .as_ref()
            .is_some_and(|url| is_postgres_url(url))
    }

    /// Path of the default SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DEFAULT_DATABASE_FILENAME)
    }

    /// Root directory of the local object store.
    pub fn objects_dir(&self) -> PathBuf {
        self.data_dir.join(OBJECTS_SUBDIR)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| {
                format!(
                    "Invalid bind address {}:{}: {}",
                    self.server.host, self.server.port, e
                )
            })
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for (label, dir) in [("data", self.data_dir.clone()), ("objects", self.objects_dir())] {
            fs::create_dir_all(&dir).map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create {} directory '{}': {}",
                        label,
                        dir.display(),
                        e
                    ),
                )
            })?;
        }
        Ok(())
    }

    /// Create a database context using the configured database URL or path.
    pub fn create_db_context(&self) -> Result<DbContext, DbError> {
        tracing::debug!(
            "Opening database {}",
            redact_url_password(&self.database_url())
        );
        DbContext::from_url(&self.database_url())
    }

    /// Overlay environment variables looked up through `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = var("DATABASE_URL") {
            tracing::debug!("Using DATABASE_URL from environment: {}", redact_url_password(&url));
            self.database_url = Some(url);
        }
        if let Some(backend) = var("RATE_LIMIT_BACKEND") {
            match backend.to_ascii_lowercase().as_str() {
                "memory" => self.rate_limit.backend = RateLimitBackendKind::Memory,
                "database" => self.rate_limit.backend = RateLimitBackendKind::Database,
                other => tracing::warn!("Ignoring unknown RATE_LIMIT_BACKEND '{}'", other),
            }
        }
        if let Some(key) = var("GROQ_API_KEY") {
            self.transcription.api_key = Some(key);
        }
        if let Some(pem) = var("CLERK_JWT_PUBLIC_KEY") {
            // Allow single-line PEMs with escaped newlines, as set in most dashboards
            self.auth.public_key_pem = Some(pem.replace("\\n", "\n"));
        }
        if let Some(secret) = var("AUTH_HS256_SECRET") {
            self.auth.hs256_secret = Some(secret);
        }
        if let Some(url) = var("SUPABASE_URL") {
            self.storage.url = Some(url);
        }
        if let Some(key) = var("SUPABASE_SERVICE_KEY") {
            self.storage.service_key = Some(key);
        }
        if let Some(bucket) = var("STORAGE_BUCKET") {
            self.storage.bucket = Some(bucket);
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path, relative to the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers repurpose config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("repurpose").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("{}; using defaults", e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            // No config file found
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let mut config = Self::parse(&contents, path)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, String> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        match ext {
            "toml" => toml::from_str(contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e)),
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref url) = self.database_url {
            settings.database_url = Some(url.clone());
        }
        settings.server = self.server.clone();
        settings.limits = self.limits.clone();
        settings.rate_limit = self.rate_limit.clone();
        settings.session = self.session.clone();
        settings.jobs = self.jobs.clone();

        // Secrets are never read from the file, keep whatever is already set
        let api_key = settings.transcription.api_key.take();
        settings.transcription = TranscriptionConfig {
            api_key,
            ..self.transcription.clone()
        };
        let service_key = settings.storage.service_key.take();
        settings.storage = StorageConfig {
            service_key,
            ..self.storage.clone()
        };
        let (pem, secret) = (
            settings.auth.public_key_pem.take(),
            settings.auth.hs256_secret.take(),
        );
        settings.auth = AuthConfig {
            public_key_pem: pem,
            hs256_secret: secret,
            ..self.auth.clone()
        };
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Data directory override (--data-dir flag).
    pub data_dir: Option<PathBuf>,
}

/// Look for a config file inside the data directory.
fn find_config_in_dir(dir: &Path) -> Option<PathBuf> {
    ["toml", "yaml", "yml", "json"]
        .iter()
        .map(|ext| dir.join(format!("repurpose.{}", ext)))
        .find(|path| path.exists())
}

/// Load settings from file, environment and options.
///
/// An explicit `--config` path that cannot be read or parsed is an error.
/// Discovered files that fail to parse are logged and skipped.
pub async fn load_settings(options: LoadOptions) -> Result<(Settings, Config), String> {
    let config = if let Some(ref path) = options.config_path {
        Config::load_from_path(path).await?
    } else if let Some(path) = options.data_dir.as_deref().and_then(find_config_in_dir) {
        tracing::debug!("Found config in data dir: {}", path.display());
        Config::load_from_path(&path).await?
    } else {
        Config::load().await
    };

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let base_dir = config.base_dir().unwrap_or_else(|| cwd.clone());

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings, &base_dir);
    settings.apply_env_with(|name| std::env::var(name).ok());

    if let Some(data_dir) = options.data_dir {
        settings.data_dir = if data_dir.is_absolute() {
            data_dir
        } else {
            cwd.join(data_dir)
        };
    }

    Ok((settings, config))
}
