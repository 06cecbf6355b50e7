//! JSON API server for anonymous sessions, projects and outputs.

mod error;
mod extract;
mod handlers;
mod routes;

pub use error::{ApiError, ApiResult};
pub use extract::{AuthUser, ClientIp};
pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::auth::Authenticator;
use crate::config::Settings;
use crate::rate_limit::create_rate_limiter;
use crate::repository::DbContext;
use crate::services::{AnonymousService, CleanupService, JobRunner, ProjectService};
use crate::storage::{create_object_store, BoxedObjectStore};
use crate::transcription::{
    create_provider, BoxedTranscriptionProvider, DisabledTranscriber, TranscriptionError,
};

/// Shared state for the API server.
#[derive(Clone)]
pub struct AppState {
    pub db: DbContext,
    pub anonymous: AnonymousService,
    pub projects: ProjectService,
    pub cleanup: CleanupService,
    pub jobs: JobRunner,
    pub auth: Authenticator,
    pub body_limit: usize,
    pub cors_origins: Vec<String>,
}

impl AppState {
    /// Wire services from already-built infrastructure.
    pub fn new(
        db: DbContext,
        store: BoxedObjectStore,
        provider: BoxedTranscriptionProvider,
        auth: Authenticator,
        settings: &Settings,
    ) -> Self {
        let limiter = create_rate_limiter(&settings.rate_limit, db.pool());
        let jobs = JobRunner::new(
            db.clone(),
            store.clone(),
            provider,
            settings.transcription.clone(),
            settings.jobs.max_concurrent,
        );

        Self {
            anonymous: AnonymousService::new(
                db.clone(),
                store.clone(),
                limiter.clone(),
                jobs.clone(),
                &settings.limits,
                settings.session.clone(),
            ),
            projects: ProjectService::new(
                db.clone(),
                store.clone(),
                jobs.clone(),
                &settings.limits,
                &settings.session,
            ),
            cleanup: CleanupService::new(db.clone(), store, limiter),
            db,
            jobs,
            auth,
            body_limit: settings.limits.max_request_body_bytes(),
            cors_origins: settings.server.cors_origins.clone(),
        }
    }

    /// Build the database, object store, transcription provider and verifier from settings.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let db = settings.create_db_context()?;
        let store = create_object_store(&settings.storage, &settings.objects_dir())?;
        let provider = match create_provider(&settings.transcription) {
            Ok(provider) => provider,
            Err(TranscriptionError::NotConfigured) => {
                tracing::warn!("GROQ_API_KEY is not set; uploads will fail transcription");
                Arc::new(DisabledTranscriber)
            }
            Err(e) => return Err(e.into()),
        };
        let auth = Authenticator::from_config(&settings.auth)?;
        if !auth.is_configured() {
            tracing::warn!("No JWT key configured; authenticated endpoints will reject every request");
        }
        Ok(Self::new(db, store, provider, auth, settings))
    }
}

/// Start the web server.
pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = create_router(state);

    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
