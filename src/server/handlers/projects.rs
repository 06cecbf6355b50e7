//! Endpoints for signed-in users' projects.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::super::error::{ApiError, ApiResult};
use super::super::extract::AuthUser;
use super::super::AppState;
use super::form::read_upload;
use crate::models::{OutputStatus, Project};
use crate::services::{ProjectDetail, ProjectUploadResponse};

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub job_id: String,
    pub status: OutputStatus,
}

fn member(e: impl Into<ApiError>) -> ApiError {
    e.into().without_signup()
}

pub async fn list_projects(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<Vec<Project>>> {
    Ok(Json(state.projects.list(&user_id).await.map_err(member)?))
}

pub async fn upload_project(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    multipart: Multipart,
) -> ApiResult<Json<ProjectUploadResponse>> {
    let input = read_upload(multipart).await?;
    let response = state
        .projects
        .upload(&user_id, input)
        .await
        .map_err(member)?;
    Ok(Json(response))
}

pub async fn get_project(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(project_id): Path<String>,
) -> ApiResult<Json<ProjectDetail>> {
    Ok(Json(
        state
            .projects
            .get(&user_id, &project_id)
            .await
            .map_err(member)?,
    ))
}

/// Queue a blog, social or email output. The body is stored as the request.
pub async fn generate_output(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((project_id, kind)): Path<(String, String)>,
    body: Option<Json<serde_json::Value>>,
) -> ApiResult<(StatusCode, Json<GenerateResponse>)> {
    let request = body.map(|Json(v)| v).unwrap_or(serde_json::Value::Null);
    let output = state
        .projects
        .generate(&user_id, &project_id, &kind, request)
        .await
        .map_err(member)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateResponse {
            job_id: output.id,
            status: output.status,
        }),
    ))
}

pub async fn list_project_outputs(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Vec<crate::models::Output>>> {
    Ok(Json(
        state
            .projects
            .list_outputs(&user_id, &project_id)
            .await
            .map_err(member)?,
    ))
}
