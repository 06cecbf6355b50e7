use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use super::super::error::ApiResult;
use super::super::extract::AuthUser;
use super::super::AppState;
use crate::models::Output;
use crate::services::OutputPatch;

pub async fn get_output(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(output_id): Path<String>,
) -> ApiResult<Json<Output>> {
    Ok(Json(state.projects.get_output(&user_id, &output_id).await?))
}

pub async fn update_output(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(output_id): Path<String>,
    Json(patch): Json<OutputPatch>,
) -> ApiResult<Json<Output>> {
    Ok(Json(
        state
            .projects
            .update_output(&user_id, &output_id, patch)
            .await?,
    ))
}

pub async fn delete_output(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(output_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.projects.delete_output(&user_id, &output_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
