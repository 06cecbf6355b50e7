//! Anonymous upload, polling, preview and claim endpoints.

use axum::extract::{Multipart, Path, State};
use axum::Json;

use super::super::error::ApiResult;
use super::super::extract::{AuthUser, ClientIp};
use super::super::AppState;
use super::form::read_upload;
use crate::rate_limit::RateLimitInfo;
use crate::services::{ClaimResponse, PreviewResponse, StatusResponse, UploadResponse};

pub async fn anonymous_upload(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let input = read_upload(multipart).await?;
    let response = state.anonymous.create_upload(&ip, input).await?;
    Ok(Json(response))
}

pub async fn anonymous_rate_limit(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
) -> ApiResult<Json<RateLimitInfo>> {
    Ok(Json(state.anonymous.rate_limit_info(&ip).await?))
}

pub async fn anonymous_status(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    Ok(Json(state.anonymous.status(&token).await?))
}

/// Blurred preview. A session still in flight answers 202 `still_processing`.
pub async fn anonymous_preview(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<PreviewResponse>> {
    Ok(Json(state.anonymous.preview(&token).await?))
}

pub async fn anonymous_claim(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(token): Path<String>,
) -> ApiResult<Json<ClaimResponse>> {
    Ok(Json(state.anonymous.claim(&token, &user_id).await?))
}
