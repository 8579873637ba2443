use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::extract_principal;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::*;

/// Room for multipart framing on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        // Health & stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        // Signature requests
        .route("/v1/api/requests/create", post(create_request))
        .route("/v1/api/requests/my-requests", get(my_requests))
        .route("/v1/api/requests/received-requests", get(received_requests))
        .route("/v1/api/requests/summary", get(summary))
        .route("/v1/api/requests/:request_id", get(get_request))
        // Sign actions
        .route("/v1/api/sign/sign-by-user", post(sign_by_user))
        .route("/v1/api/sign/latest/:request_id", get(latest_version))
        .route("/v1/api/sign/download/:request_id", get(download_latest))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

// ============ Helpers ============

/// Unparseable ids cannot name a stored request
fn parse_request_id(raw: &str) -> ApiResult<RequestId> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::request_not_found(raw))
}

/// Pull the `file` part out of a multipart body
async fn read_upload(multipart: &mut Multipart) -> ApiResult<Upload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {e}")))?;

        return Ok(Upload { file_name, bytes });
    }

    Err(ApiError::bad_request("Missing 'file' part"))
}

// ============ Health Endpoints ============

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::success(state.health()))
}

async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::success(state.stats()))
}

// ============ Signature Request Endpoints ============

async fn create_request(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateSignatureRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = extract_principal(&headers)?;
    let created = state.create_request(&principal, req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

async fn my_requests(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = extract_principal(&headers)?;
    let requests = state.list_owned(&principal, query.status).await?;
    Ok(Json(ApiResponse::success(requests)))
}

async fn received_requests(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = extract_principal(&headers)?;
    let requests = state.list_received(&principal, query.status).await?;
    Ok(Json(ApiResponse::success(requests)))
}

async fn summary(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let principal = extract_principal(&headers)?;
    let summary = state.summary(&principal).await?;
    Ok(Json(ApiResponse::success(summary)))
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = extract_principal(&headers)?;
    state.resolve_caller(&principal).await?;
    let request = state.get_request(&parse_request_id(&request_id)?)?;
    Ok(Json(ApiResponse::success(request)))
}

// ============ Sign Action Endpoints ============

#[derive(Deserialize)]
struct SignQuery {
    #[serde(rename = "requestId")]
    request_id: String,
}

async fn sign_by_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SignQuery>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let principal = extract_principal(&headers)?;
    let request_id = parse_request_id(&query.request_id)?;
    let upload = read_upload(&mut multipart).await?;
    let signed = state.sign_request(&principal, request_id, upload).await?;
    Ok(Json(ApiResponse::success(signed)))
}

async fn latest_version(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = extract_principal(&headers)?;
    state.resolve_caller(&principal).await?;
    let latest = state.latest_version(&parse_request_id(&request_id)?)?;
    Ok(Json(ApiResponse::success(latest)))
}

async fn download_latest(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = extract_principal(&headers)?;
    state.resolve_caller(&principal).await?;
    let (file_name, bytes) = state
        .download_latest(&parse_request_id(&request_id)?)
        .await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        file_name.replace(['"', '\\'], "_")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_request_id(&id.to_string()).unwrap(), id);
        assert!(matches!(
            parse_request_id("not-a-uuid"),
            Err(ApiError::RequestNotFound(_))
        ));
    }
}
