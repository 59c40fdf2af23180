use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::response::{ApiError, AppQuery};
use crate::object_store::ObjectStoreError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SignedUrlParams {
    pub expires: i64,
    pub signature: String,
}

/// Serve object content behind a URL signed by the local backend.
/// Route: GET /objects/:bucket/*key
pub async fn serve_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    AppQuery(params): AppQuery<SignedUrlParams>,
) -> Result<Response, ApiError> {
    let signer = state
        .url_signer
        .as_ref()
        .ok_or_else(|| ApiError::not_found("Object serving is not enabled"))?;

    if !signer.verify(&bucket, &key, params.expires, &params.signature) {
        return Err(ApiError::forbidden("URL signature is invalid or expired"));
    }

    let data = state
        .object_store
        .get(&bucket, &key)
        .await
        .map_err(|e| match e {
            ObjectStoreError::NotFound(_) => ApiError::not_found("Object not found"),
            _ => ApiError::internal(format!("Failed to retrieve object: {e}")),
        })?;

    let content_type = mime_guess::from_path(&key)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let mut response = (StatusCode::OK, data).into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        content_type
            .parse()
            .unwrap_or(header::HeaderValue::from_static("application/octet-stream")),
    );

    // Signed URLs are per-recipient; never cache them in shared caches.
    headers.insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("private, max-age=300"),
    );

    Ok(response)
}
