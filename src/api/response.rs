//! JSend envelopes and the error type every handler returns.
//!
//! Client mistakes (4xx) use the `fail` envelope with `data.message`;
//! server-side trouble (5xx, timeouts, retryable allocation conflicts) uses
//! the `error` envelope with a top-level `message`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::lifecycle::ProjectError;
use crate::storage::DatabaseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JSendStatus {
    Error,
    Fail,
    Success,
}

// ============================================================================
// Success envelopes
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct JSend<T: Serialize> {
    pub data: T,
    pub status: JSendStatus,
}

impl<T: Serialize> JSend<T> {
    pub fn success(data: T) -> Json<JSend<T>> {
        Json(JSend {
            data,
            status: JSendStatus::Success,
        })
    }
}

/// One page of a listing plus the window it was cut from.
#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
    pub total: u64,
}

impl<T: Serialize> Page<T> {
    /// Cut `limit` items starting at `offset` out of the full result set.
    pub fn slice<S>(
        all: &[S],
        limit: u32,
        offset: u32,
        map: impl Fn(&S) -> T,
    ) -> Json<JSend<Self>> {
        let items = all
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(map)
            .collect();
        JSend::success(Page {
            items,
            pagination: Pagination {
                limit,
                offset,
                total: all.len() as u64,
            },
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Serialize)]
struct FailBody {
    data: FailMessage,
    status: JSendStatus,
}

#[derive(Debug, Serialize)]
struct FailMessage {
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    status: JSendStatus,
}

/// A handler error. `Fail` renders the JSend fail envelope, `Error` the error one.
#[derive(Debug)]
pub enum ApiError {
    Fail(StatusCode, String),
    Error(StatusCode, String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::BAD_REQUEST, message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::NOT_FOUND, message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::FORBIDDEN, message.into())
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::PAYLOAD_TOO_LARGE, message.into())
    }

    /// Retryable: the caller did nothing wrong.
    pub fn unavailable(message: impl Into<String>) -> Self {
        ApiError::Error(StatusCode::SERVICE_UNAVAILABLE, message.into())
    }

    pub fn timeout() -> Self {
        ApiError::Error(StatusCode::REQUEST_TIMEOUT, "Request timed out".to_string())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Error(StatusCode::INTERNAL_SERVER_ERROR, message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Fail(code, _) | ApiError::Error(code, _) => *code,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Fail(code, message) => (
                code,
                Json(FailBody {
                    data: FailMessage { message },
                    status: JSendStatus::Fail,
                }),
            )
                .into_response(),
            ApiError::Error(code, message) => (
                code,
                Json(ErrorBody {
                    message,
                    status: JSendStatus::Error,
                }),
            )
                .into_response(),
        }
    }
}

impl From<ProjectError> for ApiError {
    fn from(e: ProjectError) -> Self {
        match e {
            ProjectError::Validation(message) => ApiError::bad_request(message),
            ProjectError::UnsupportedResourceType(_) => ApiError::bad_request(e.to_string()),
            ProjectError::NotFound(_) => ApiError::not_found(e.to_string()),
            ProjectError::AllocationConflict { .. } => ApiError::unavailable(e.to_string()),
            ProjectError::StorageUploadFailed(_)
            | ProjectError::StorageDeleteFailed(_)
            | ProjectError::Database(_) => ApiError::internal(e.to_string()),
            ProjectError::Invariant(_) => {
                tracing::error!(error = %e, "Invariant violation");
                ApiError::internal(e.to_string())
            }
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        ApiError::internal(e.to_string())
    }
}

/// Response mapper for the deadline layer, whose 408 carries no body.
pub async fn timeout_envelope(response: Response) -> Response {
    if response.status() == StatusCode::REQUEST_TIMEOUT {
        return ApiError::timeout().into_response();
    }
    response
}

// ============================================================================
// Extractors
// ============================================================================

/// `axum::Json` with rejections rendered as JSend failures.
pub struct AppJson<T>(pub T);

fn json_rejection_message(rejection: JsonRejection) -> String {
    match rejection {
        JsonRejection::JsonDataError(err) => format!("Invalid request body: {}", err.body_text()),
        JsonRejection::JsonSyntaxError(_) => "Malformed JSON in request body".to_string(),
        JsonRejection::MissingJsonContentType(_) => {
            "Missing Content-Type: application/json header".to_string()
        }
        _ => "Failed to read request body".to_string(),
    }
}

#[axum::async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, ApiError> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| AppJson(value))
            .map_err(|rejection| ApiError::bad_request(json_rejection_message(rejection)))
    }
}

/// Query-string extractor backed by `serde_qs`; rejections are JSend failures.
pub struct AppQuery<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, ApiError> {
        let query = parts.uri.query().unwrap_or_default();
        serde_qs::from_str(query)
            .map(AppQuery)
            .map_err(|e| ApiError::bad_request(query_error_message(&e.to_string())))
    }
}

/// Replace Rust type names in serde errors with words a client understands.
fn query_error_message(raw: &str) -> String {
    let readable = [
        ("u8", "small non-negative integer"),
        ("u32", "non-negative integer"),
        ("u64", "non-negative integer"),
        ("i32", "integer"),
    ]
    .iter()
    .fold(raw.to_string(), |msg, (ty, words)| msg.replace(ty, words));
    format!("Invalid query parameter: {readable}")
}
