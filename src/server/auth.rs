//! Shared-secret check for mirror routes

use crate::server::error::ApiError;
use crate::server::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

/// Header carrying the shared secret
pub const HEADER_API_KEY: &str = "x-api-key";

/// Rejects the request with 401 unless `x-api-key` equals the configured key
pub(crate) async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorized = req
        .headers()
        .get(HEADER_API_KEY)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|key| key == state.api_key());

    if !authorized {
        warn!(path = %req.uri().path(), "Rejected request with missing or invalid API key");
        return Err(ApiError::unauthorized());
    }

    Ok(next.run(req).await)
}
