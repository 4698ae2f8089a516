use crate::pipeline::{MirrorRequest, MirrorStage};
use crate::server::error::ApiError;
use crate::server::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{debug, error};

/// Body of the liveness probe
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "Website Mirror API",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Runs the pipeline and answers with the archive as an attachment
pub(crate) async fn mirror(
    State(state): State<AppState>,
    payload: Result<Json<MirrorRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;

    let artifact = state.pipeline().run(request).await?;
    let disposition = format!("attachment; filename=\"{}\"", artifact.file_name());
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|e| ApiError::internal(format!("Invalid archive name: {}", e)))?;

    let file_name = artifact.file_name().to_string();
    let body = artifact.into_bytes().await.map_err(|e| {
        error!(file = %file_name, error = %e, "Failed to read archive");
        ApiError::internal(format!("Failed to read zip file: {}", e))
    })?;

    debug!(
        stage = %MirrorStage::Responding,
        file = %file_name,
        bytes = body.len(),
        "Sending archive"
    );

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
