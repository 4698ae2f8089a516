//! HTTP surface
//!
//! `POST /mirror` runs the pipeline behind the `x-api-key` check and answers with the zip
//! archive. `GET /health` is an unauthenticated liveness probe. Both are also served under
//! `/api`.

mod auth;
mod error;
mod routes;

pub use auth::HEADER_API_KEY;
pub use error::ApiError;
pub use routes::HealthResponse;

use crate::pipeline::MirrorPipeline;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pipeline: MirrorPipeline,
    api_key: Arc<str>,
}

impl AppState {
    pub fn new(pipeline: MirrorPipeline, api_key: &str) -> Self {
        Self {
            pipeline,
            api_key: Arc::from(api_key),
        }
    }

    pub fn pipeline(&self) -> &MirrorPipeline {
        &self.pipeline
    }

    pub(crate) fn api_key(&self) -> &str {
        &self.api_key
    }
}

/// Builds the application router
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    let protected = Router::new()
        .route("/mirror", post(routes::mirror))
        .route("/api/mirror", post(routes::mirror))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/health", get(routes::health))
        .merge(protected)
        .layer(cors_layer(allowed_origins))
        // Method and path only
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .with_state(state)
}

/// CORS policy; an empty list or `"*"` allows any origin
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(HEADER_API_KEY)]);

    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

/// Serves `router` on `listener` until Ctrl-C or SIGTERM
pub async fn serve(listener: TcpListener, router: Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Website Mirror API listening on {}", addr);
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// Resolves on Ctrl-C, or on SIGTERM where supported
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
