//! HTTP interface for the facematch daemon.
//!
//! `POST /api/compare-faces`: decode → write temp file → scan candidates → respond.
//! `GET /api/status`: version and verification policy.

use crate::artifact::{ArtifactError, TempArtifact};
use crate::matcher;
use crate::request::{DecodeError, MatchRequest, ValidationError};
use crate::verifier::{FaceVerifier, VerifyError};
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use facematch_core::VerificationPolicy;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared, read-only state handed to every request.
pub struct AppState<V> {
    verifier: Arc<V>,
    scratch_dir: Arc<PathBuf>,
    policy: VerificationPolicy,
}

impl<V> AppState<V> {
    pub fn new(verifier: Arc<V>, scratch_dir: PathBuf, policy: VerificationPolicy) -> Self {
        Self {
            verifier,
            scratch_dir: Arc::new(scratch_dir),
            policy,
        }
    }
}

impl<V> Clone for AppState<V> {
    fn clone(&self) -> Self {
        Self {
            verifier: Arc::clone(&self.verifier),
            scratch_dir: Arc::clone(&self.scratch_dir),
            policy: self.policy,
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchResponse {
    pub match_found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_image_url: Option<String>,
}

impl From<Option<String>> for MatchResponse {
    fn from(matched: Option<String>) -> Self {
        Self {
            match_found: matched.is_some(),
            matched_image_url: matched,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    /// Body unreadable or over the size limit.
    #[error(transparent)]
    Body(#[from] BytesRejection),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Verify(#[from] VerifyError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Body(rejection) => rejection.status(),
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Verify(VerifyError::CapturedImage(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Decode(_) | ApiError::Artifact(_) | ApiError::Verify(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "compare-faces failed");
        } else {
            tracing::info!(status = status.as_u16(), error = %self, "compare-faces rejected");
        }
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

async fn compare_faces<V: FaceVerifier>(
    State(state): State<AppState<V>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<MatchResponse>, ApiError> {
    let request = MatchRequest::from_body(&body?)?;
    let image = request.decode_captured_image()?;

    tracing::info!(
        candidates = request.database_urls.len(),
        image_bytes = image.len(),
        "compare-faces requested"
    );

    let artifact = TempArtifact::materialize(&state.scratch_dir, &image).await?;
    let outcome = matcher::find_match(state.verifier.as_ref(), artifact.path(), &request.database_urls).await;
    artifact.release().await;

    Ok(Json(MatchResponse::from(outcome?)))
}

async fn status<V: FaceVerifier>(State(state): State<AppState<V>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.policy.model,
        "detector": state.policy.detector,
        "metric": state.policy.metric,
        "threshold": state.policy.threshold,
    }))
}

/// Build the application router. Any origin may call it.
pub fn router<V: FaceVerifier>(state: AppState<V>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/api/compare-faces", post(compare_faces::<V>))
        .route("/api/status", get(status::<V>))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "cannot listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("facematchd shutting down");
}
