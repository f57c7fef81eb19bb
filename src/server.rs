//! HTTP request intake
//!
//! `POST /invoke` takes a JSON job document, runs the copy to completion and
//! answers with the run report.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::JobRequest;
use crate::core::run_job;
use crate::error::{CopyError, EXIT_FATAL};
use crate::storage::StoreFactory;

/// Default listen address
pub const DEFAULT_LISTEN: &str = "0.0.0.0:9000";

#[derive(Clone)]
pub struct AppState {
    pub factory: Arc<dyn StoreFactory>,

    /// Parent of every run's cancellation token
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(factory: Arc<dyn StoreFactory>, shutdown: CancellationToken) -> Self {
        Self { factory, shutdown }
    }
}

/// Error body returned for failed invocations
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_key: Option<String>,
}

/// A failed invocation
#[derive(Debug)]
pub struct InvokeError(CopyError);

impl IntoResponse for InvokeError {
    fn into_response(self) -> Response {
        let status = if self.0.exit_code() == EXIT_FATAL {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = ErrorBody {
            error: self.0.to_string(),
            failed_key: self.0.failed_key().map(str::to_string),
        };
        (status, Json(body)).into_response()
    }
}

async fn invoke_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match std::str::from_utf8(&body)
        .map_err(|e| CopyError::Config(format!("request body is not UTF-8: {}", e)))
        .and_then(JobRequest::from_json)
    {
        Ok(request) => request,
        Err(e) => return InvokeError(e).into_response(),
    };

    info!(source = %request.source, target = %request.target, "invoke");

    match run_job(state.factory.as_ref(), &request, state.shutdown.child_token()).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            error!(error = %e, "invoke failed");
            InvokeError(e).into_response()
        }
    }
}

/// Build the intake router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/invoke", post(invoke_handler))
        .with_state(state)
}

/// Serve until `state.shutdown` is cancelled
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
