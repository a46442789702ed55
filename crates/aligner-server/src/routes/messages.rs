//! Message ingestion route.

use std::sync::Arc;

use aligner_core::types::{IncomingMessage, ProcessingResult};
use aligner_core::Error;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

use crate::state::AppState;

/// Create message router
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/messages", post(process_message))
}

/// Run an inbound chat message through the pipeline
pub async fn process_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IncomingMessage>,
) -> Result<Json<ProcessingResult>, (StatusCode, String)> {
    let result = state
        .pipeline
        .process_message(req)
        .await
        .map_err(|e| match e {
            Error::InvalidMessage(msg) => (StatusCode::BAD_REQUEST, msg),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        })?;

    Ok(Json(result))
}
