//! Gap query and lifecycle routes.

use std::sync::Arc;

use aligner_core::types::{Gap, GapDetail, GapFilter, GapStatus};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Create gap router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/gaps", get(list_gaps))
        .route("/gaps/{id}", get(get_gap))
        .route("/gaps/{id}/priority", patch(update_priority))
        .route("/gaps/{id}/status", patch(update_status))
}

#[derive(Debug, Serialize)]
pub struct GapResponse {
    pub id: String,
    pub assignee_id: String,
    pub decision_id: Option<String>,
    pub description: String,
    pub recommendation: String,
    pub severity: String,
    pub status: String,
    pub priority: i32,
    pub created_at: i64,
}

impl From<Gap> for GapResponse {
    fn from(g: Gap) -> Self {
        Self {
            id: g.id,
            assignee_id: g.assignee_id,
            decision_id: g.decision_id,
            description: g.description,
            recommendation: g.recommendation,
            severity: g.severity.as_str().to_string(),
            status: g.status.as_str().to_string(),
            priority: g.priority,
            created_at: g.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GapWithDetails {
    #[serde(flatten)]
    pub gap: GapResponse,
    pub details: Vec<GapDetail>,
}

#[derive(Debug, Deserialize)]
pub struct ListGapsQuery {
    pub assignee_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<usize>,
}

/// List gaps ordered by priority
pub async fn list_gaps(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListGapsQuery>,
) -> Result<Json<Vec<GapResponse>>, (StatusCode, String)> {
    let status = match query.status.as_deref() {
        Some(s) => Some(
            GapStatus::parse(s)
                .ok_or((StatusCode::BAD_REQUEST, format!("Unknown status: {s}")))?,
        ),
        None => None,
    };

    let gaps = state
        .db
        .list_gaps(&GapFilter {
            assignee_id: query.assignee_id,
            status,
            limit: query.limit,
        })
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(gaps.into_iter().map(Into::into).collect()))
}

/// Get a gap with its detail rows
pub async fn get_gap(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<GapWithDetails>, (StatusCode, String)> {
    let gap = state
        .db
        .get_gap(&id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or((StatusCode::NOT_FOUND, "Gap not found".to_string()))?;

    let details = state
        .db
        .list_gap_details(&id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(GapWithDetails {
        gap: gap.into(),
        details,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePriorityRequest {
    pub priority: i32,
}

/// Reorder a gap
pub async fn update_priority(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdatePriorityRequest>,
) -> Result<Json<GapResponse>, (StatusCode, String)> {
    let gap = state
        .db
        .update_gap_priority(&id, req.priority)
        .map_err(|e| match e {
            aligner_core::Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        })?;

    Ok(Json(gap.into()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// Move a gap through its lifecycle
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<GapResponse>, (StatusCode, String)> {
    let status = GapStatus::parse(&req.status).ok_or((
        StatusCode::BAD_REQUEST,
        format!("Unknown status: {}", req.status),
    ))?;

    let gap = state
        .db
        .update_gap_status(&id, status)
        .map_err(|e| match e {
            aligner_core::Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        })?;

    Ok(Json(gap.into()))
}
