//! Decision query routes.

use std::collections::BTreeSet;
use std::sync::Arc;

use aligner_core::types::{Decision, DecisionFilter};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Create decision router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/decisions", get(list_decisions))
        .route("/decisions/{id}", get(get_decision))
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub id: String,
    pub author_id: String,
    pub decision_type: String,
    pub text: String,
    pub affected_components: BTreeSet<String>,
    pub referenced_reqs: BTreeSet<String>,
    pub source_message_id: String,
    pub channel_id: String,
    pub created_at: i64,
}

impl From<Decision> for DecisionResponse {
    fn from(d: Decision) -> Self {
        Self {
            id: d.id,
            author_id: d.author_id,
            decision_type: d.decision_type.as_str().to_string(),
            text: d.text,
            affected_components: d.affected_components,
            referenced_reqs: d.referenced_reqs,
            source_message_id: d.source_message_id,
            channel_id: d.channel_id,
            created_at: d.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListDecisionsQuery {
    pub author_id: Option<String>,
    pub component: Option<String>,
    pub limit: Option<usize>,
}

/// List decisions, newest first
pub async fn list_decisions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListDecisionsQuery>,
) -> Result<Json<Vec<DecisionResponse>>, (StatusCode, String)> {
    let decisions = state
        .db
        .list_decisions(&DecisionFilter {
            author_id: query.author_id,
            component: query.component,
            limit: query.limit,
        })
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(decisions.into_iter().map(Into::into).collect()))
}

/// Get a decision by ID
pub async fn get_decision(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DecisionResponse>, (StatusCode, String)> {
    let decision = state
        .db
        .get_decision(&id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or((StatusCode::NOT_FOUND, "Decision not found".to_string()))?;

    Ok(Json(decision.into()))
}
