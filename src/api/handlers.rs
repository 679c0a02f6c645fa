use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    RecommendationRecord, ServedRecommendation, ServingMode, SimilarityCandidate,
    SourceItemMetadata,
};

use super::AppState;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub user_id: String,
    pub source: SourceItemMetadata,
    #[serde(default)]
    pub similar_artists: Vec<SimilarityCandidate>,
    #[serde(default)]
    pub similar_recordings: Vec<SimilarityCandidate>,
    #[serde(default)]
    pub similar_release_groups: Vec<SimilarityCandidate>,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub user_id: String,
    pub anchor_item: String,
    pub amount: i64,
    #[serde(default)]
    pub mode: ServingMode,
    #[serde(default)]
    pub ignore: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub user_id: String,
    pub recommended_item: String,
    pub positive: bool,
}

#[derive(Debug, Deserialize)]
pub struct ClearParams {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub removed: u64,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Generates and persists a fresh recommendation batch
pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> AppResult<(StatusCode, Json<Vec<RecommendationRecord>>)> {
    let records = state
        .synthesizer
        .generate(
            &request.user_id,
            &request.source,
            &request.similar_artists,
            &request.similar_recordings,
            &request.similar_release_groups,
            request.amount,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(records)))
}

/// Serves ranked recommendations from stored state
pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> AppResult<Json<Vec<ServedRecommendation>>> {
    let served = state
        .selector
        .select(
            &request.user_id,
            &request.anchor_item,
            request.amount,
            request.mode,
            &request.ignore,
        )
        .await?;
    Ok(Json(served))
}

/// Applies a user's judgment to a recommended item
pub async fn apply_feedback(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> AppResult<StatusCode> {
    state
        .feedback
        .apply_feedback(&request.user_id, &request.recommended_item, request.positive)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Deletes a single recommendation record
pub async fn delete_recommendation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.feedback.delete_recommendation(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Clears recommendations for one user, or all of them
pub async fn clear(
    State(state): State<AppState>,
    Query(params): Query<ClearParams>,
) -> AppResult<Json<ClearResponse>> {
    let removed = state.feedback.clear(params.user_id.as_deref()).await?;
    Ok(Json(ClearResponse { removed }))
}
