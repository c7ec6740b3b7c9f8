use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::ai::{self, ChatAnswer, DocKind, RecommendRequest, StructuredText, SyncReport};
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::favorites::{fetch_comparison_details, normalize_compare_ids};
use crate::state::AppState;
use crate::vectors::COLLECTION;

pub async fn sync(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<SyncReport>, AppError> {
    user.require_admin()?;
    Ok(Json(ai::sync_knowledge(&state).await?))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Optional retrieval scope: "university" or "program".
    pub kind: Option<String>,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatAnswer>, AppError> {
    if request.message.trim().is_empty() {
        return Err(AppError::Validation("Message must not be empty".to_string()));
    }

    let kind = request
        .kind
        .as_deref()
        .map(|kind| {
            kind.parse::<DocKind>()
                .map_err(|_| AppError::Validation(format!("Unknown document kind: {kind}")))
        })
        .transpose()?;

    Ok(Json(ai::chat(&state, &request.message, kind).await?))
}

pub async fn status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    user.require_admin()?;

    let indexed_points = state.vectors.count().await?;
    Ok(Json(json!({
        "collection": COLLECTION,
        "indexed_points": indexed_points,
    })))
}

pub async fn recommend(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RecommendRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if request.score.is_some_and(|s| s < 0) {
        return Err(AppError::Validation("Score must not be negative".to_string()));
    }
    if request.budget.is_some_and(|b| b < 0) {
        return Err(AppError::Validation("Budget must not be negative".to_string()));
    }

    let picks = ai::recommend(&state, &request).await?;
    Ok(Json(json!({ "recommendations": picks })))
}

#[derive(Debug, Deserialize)]
pub struct CompareAnalysisRequest {
    pub university_ids: Vec<i64>,
}

pub async fn compare(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CompareAnalysisRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let ids = normalize_compare_ids(&request.university_ids)?;
    let details = fetch_comparison_details(&state, &ids).await?;
    let analysis = ai::compare_narrative(&state, &details).await?;

    Ok(Json(json!({ "analysis": analysis })))
}

#[derive(Debug, Deserialize)]
pub struct StructureTextRequest {
    pub text: String,
}

pub async fn structure_text(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<StructureTextRequest>,
) -> Result<Json<StructuredText>, AppError> {
    user.require_admin()?;
    if request.text.trim().is_empty() {
        return Err(AppError::Validation("Text must not be empty".to_string()));
    }

    Ok(Json(ai::structure_text(&state, &request.text).await?))
}
