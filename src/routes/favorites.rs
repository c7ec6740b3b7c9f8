use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::ai::compare_narrative;
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::favorites::{
    compare_ids_from_favorites, ensure_favorite_inserted, fetch_comparison_details,
    list_favorites, normalize_compare_ids, winner_categories, ComparisonResult,
    FavoriteUniversity, INSERT_FAVORITE_SQL,
};
use crate::state::AppState;

pub async fn add(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(university_id): Path<i64>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM universities WHERE id = $1)")
            .bind(university_id)
            .fetch_one(&state.db)
            .await?;
    if !exists {
        return Err(AppError::NotFound("University not found"));
    }

    let result = sqlx::query(INSERT_FAVORITE_SQL)
        .bind(user.id)
        .bind(university_id)
        .execute(&state.db)
        .await?;
    ensure_favorite_inserted(result.rows_affected())?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "detail": "Added to favorites" })),
    ))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(university_id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result =
        sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND university_id = $2")
            .bind(user.id)
            .bind(university_id)
            .execute(&state.db)
            .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Favorite not found"));
    }

    Ok(Json(json!({ "detail": "Removed from favorites" })))
}

pub async fn my(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<FavoriteUniversity>>, AppError> {
    Ok(Json(list_favorites(&state, user.id).await?))
}

pub async fn check(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(university_id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let is_favorite: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM favorites WHERE user_id = $1 AND university_id = $2)",
    )
    .bind(user.id)
    .bind(university_id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(json!({ "is_favorite": is_favorite })))
}

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub university_ids: Vec<i64>,
    #[serde(default)]
    pub include_ai_analysis: bool,
}

async fn run_comparison(
    state: &AppState,
    ids: Vec<i64>,
    include_ai_analysis: bool,
) -> Result<ComparisonResult, AppError> {
    let details = fetch_comparison_details(state, &ids).await?;
    let winners = winner_categories(&details);

    let ai_analysis = if include_ai_analysis {
        Some(compare_narrative(state, &details).await?)
    } else {
        None
    };

    Ok(ComparisonResult {
        universities: details,
        winner_categories: winners,
        ai_analysis,
    })
}

pub async fn compare(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Json(request): Json<CompareRequest>,
) -> Result<Json<ComparisonResult>, AppError> {
    // Bounds are checked before any query runs.
    let ids = normalize_compare_ids(&request.university_ids)?;
    let result = run_comparison(&state, ids, request.include_ai_analysis).await?;

    Ok(Json(result))
}

#[derive(Debug, Default, Deserialize)]
pub struct CompareFavoritesParams {
    #[serde(default)]
    pub include_ai_analysis: bool,
}

pub async fn compare_favorites(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<CompareFavoritesParams>,
) -> Result<Json<ComparisonResult>, AppError> {
    let ids: Vec<i64> = sqlx::query_scalar(
        "SELECT university_id FROM favorites WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    let ids = compare_ids_from_favorites(ids)?;
    let result = run_comparison(&state, ids, params.include_ai_analysis).await?;

    Ok(Json(result))
}
