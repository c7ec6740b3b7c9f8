use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;

use crate::auth::MaybeUser;
use crate::catalog::{self, CatalogFilters, CatalogResponse, CatalogStats, CityCount};
use crate::error::AppError;
use crate::state::AppState;

pub async fn catalog(
    State(state): State<Arc<AppState>>,
    MaybeUser(user): MaybeUser,
    Query(filters): Query<CatalogFilters>,
) -> Result<Json<CatalogResponse>, AppError> {
    let response = catalog::fetch_catalog(&state, filters, user.map(|u| u.id)).await?;
    Ok(Json(response))
}

pub async fn cities(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CityCount>>, AppError> {
    Ok(Json(catalog::cities(&state).await?))
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CatalogStats>, AppError> {
    Ok(Json(catalog::stats(&state).await?))
}
