//! HTTP surface. Handlers stay thin; query building and the assistant
//! pipelines live in their own modules.

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

mod ai;
mod auth;
mod catalog;
mod favorites;
mod universities;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/catalog", get(catalog::catalog))
        .route("/catalog/cities", get(catalog::cities))
        .route("/catalog/stats", get(catalog::stats))
        .route("/universities", get(universities::list))
        .route("/universities", post(universities::create))
        .route("/universities/programs/search", get(universities::search_programs))
        .route("/universities/{id}", get(universities::detail))
        .route("/universities/{id}", put(universities::update))
        .route("/universities/{id}", delete(universities::remove))
        .route("/universities/{id}/programs", post(universities::create_program))
        .route("/universities/{id}/grants", post(universities::create_grant))
        .route(
            "/universities/{id}/dormitories",
            post(universities::create_dormitory),
        )
        .route("/favorites/my", get(favorites::my))
        .route("/favorites/compare", post(favorites::compare))
        .route("/favorites/compare-favorites", post(favorites::compare_favorites))
        .route("/favorites/check/{university_id}", get(favorites::check))
        .route("/favorites/{university_id}", post(favorites::add))
        .route("/favorites/{university_id}", delete(favorites::remove))
        .route("/ai/sync", post(ai::sync))
        .route("/ai/status", get(ai::status))
        .route("/ai/chat", post(ai::chat))
        .route("/ai/recommend", post(ai::recommend))
        .route("/ai/compare", post(ai::compare))
        .route("/ai/structure-text", post(ai::structure_text))
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "name": "University DataHub API",
        "docs": "/health",
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
