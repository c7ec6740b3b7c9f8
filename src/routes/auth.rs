use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::{hash_password, issue_token, verify_password, AuthUser};
use crate::error::AppError;
use crate::models::{Role, User};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

fn validate_credentials(email: &str, password: &str) -> Result<(), AppError> {
    if !email.contains('@') {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }
    if password.len() < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    Ok(())
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), AppError> {
    validate_credentials(&request.email, &request.password)?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
            .bind(&request.email)
            .fetch_one(&state.db)
            .await?;
    if exists {
        return Err(AppError::Conflict("Email already registered"));
    }

    let hash = hash_password(&request.password)?;
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (email, password_hash, full_name, role) \
         VALUES ($1, $2, $3, 'user') \
         RETURNING id, email, password_hash, full_name, role, created_at",
    )
    .bind(&request.email)
    .bind(&hash)
    .bind(&request.full_name)
    .fetch_one(&state.db)
    .await?;

    info!(user_id = user.id, "registered user");

    let token = issue_token(user.id, &user.email, Role::User, &state.config)?;
    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            access_token: token,
            token_type: "bearer",
        }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, email, password_hash, full_name, role, created_at \
         FROM users WHERE email = $1",
    )
    .bind(&request.email)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::Unauthorized("Invalid email or password"))?;

    if !verify_password(&request.password, &user.password_hash)? {
        return Err(AppError::Unauthorized("Invalid email or password"));
    }

    let role = user
        .role
        .parse::<Role>()
        .map_err(|_| AppError::Unauthorized("Unknown role"))?;
    let token = issue_token(user.id, &user.email, role, &state.config)?;

    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer",
    }))
}

pub async fn me(user: AuthUser) -> Json<AuthUser> {
    Json(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_are_checked_before_any_io() {
        assert!(validate_credentials("not-an-email", "longenough").is_err());
        assert!(validate_credentials("a@b.kz", "short").is_err());
        assert!(validate_credentials("a@b.kz", "longenough").is_ok());
    }
}
