//! Credential verification and bearer-token issuance/validation.
//!
//! Tokens carry the user id, email and role so request handling never has to
//! re-read the users table; a password change therefore does not revoke
//! already-issued tokens before they expire.

use std::sync::Arc;

use axum::http::{header::AUTHORIZATION, request::Parts};
use axum::extract::FromRequestParts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{config::Config, error::AppError, models::Role, state::AppState};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub role: Role,
    pub exp: usize,
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    Ok(bcrypt::verify(password, hash)?)
}

pub fn issue_token(
    user_id: i64,
    email: &str,
    role: Role,
    config: &Config,
) -> Result<String, AppError> {
    let exp = (Utc::now() + Duration::minutes(config.token_ttl_minutes)).timestamp() as usize;
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        role,
        exp,
    };

    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?)
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(data.claims)
}

/// Authenticated caller, extracted from the `Authorization: Bearer` header.
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role != Role::Admin {
            return Err(AppError::Forbidden("Admin access required"));
        }

        Ok(())
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token =
            bearer_token(parts).ok_or(AppError::Unauthorized("Missing bearer token"))?;
        let claims = decode_token(token, &state.config.jwt_secret)?;

        Ok(AuthUser {
            id: claims.sub,
            email: claims.email,
            role: claims.role,
        })
    }
}

/// Optional variant for endpoints that only personalize when a valid token
/// is present. A bad token reads as anonymous rather than a 401.
pub struct MaybeUser(pub Option<AuthUser>);

impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = match bearer_token(parts) {
            Some(token) => decode_token(token, &state.config.jwt_secret)
                .ok()
                .map(|claims| AuthUser {
                    id: claims.sub,
                    email: claims.email,
                    role: claims.role,
                }),
            None => None,
        };

        Ok(MaybeUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            port: 0,
            database_url: String::new(),
            qdrant_url: String::new(),
            openai_endpoint: String::new(),
            openai_model: String::new(),
            embed_model: String::new(),
            embed_dimensions: 4,
            search_endpoint: String::new(),
            token_ttl_minutes: 30,
            jwt_secret: "test-secret".to_string(),
            openai_api_key: String::new(),
            search_api_key: String::new(),
        }
    }

    #[test]
    fn token_roundtrip_preserves_claims() {
        let config = test_config();
        let token = issue_token(7, "a@b.kz", Role::Admin, &config).unwrap();
        let claims = decode_token(&token, &config.jwt_secret).unwrap();

        assert_eq!(claims.sub, 7);
        assert_eq!(claims.email, "a@b.kz");
        assert_eq!(claims.role, Role::Admin);
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut config = test_config();
        config.token_ttl_minutes = -10;

        let token = issue_token(1, "a@b.kz", Role::User, &config).unwrap();
        assert!(decode_token(&token, &config.jwt_secret).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let config = test_config();
        let token = issue_token(1, "a@b.kz", Role::User, &config).unwrap();

        assert!(decode_token(&token, "other-secret").is_err());
    }

    #[test]
    fn non_admin_is_forbidden() {
        let user = AuthUser {
            id: 1,
            email: "a@b.kz".to_string(),
            role: Role::User,
        };
        assert!(matches!(
            user.require_admin(),
            Err(AppError::Forbidden(_))
        ));

        let admin = AuthUser {
            id: 2,
            email: "c@d.kz".to_string(),
            role: Role::Admin,
        };
        assert!(admin.require_admin().is_ok());
    }

    #[test]
    fn password_hash_verifies() {
        let hash = bcrypt::hash("s3cret", 4).unwrap();
        assert!(verify_password("s3cret", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }
}
