//! Password hashing and bearer-session authentication.
//!
//! Session tokens are 32 random bytes, hex encoded, handed to the client once.
//! Only their BLAKE3 hash is stored, so a leaked database cannot be replayed.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::extract::{FromRequestParts, Query};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Deserialize;
use tracing::debug;

use lumen_shared::types::UserId;
use lumen_store::Database;

use crate::api::AppState;
use crate::error::ServerError;

pub fn hash_password(password: &str) -> Result<String, ServerError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServerError::Internal(format!("Failed to hash password: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// The form in which a token is stored and looked up.
pub fn token_hash(token: &str) -> String {
    blake3::hash(token.as_bytes()).to_hex().to_string()
}

/// Create a session for `user` and return the bearer token.
pub fn issue_session(db: &Database, user: UserId) -> Result<String, ServerError> {
    let token = generate_token();
    db.create_session(&token_hash(&token), user)?;
    debug!(user = %user.short(), "Issued session");
    Ok(token)
}

/// Sessions created before the returned instant have expired. `None` when
/// the lifetime reaches past the representable range, so nothing expires.
pub fn session_cutoff(now: DateTime<Utc>, ttl_hours: i64) -> Option<DateTime<Utc>> {
    Duration::try_hours(ttl_hours).and_then(|ttl| now.checked_sub_signed(ttl))
}

/// Resolve a bearer token to its user, rejecting unknown and expired sessions.
/// Expired sessions are deleted on sight.
pub fn authenticate(db: &Database, token: &str, ttl_hours: i64) -> Result<AuthUser, ServerError> {
    let hash = token_hash(token);
    let session = db
        .get_session(&hash)?
        .ok_or_else(|| ServerError::Unauthorized("Invalid session".into()))?;

    if session_cutoff(Utc::now(), ttl_hours).is_some_and(|cutoff| session.created_at < cutoff) {
        db.delete_session(&hash)?;
        return Err(ServerError::Unauthorized("Session expired".into()));
    }

    Ok(AuthUser {
        user_id: session.user_id,
        token_hash: hash,
    })
}

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: UserId,
    pub token_hash: String,
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// `Authorization: Bearer <token>`, or `?token=` for websocket upgrades where
/// browsers cannot set headers.
fn presented_token(parts: &Parts) -> Option<String> {
    if let Some(value) = parts.headers.get(AUTHORIZATION) {
        let value = value.to_str().ok()?;
        return value
            .strip_prefix("Bearer ")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
    }

    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = presented_token(parts)
            .ok_or_else(|| ServerError::Unauthorized("Missing bearer token".into()))?;

        let db = state.db.lock().await;
        authenticate(&db, &token, state.config.session_ttl_hours)
    }
}
