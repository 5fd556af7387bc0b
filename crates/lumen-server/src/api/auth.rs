use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use lumen_shared::constants::{MAX_USERNAME_LENGTH, MIN_PASSWORD_LENGTH, MIN_USERNAME_LENGTH};
use lumen_shared::views::UserView;
use lumen_store::StoreError;

use super::AppState;
use crate::auth::{self as session, AuthUser};
use crate::error::ServerError;

#[derive(Deserialize)]
pub struct RegisterRequest {
    username: String,
    password: String,
    #[serde(default)]
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    token: String,
    user: UserView,
}

fn validate_username(username: &str) -> Result<&str, ServerError> {
    let username = username.trim();
    let len = username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&len) {
        return Err(ServerError::BadRequest(format!(
            "Username must be {MIN_USERNAME_LENGTH}-{MAX_USERNAME_LENGTH} characters"
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
    {
        return Err(ServerError::BadRequest(
            "Username may only contain letters, digits, '_' and '.'".into(),
        ));
    }
    Ok(username)
}

async fn hash_off_thread(password: String) -> Result<String, ServerError> {
    tokio::task::spawn_blocking(move || session::hash_password(&password))
        .await
        .map_err(|e| ServerError::Internal(format!("Hashing task failed: {e}")))?
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ServerError> {
    let username = validate_username(&req.username)?.to_string();
    if req.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ServerError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    let avatar_url = req
        .avatar_url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty());

    let password_hash = hash_off_thread(req.password).await?;

    let db = state.db.lock().await;
    let user = db
        .create_user(&username, &password_hash, avatar_url.as_deref())
        .map_err(|e| match e {
            StoreError::Conflict(_) => ServerError::Conflict("Username already taken".into()),
            other => other.into(),
        })?;
    let token = session::issue_session(&db, user.id)?;

    info!(user = %user.id.short(), username = %user.username, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: user.view(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ServerError> {
    let invalid = || ServerError::Unauthorized("Invalid username or password".into());

    let user = match state.db.lock().await.get_user_by_username(req.username.trim()) {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(invalid()),
        Err(e) => return Err(e.into()),
    };

    let hash = user.password_hash.clone();
    let password = req.password;
    let valid = tokio::task::spawn_blocking(move || session::verify_password(&password, &hash))
        .await
        .map_err(|e| ServerError::Internal(format!("Verification task failed: {e}")))?;
    if !valid {
        return Err(invalid());
    }

    let db = state.db.lock().await;
    let token = session::issue_session(&db, user.id)?;
    info!(user = %user.id.short(), "User logged in");

    Ok(Json(AuthResponse {
        token,
        user: user.view(),
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.db.lock().await.delete_session(&auth.token_hash)?;
    info!(user = %auth.user_id.short(), "User logged out");
    Ok(Json(serde_json::json!({ "success": true })))
}
