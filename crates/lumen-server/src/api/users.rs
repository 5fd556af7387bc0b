use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use lumen_shared::constants::MAX_BIO_LENGTH;
use lumen_shared::types::UserId;
use lumen_shared::views::{ProfileView, UserSummary, UserView};
use lumen_store::{NotificationKind, ProfileUpdate, StoreError};

use super::{parse_id, AppState};
use crate::auth::AuthUser;
use crate::error::ServerError;

#[derive(Serialize)]
pub struct UserList {
    users: Vec<UserSummary>,
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

#[derive(Serialize)]
pub struct FollowResponse {
    success: bool,
    following: bool,
}

/// A present field replaces the stored value; blank clears it.
fn replacement(value: Option<String>) -> Option<Option<String>> {
    value.map(|v| {
        let v = v.trim().to_string();
        (!v.is_empty()).then_some(v)
    })
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<UserList>, ServerError> {
    let users = state.db.lock().await.list_users_except(auth.user_id)?;
    Ok(Json(UserList { users }))
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ProfileView>, ServerError> {
    let db = state.db.lock().await;
    let user = db.get_user(auth.user_id)?;
    Ok(Json(db.profile_view(auth.user_id, &user)?))
}

pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserView>, ServerError> {
    let update = ProfileUpdate {
        bio: replacement(req.bio),
        avatar_url: replacement(req.avatar_url),
    };
    if let Some(Some(bio)) = &update.bio {
        if bio.chars().count() > MAX_BIO_LENGTH {
            return Err(ServerError::BadRequest(format!(
                "Bio exceeds {MAX_BIO_LENGTH} characters"
            )));
        }
    }

    let user = state.db.lock().await.update_profile(auth.user_id, &update)?;
    info!(user = %user.id.short(), "Profile updated");
    Ok(Json(user.view()))
}

pub async fn profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(username): Path<String>,
) -> Result<Json<ProfileView>, ServerError> {
    let db = state.db.lock().await;
    let user = db.get_user_by_username(&username).map_err(|e| match e {
        StoreError::NotFound => ServerError::NotFound("User not found".into()),
        other => other.into(),
    })?;
    Ok(Json(db.profile_view(auth.user_id, &user)?))
}

pub async fn toggle_follow(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(raw_id): Path<String>,
) -> Result<Json<FollowResponse>, ServerError> {
    let target: UserId = parse_id(&raw_id, "user")?;
    if target == auth.user_id {
        return Err(ServerError::BadRequest("Cannot follow yourself".into()));
    }

    let following = state
        .db
        .lock()
        .await
        .toggle_follow(auth.user_id, target)
        .map_err(|e| match e {
            StoreError::NotFound => ServerError::NotFound("User not found".into()),
            other => other.into(),
        })?;

    if following {
        state
            .fanout
            .notify(target, auth.user_id, NotificationKind::Follow)
            .await;
    }

    Ok(Json(FollowResponse {
        success: true,
        following,
    }))
}

async fn ensure_user(state: &AppState, raw_id: &str) -> Result<UserId, ServerError> {
    let id: UserId = parse_id(raw_id, "user")?;
    if !state.db.lock().await.user_exists(id)? {
        return Err(ServerError::NotFound("User not found".into()));
    }
    Ok(id)
}

pub async fn followers(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(raw_id): Path<String>,
) -> Result<Json<UserList>, ServerError> {
    let id = ensure_user(&state, &raw_id).await?;
    let users = state.db.lock().await.followers(id)?;
    Ok(Json(UserList { users }))
}

pub async fn following(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(raw_id): Path<String>,
) -> Result<Json<UserList>, ServerError> {
    let id = ensure_user(&state, &raw_id).await?;
    let users = state.db.lock().await.following(id)?;
    Ok(Json(UserList { users }))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::TestApp;
    use axum::http::{Method, StatusCode};
    use lumen_shared::protocol::ServerEvent;
    use serde_json::json;

    use crate::presence::ConnectionHandle;

    #[tokio::test]
    async fn test_follow_round_trip_and_notification() {
        let app = TestApp::new().await;
        let (alice, alice_id) = app.register("alice").await;
        let (bob, bob_id) = app.register("bob").await;

        let (bob_conn, mut bob_rx) = ConnectionHandle::channel();
        app.state
            .fanout
            .join(bob_id.parse().unwrap(), bob_conn)
            .await;

        let (status, body) = app
            .post(&format!("/api/users/{bob_id}/follow"), &alice, json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true, "following": true }));

        match bob_rx.try_recv().unwrap() {
            ServerEvent::Notify(n) => assert_eq!(n.sender.username, "alice"),
            other => panic!("unexpected event: {other:?}"),
        }

        let (_, followers) = app.get(&format!("/api/users/{bob_id}/followers"), &bob).await;
        assert_eq!(followers["users"][0]["id"], alice_id.as_str());
        let (_, following) = app
            .get(&format!("/api/users/{alice_id}/following"), &alice)
            .await;
        assert_eq!(following["users"][0]["username"], "bob");

        let (_, profile) = app.get("/api/users/bob", &alice).await;
        assert_eq!(profile["followers_count"], 1);
        assert_eq!(profile["is_following"], true);
        assert_eq!(profile["is_me"], false);

        // Unfollow restores both sides and notifies nobody.
        let (_, body) = app
            .post(&format!("/api/users/{bob_id}/follow"), &alice, json!({}))
            .await;
        assert_eq!(body["following"], false);
        assert!(bob_rx.try_recv().is_err());

        let (_, followers) = app.get(&format!("/api/users/{bob_id}/followers"), &bob).await;
        assert_eq!(followers["users"], json!([]));
        let (_, following) = app
            .get(&format!("/api/users/{alice_id}/following"), &alice)
            .await;
        assert_eq!(following["users"], json!([]));
    }

    #[tokio::test]
    async fn test_follow_errors() {
        let app = TestApp::new().await;
        let (alice, alice_id) = app.register("alice").await;

        let (status, _) = app
            .post(&format!("/api/users/{alice_id}/follow"), &alice, json!({}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let missing = uuid::Uuid::new_v4();
        let (status, _) = app
            .post(&format!("/api/users/{missing}/follow"), &alice, json!({}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app
            .post("/api/users/not-a-uuid/follow", &alice, json!({}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_user_listing_and_profile_edit() {
        let app = TestApp::new().await;
        let (alice, _) = app.register("alice").await;
        app.register("bob").await;
        app.register("carol").await;

        let (_, body) = app.get("/api/users", &alice).await;
        let names: Vec<_> = body["users"]
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["username"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["bob", "carol"]);

        let (status, user) = app
            .request(
                Method::PATCH,
                "/api/users/me",
                Some(&alice),
                Some(json!({ "bio": "hello", "avatar_url": "https://img/a.png" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user["bio"], "hello");

        let (_, user) = app
            .request(
                Method::PATCH,
                "/api/users/me",
                Some(&alice),
                Some(json!({ "bio": "" })),
            )
            .await;
        assert!(user["bio"].is_null());
        assert_eq!(user["avatar_url"], "https://img/a.png");

        let (status, _) = app.get("/api/users/nobody", &alice).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
