use axum::{extract::State, Json};
use serde::Serialize;

use lumen_shared::constants::NOTIFICATION_LIMIT;
use lumen_shared::views::NotificationView;

use super::AppState;
use crate::auth::AuthUser;
use crate::error::ServerError;

#[derive(Serialize)]
pub struct NotificationList {
    notifications: Vec<NotificationView>,
    unread: u64,
}

#[derive(Serialize)]
pub struct MarkReadResponse {
    success: bool,
    updated: usize,
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<NotificationList>, ServerError> {
    let db = state.db.lock().await;
    Ok(Json(NotificationList {
        notifications: db.latest_notifications(auth.user_id, NOTIFICATION_LIMIT)?,
        unread: db.unread_notification_count(auth.user_id)?,
    }))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<MarkReadResponse>, ServerError> {
    let updated = state
        .db
        .lock()
        .await
        .mark_all_notifications_read(auth.user_id)?;
    Ok(Json(MarkReadResponse {
        success: true,
        updated,
    }))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::TestApp;
    use serde_json::json;

    #[tokio::test]
    async fn test_mark_all_read() {
        let app = TestApp::new().await;
        let (alice, alice_id) = app.register("alice").await;
        let (bob, _) = app.register("bob").await;

        app.post(&format!("/api/users/{alice_id}/follow"), &bob, json!({}))
            .await;

        let (_, body) = app.get("/api/notifications", &alice).await;
        assert_eq!(body["unread"], 1);
        assert_eq!(body["notifications"][0]["type"], "follow");
        assert_eq!(body["notifications"][0]["is_read"], false);
        assert!(body["notifications"][0]["post"].is_null());

        let (_, body) = app
            .post("/api/notifications/mark-all-read", &alice, json!({}))
            .await;
        assert_eq!(body, json!({ "success": true, "updated": 1 }));

        let (_, body) = app.get("/api/notifications", &alice).await;
        assert_eq!(body["unread"], 0);
        assert_eq!(body["notifications"][0]["is_read"], true);
    }
}
