use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use lumen_shared::types::UserId;
use lumen_shared::views::MessageView;

use super::{parse_id, AppState};
use crate::auth::AuthUser;
use crate::error::ServerError;

#[derive(Deserialize)]
pub struct SendRequest {
    receiver_id: String,
    text: String,
}

#[derive(Serialize)]
pub struct Conversation {
    messages: Vec<MessageView>,
}

#[derive(Serialize)]
pub struct Sent {
    message: MessageView,
}

#[derive(Serialize)]
pub struct SeenResponse {
    success: bool,
    updated: usize,
}

pub async fn conversation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(raw_id): Path<String>,
) -> Result<Json<Conversation>, ServerError> {
    let other: UserId = parse_id(&raw_id, "user")?;
    let messages = state.db.lock().await.conversation(auth.user_id, other)?;
    Ok(Json(Conversation { messages }))
}

/// Same delivery path as a websocket `send-message`, minus the echo: the
/// sender gets the message back in the response instead.
pub async fn send(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<SendRequest>,
) -> Result<Json<Sent>, ServerError> {
    let receiver: UserId = parse_id(&req.receiver_id, "receiver")?;
    let message = state
        .fanout
        .send_message(auth.user_id, receiver, &req.text, None)
        .await?;
    Ok(Json(Sent { message }))
}

pub async fn mark_seen(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(raw_id): Path<String>,
) -> Result<Json<SeenResponse>, ServerError> {
    let sender: UserId = parse_id(&raw_id, "user")?;
    let updated = state.fanout.mark_seen(sender, auth.user_id).await?;
    Ok(Json(SeenResponse {
        success: true,
        updated,
    }))
}
