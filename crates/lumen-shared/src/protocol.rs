//! Websocket wire protocol.
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<kebab-case name>", "data": <payload>}`.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::UserId;
use crate::views::{MessageView, NotificationView};

/// Events a client may send over its connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Announce the connection's identity and go online.
    Join { user_id: UserId },

    /// Send a direct message to another user.
    SendMessage { receiver_id: UserId, text: String },

    Typing { receiver_id: UserId },

    StopTyping { receiver_id: UserId },

    /// Mark every unseen message from `sender_id` to this user as seen.
    MarkSeen { sender_id: UserId },

    /// Opaque echoes rebroadcast to every other connection.
    NewPost(serde_json::Value),
    PostLiked(serde_json::Value),
    PostCommented(serde_json::Value),
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    UserOnline { user_id: UserId },

    UserOffline { user_id: UserId },

    ReceiveMessage(MessageView),

    Typing { sender_id: UserId },

    StopTyping { sender_id: UserId },

    /// `reader_id` has read the messages the recipient sent them.
    MessagesSeen { reader_id: UserId },

    Notify(NotificationView),

    NewPost(serde_json::Value),
    PostLiked(serde_json::Value),
    PostCommented(serde_json::Value),
}

impl ClientEvent {
    pub fn from_text(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::from)
    }

    pub fn to_text(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::from)
    }

    /// Short name used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::SendMessage { .. } => "send-message",
            Self::Typing { .. } => "typing",
            Self::StopTyping { .. } => "stop-typing",
            Self::MarkSeen { .. } => "mark-seen",
            Self::NewPost(_) => "new-post",
            Self::PostLiked(_) => "post-liked",
            Self::PostCommented(_) => "post-commented",
        }
    }
}

impl ServerEvent {
    pub fn from_text(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::from)
    }

    pub fn to_text(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::from)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::UserOnline { .. } => "user-online",
            Self::UserOffline { .. } => "user-offline",
            Self::ReceiveMessage(_) => "receive-message",
            Self::Typing { .. } => "typing",
            Self::StopTyping { .. } => "stop-typing",
            Self::MessagesSeen { .. } => "messages-seen",
            Self::Notify(_) => "notify",
            Self::NewPost(_) => "new-post",
            Self::PostLiked(_) => "post-liked",
            Self::PostCommented(_) => "post-commented",
        }
    }
}
