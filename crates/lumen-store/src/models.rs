//! Domain records as stored. Read paths that need referenced users or posts
//! resolved return the hydrated types from [`lumen_shared::views`] instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lumen_shared::types::{
    CommentId, MessageId, NotificationId, NotificationType, PostId, UserId,
};
use lumen_shared::views::{UserSummary, UserView};

use crate::error::{Result, StoreError};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    /// Unique display name.
    pub username: String,
    /// Argon2 PHC string. Never serialized.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
            bio: self.bio.clone(),
            created_at: self.created_at,
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// Fields accepted by a profile edit. `None` leaves the field untouched;
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub bio: Option<Option<String>>,
    pub avatar_url: Option<Option<String>>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Post
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub image_url: String,
    pub caption: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Which posts a listing should include.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostFilter {
    All,
    Author(UserId),
    /// Posts by the users `viewer` follows, plus the viewer's own.
    FollowedBy(UserId),
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: String,
    pub delivered: bool,
    pub seen: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// Notification type together with the reference it carries. A notification
/// points at a post, at a message, or at nothing; never both.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NotificationKind {
    Like { post_id: PostId },
    Comment { post_id: PostId },
    Follow,
    Message { message_id: MessageId },
}

impl NotificationKind {
    pub fn tag(&self) -> NotificationType {
        match self {
            Self::Like { .. } => NotificationType::Like,
            Self::Comment { .. } => NotificationType::Comment,
            Self::Follow => NotificationType::Follow,
            Self::Message { .. } => NotificationType::Message,
        }
    }

    pub fn post_id(&self) -> Option<PostId> {
        match self {
            Self::Like { post_id } | Self::Comment { post_id } => Some(*post_id),
            _ => None,
        }
    }

    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Self::Message { message_id } => Some(*message_id),
            _ => None,
        }
    }

    /// Rebuild from the stored columns, rejecting combinations the schema
    /// should never contain.
    pub fn from_columns(
        tag: &str,
        post_id: Option<PostId>,
        message_id: Option<MessageId>,
    ) -> Result<Self> {
        let kind = NotificationType::parse(tag)
            .ok_or_else(|| StoreError::InvalidInput(format!("unknown notification kind '{tag}'")))?;

        match (kind, post_id, message_id) {
            (NotificationType::Like, Some(post_id), None) => Ok(Self::Like { post_id }),
            (NotificationType::Comment, Some(post_id), None) => Ok(Self::Comment { post_id }),
            (NotificationType::Follow, None, None) => Ok(Self::Follow),
            (NotificationType::Message, None, Some(message_id)) => Ok(Self::Message { message_id }),
            _ => Err(StoreError::InvalidInput(format!(
                "inconsistent references for '{tag}' notification"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub receiver_id: UserId,
    pub sender_id: UserId,
    pub kind: NotificationKind,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
