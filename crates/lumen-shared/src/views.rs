//! Hydrated payloads shared by the REST API and the websocket channel.
//!
//! These are read models: references to other entities are already resolved
//! into the small summaries a client needs to render them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CommentId, MessageId, NotificationId, NotificationType, PostId, UserId};

/// The minimal public face of a user, embedded wherever a user is referenced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// Public user record. The password hash never leaves the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserView {
    pub id: UserId,
    pub username: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserView {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// Profile page data: the user plus social counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileView {
    pub user: UserView,
    pub post_count: u64,
    pub followers_count: u64,
    pub following_count: u64,
    /// Whether the viewer is looking at their own profile.
    pub is_me: bool,
    /// Whether the viewer follows this user.
    pub is_following: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommentView {
    pub id: CommentId,
    pub author: UserSummary,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostView {
    pub id: PostId,
    pub author: UserSummary,
    pub image_url: String,
    pub caption: String,
    /// Identities of everyone who currently likes the post, no duplicates.
    pub likes: Vec<UserId>,
    /// Oldest first.
    pub comments: Vec<CommentView>,
    pub created_at: DateTime<Utc>,
}

impl PostView {
    pub fn is_liked_by(&self, user: &UserId) -> bool {
        self.likes.contains(user)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageView {
    pub id: MessageId,
    pub sender: UserSummary,
    pub receiver: UserSummary,
    pub text: String,
    /// The receiver had a live connection when the message was stored.
    pub delivered: bool,
    /// The receiver has marked the conversation as read.
    pub seen: bool,
    pub created_at: DateTime<Utc>,
}

/// Post reference carried by `like` and `comment` notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostRef {
    pub id: PostId,
    pub image_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationView {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub sender: UserSummary,
    pub post: Option<PostRef>,
    pub message_id: Option<MessageId>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResults {
    pub users: Vec<UserSummary>,
    pub posts: Vec<PostView>,
}
