//! Notification records created as a side effect of social actions.

use rusqlite::params;
use rusqlite::types::Type;

use lumen_shared::types::{MessageId, NotificationId, PostId, UserId};
use lumen_shared::views::{NotificationView, PostRef};

use crate::database::Database;
use crate::error::{not_found, Result};
use crate::models::{Notification, NotificationKind};
use crate::row::{get_id, get_opt_id, get_ts, now, ts};
use crate::users::summary_at;

const NOTIFICATION_VIEW_SELECT: &str =
    "SELECT n.id, n.kind, n.post_id, n.message_id, n.is_read, n.created_at,
            s.id, s.username, s.avatar_url,
            p.image_url
     FROM notifications n
     JOIN users s ON s.id = n.sender_id
     LEFT JOIN posts p ON p.id = n.post_id";

impl Database {
    /// Record that `sender` did something to `receiver`.
    ///
    /// Self-actions never notify: returns `Ok(None)` when `sender == receiver`.
    pub fn create_notification(
        &self,
        receiver: UserId,
        sender: UserId,
        kind: NotificationKind,
    ) -> Result<Option<Notification>> {
        if receiver == sender {
            return Ok(None);
        }

        let notification = Notification {
            id: NotificationId::new(),
            receiver_id: receiver,
            sender_id: sender,
            kind,
            is_read: false,
            created_at: now(),
        };

        self.conn().execute(
            "INSERT INTO notifications
                 (id, receiver_id, sender_id, kind, post_id, message_id, is_read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
            params![
                notification.id.to_string(),
                receiver.to_string(),
                sender.to_string(),
                kind.tag().as_str(),
                kind.post_id().map(|id| id.to_string()),
                kind.message_id().map(|id| id.to_string()),
                ts(&notification.created_at),
            ],
        )?;

        Ok(Some(notification))
    }

    /// A notification with its sender and post image resolved.
    pub fn notification_view(&self, id: NotificationId) -> Result<NotificationView> {
        self.conn()
            .query_row(
                &format!("{NOTIFICATION_VIEW_SELECT} WHERE n.id = ?1"),
                params![id.to_string()],
                row_to_notification_view,
            )
            .map_err(not_found)
    }

    /// The newest `limit` notifications addressed to `receiver`.
    pub fn latest_notifications(
        &self,
        receiver: UserId,
        limit: u32,
    ) -> Result<Vec<NotificationView>> {
        let mut stmt = self.conn().prepare(&format!(
            "{NOTIFICATION_VIEW_SELECT}
             WHERE n.receiver_id = ?1
             ORDER BY n.created_at DESC, n.rowid DESC
             LIMIT ?2"
        ))?;

        let rows = stmt.query_map(
            params![receiver.to_string(), limit],
            row_to_notification_view,
        )?;

        let mut notifications = Vec::new();
        for row in rows {
            notifications.push(row?);
        }
        Ok(notifications)
    }

    pub fn unread_notification_count(&self, receiver: UserId) -> Result<u64> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM notifications WHERE receiver_id = ?1 AND is_read = 0",
            params![receiver.to_string()],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    /// Returns the number of notifications that changed.
    pub fn mark_all_notifications_read(&self, receiver: UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE notifications SET is_read = 1 WHERE receiver_id = ?1 AND is_read = 0",
            params![receiver.to_string()],
        )?;
        Ok(affected)
    }
}

fn row_to_notification_view(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationView> {
    let tag: String = row.get(1)?;
    let post_id: Option<PostId> = get_opt_id(row, 2)?;
    let message_id: Option<MessageId> = get_opt_id(row, 3)?;
    let kind = NotificationKind::from_columns(&tag, post_id, message_id)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

    let image_url: Option<String> = row.get(9)?;
    let post = match (kind.post_id(), image_url) {
        (Some(id), Some(image_url)) => Some(PostRef { id, image_url }),
        _ => None,
    };

    Ok(NotificationView {
        id: get_id(row, 0)?,
        kind: kind.tag(),
        sender: summary_at(row, 6)?,
        post,
        message_id: kind.message_id(),
        is_read: row.get(4)?,
        created_at: get_ts(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_shared::types::NotificationType;

    fn setup() -> (Database, UserId, UserId) {
        let db = Database::open_in_memory().unwrap();
        let alice = db
            .create_user("alice", "h", Some("https://img/alice.png"))
            .unwrap()
            .id;
        let bob = db.create_user("bob", "h", None).unwrap().id;
        (db, alice, bob)
    }

    #[test]
    fn self_action_creates_nothing() {
        let (db, alice, _) = setup();
        let created = db
            .create_notification(alice, alice, NotificationKind::Follow)
            .unwrap();
        assert!(created.is_none());
        assert!(db.latest_notifications(alice, 50).unwrap().is_empty());
    }

    #[test]
    fn follow_notification_is_hydrated_with_sender() {
        let (db, alice, bob) = setup();
        let n = db
            .create_notification(bob, alice, NotificationKind::Follow)
            .unwrap()
            .unwrap();

        let view = db.notification_view(n.id).unwrap();
        assert_eq!(view.kind, NotificationType::Follow);
        assert_eq!(view.sender.username, "alice");
        assert_eq!(view.sender.avatar_url.as_deref(), Some("https://img/alice.png"));
        assert!(view.post.is_none());
        assert!(view.message_id.is_none());
        assert!(!view.is_read);
    }

    #[test]
    fn like_notification_carries_post_image() {
        let (db, alice, bob) = setup();
        let post = db.create_post(bob, "https://img/p.jpg", "").unwrap();
        let n = db
            .create_notification(bob, alice, NotificationKind::Like { post_id: post.id })
            .unwrap()
            .unwrap();

        let view = db.notification_view(n.id).unwrap();
        assert_eq!(view.kind, NotificationType::Like);
        assert_eq!(
            view.post,
            Some(PostRef {
                id: post.id,
                image_url: "https://img/p.jpg".into()
            })
        );
    }

    #[test]
    fn message_notification_references_message_only() {
        let (db, alice, bob) = setup();
        let msg = db.insert_message(alice, bob, "hey", false).unwrap();
        let n = db
            .create_notification(bob, alice, NotificationKind::Message { message_id: msg.id })
            .unwrap()
            .unwrap();

        let view = db.notification_view(n.id).unwrap();
        assert_eq!(view.message_id, Some(msg.id));
        assert!(view.post.is_none());
    }

    #[test]
    fn schema_rejects_both_references() {
        let (db, alice, bob) = setup();
        let post = db.create_post(bob, "p.jpg", "").unwrap();
        let msg = db.insert_message(alice, bob, "hey", false).unwrap();

        let result = db.conn().execute(
            "INSERT INTO notifications
                 (id, receiver_id, sender_id, kind, post_id, message_id, is_read, created_at)
             VALUES (?1, ?2, ?3, 'like', ?4, ?5, 0, ?6)",
            params![
                NotificationId::new().to_string(),
                bob.to_string(),
                alice.to_string(),
                post.id.to_string(),
                msg.id.to_string(),
                ts(&now()),
            ],
        );
        assert!(result.is_err());
    }

    #[test]
    fn latest_is_newest_first_capped_and_mark_read() {
        let (db, alice, bob) = setup();
        let post = db.create_post(bob, "p.jpg", "").unwrap();

        db.create_notification(bob, alice, NotificationKind::Follow).unwrap();
        db.create_notification(bob, alice, NotificationKind::Like { post_id: post.id })
            .unwrap();
        db.create_notification(bob, alice, NotificationKind::Comment { post_id: post.id })
            .unwrap();

        let latest = db.latest_notifications(bob, 2).unwrap();
        let kinds: Vec<_> = latest.iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NotificationType::Comment, NotificationType::Like]);

        assert_eq!(db.unread_notification_count(bob).unwrap(), 3);
        assert_eq!(db.mark_all_notifications_read(bob).unwrap(), 3);
        assert_eq!(db.unread_notification_count(bob).unwrap(), 0);
        assert!(db
            .latest_notifications(bob, 50)
            .unwrap()
            .iter()
            .all(|n| n.is_read));
    }
}
