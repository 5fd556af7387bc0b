//! Event fan-out: turn a social action into stored records and best-effort
//! pushes to whichever connections care about it.
//!
//! Directed events (notifications, messages, typing) go through the target's
//! [`ConnectionHandle`]. Events for everyone (presence changes, post echoes)
//! go through a single broadcast channel that every connection task
//! subscribes to. Pushes never fail the action that triggered them.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use lumen_shared::constants::{BROADCAST_CAPACITY, MAX_MESSAGE_LENGTH};
use lumen_shared::protocol::ServerEvent;
use lumen_shared::types::{ConnId, UserId};
use lumen_shared::views::{MessageView, NotificationView};
use lumen_store::{Database, NotificationKind};

use crate::error::ServerError;
use crate::presence::{ConnectionHandle, PresenceRegistry};

pub type SharedDb = Arc<Mutex<Database>>;

/// A server-wide event. `origin` is skipped when echoing.
#[derive(Debug, Clone)]
pub struct Broadcast {
    pub origin: Option<ConnId>,
    pub event: ServerEvent,
}

impl Broadcast {
    /// Whether connection `conn` should receive this event.
    pub fn reaches(&self, conn: ConnId) -> bool {
        self.origin != Some(conn)
    }
}

#[derive(Clone)]
pub struct Fanout {
    db: SharedDb,
    presence: PresenceRegistry,
    broadcast: broadcast::Sender<Broadcast>,
}

impl Fanout {
    pub fn new(db: SharedDb, presence: PresenceRegistry) -> Self {
        let (broadcast, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            db,
            presence,
            broadcast,
        }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Broadcast> {
        self.broadcast.subscribe()
    }

    // ---- Presence ----

    /// Register `user` on `handle` and announce it. The joining connection
    /// is first told who else is already online.
    pub async fn join(&self, user: UserId, handle: ConnectionHandle) {
        for user_id in self.presence.online_users().await {
            if user_id != user {
                handle.push(ServerEvent::UserOnline { user_id });
            }
        }

        self.presence.register(user, handle).await;
        self.publish(None, ServerEvent::UserOnline { user_id: user });
    }

    /// Drop the connection from the registry, announcing the user offline if
    /// it was their current connection.
    pub async fn leave(&self, conn: ConnId) -> Option<UserId> {
        let user = self.presence.unregister(conn).await?;
        self.publish(None, ServerEvent::UserOffline { user_id: user });
        Some(user)
    }

    /// Forward an opaque post echo to every connection except its origin.
    pub fn rebroadcast(&self, origin: ConnId, event: ServerEvent) {
        self.publish(Some(origin), event);
    }

    fn publish(&self, origin: Option<ConnId>, event: ServerEvent) {
        let name = event.name();
        // Err only means nobody is subscribed.
        if self.broadcast.send(Broadcast { origin, event }).is_err() {
            debug!(event = name, "No connections to broadcast to");
        }
    }

    // ---- Directed pushes ----

    /// Push to `user` if they have a live connection.
    pub async fn push_to(&self, user: UserId, event: ServerEvent) -> bool {
        match self.presence.lookup(user).await {
            Some(handle) => {
                debug!(target_user = %user.short(), event = event.name(), "Pushing event");
                handle.push(event)
            }
            None => false,
        }
    }

    /// Record a notification for `receiver` and push it if they are online.
    /// Self-actions produce nothing. A failure here is logged and never
    /// reaches the action that triggered it.
    pub async fn notify(
        &self,
        receiver: UserId,
        sender: UserId,
        kind: NotificationKind,
    ) -> Option<NotificationView> {
        let view = {
            let db = self.db.lock().await;
            record_notification(&db, receiver, sender, kind)?
        };

        self.push_to(receiver, ServerEvent::Notify(view.clone())).await;
        Some(view)
    }

    // ---- Direct messages ----

    /// Store a direct message and deliver it.
    ///
    /// The message is `delivered` iff the receiver had a live connection when
    /// it was stored. `echo` is the sender's own connection when the message
    /// arrived over a websocket.
    pub async fn send_message(
        &self,
        sender: UserId,
        receiver: UserId,
        text: &str,
        echo: Option<&ConnectionHandle>,
    ) -> Result<MessageView, ServerError> {
        let text = check_message_text(text)?;
        if sender == receiver {
            return Err(ServerError::BadRequest("Cannot message yourself".into()));
        }

        let target = self.presence.lookup(receiver).await;

        let (message, notification) = {
            let db = self.db.lock().await;
            if !db.user_exists(receiver)? {
                return Err(ServerError::NotFound("Receiver not found".into()));
            }

            let stored = db.insert_message(sender, receiver, text, target.is_some())?;
            let message = db.message_view(stored.id)?;
            let notification = record_notification(
                &db,
                receiver,
                sender,
                NotificationKind::Message {
                    message_id: stored.id,
                },
            );
            (message, notification)
        };

        debug!(
            message = %message.id.short(),
            delivered = message.delivered,
            "Stored direct message"
        );

        if let Some(handle) = &target {
            handle.push(ServerEvent::ReceiveMessage(message.clone()));
            if let Some(view) = notification {
                handle.push(ServerEvent::Notify(view));
            }
        }
        if let Some(own) = echo {
            own.push(ServerEvent::ReceiveMessage(message.clone()));
        }

        Ok(message)
    }

    /// Mark everything `sender` sent to `reader` as seen and tell the sender.
    /// Reading your own messages is a no-op.
    pub async fn mark_seen(&self, sender: UserId, reader: UserId) -> Result<usize, ServerError> {
        if sender == reader {
            debug!(user = %reader.short(), "Ignoring mark-seen of own messages");
            return Ok(0);
        }
        let updated = self.db.lock().await.mark_seen(sender, reader)?;
        self.push_to(sender, ServerEvent::MessagesSeen { reader_id: reader })
            .await;
        Ok(updated)
    }

    // ---- Typing ----

    pub async fn typing(&self, sender: UserId, receiver: UserId) {
        self.push_to(receiver, ServerEvent::Typing { sender_id: sender })
            .await;
    }

    pub async fn stop_typing(&self, sender: UserId, receiver: UserId) {
        self.push_to(receiver, ServerEvent::StopTyping { sender_id: sender })
            .await;
    }
}

/// Store and hydrate a notification. Errors are logged and swallowed.
fn record_notification(
    db: &Database,
    receiver: UserId,
    sender: UserId,
    kind: NotificationKind,
) -> Option<NotificationView> {
    let created = db
        .create_notification(receiver, sender, kind)
        .and_then(|created| created.map(|n| db.notification_view(n.id)).transpose());

    match created {
        Ok(view) => view,
        Err(e) => {
            warn!(
                receiver = %receiver.short(),
                kind = %kind.tag(),
                error = %e,
                "Failed to record notification"
            );
            None
        }
    }
}

/// Trimmed message text, rejected when empty or too long.
pub fn check_message_text(text: &str) -> Result<&str, ServerError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ServerError::BadRequest("Message text is required".into()));
    }
    if text.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(ServerError::BadRequest(format!(
            "Message exceeds {MAX_MESSAGE_LENGTH} characters"
        )));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_shared::types::NotificationType;
    use tokio::sync::mpsc;

    struct Fixture {
        fanout: Fanout,
        db: SharedDb,
        alice: UserId,
        bob: UserId,
    }

    async fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let alice = db
            .create_user("alice", "h", Some("https://img/alice.png"))
            .unwrap()
            .id;
        let bob = db.create_user("bob", "h", None).unwrap().id;
        let db = Arc::new(Mutex::new(db));
        let fanout = Fanout::new(db.clone(), PresenceRegistry::new());
        Fixture {
            fanout,
            db,
            alice,
            bob,
        }
    }

    async fn connect(fanout: &Fanout, user: UserId) -> (ConnectionHandle, mpsc::Receiver<ServerEvent>) {
        let (handle, rx) = ConnectionHandle::channel();
        fanout.join(user, handle.clone()).await;
        (handle, rx)
    }

    #[tokio::test]
    async fn test_follow_notification_pushed_to_online_target() {
        let f = fixture().await;
        let (_bob_conn, mut bob_rx) = connect(&f.fanout, f.bob).await;

        f.db.lock().await.toggle_follow(f.alice, f.bob).unwrap();
        let view = f
            .fanout
            .notify(f.bob, f.alice, NotificationKind::Follow)
            .await
            .unwrap();
        assert_eq!(view.kind, NotificationType::Follow);

        match bob_rx.try_recv().unwrap() {
            ServerEvent::Notify(pushed) => {
                assert_eq!(pushed.sender.id, f.alice);
                assert_eq!(pushed.sender.username, "alice");
                assert_eq!(
                    pushed.sender.avatar_url.as_deref(),
                    Some("https://img/alice.png")
                );
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let stored = f.db.lock().await.latest_notifications(f.bob, 50).unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_self_action_notifies_nobody() {
        let f = fixture().await;
        let (_conn, mut rx) = connect(&f.fanout, f.alice).await;

        let created = f
            .fanout
            .notify(f.alice, f.alice, NotificationKind::Follow)
            .await;
        assert!(created.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_message_to_offline_user() {
        let f = fixture().await;
        let (alice_conn, mut alice_rx) = connect(&f.fanout, f.alice).await;

        let message = f
            .fanout
            .send_message(f.alice, f.bob, "hey", Some(&alice_conn))
            .await
            .unwrap();
        assert!(!message.delivered);
        assert!(!message.seen);

        // Sender still gets its own echo.
        assert!(matches!(
            alice_rx.try_recv().unwrap(),
            ServerEvent::ReceiveMessage(_)
        ));

        let notifications = f.db.lock().await.latest_notifications(f.bob, 50).unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationType::Message);
        assert_eq!(notifications[0].message_id, Some(message.id));
    }

    #[tokio::test]
    async fn test_message_to_online_user() {
        let f = fixture().await;
        let (_bob_conn, mut bob_rx) = connect(&f.fanout, f.bob).await;

        let message = f
            .fanout
            .send_message(f.alice, f.bob, "  hi bob  ", None)
            .await
            .unwrap();
        assert!(message.delivered);
        assert_eq!(message.text, "hi bob");

        match bob_rx.try_recv().unwrap() {
            ServerEvent::ReceiveMessage(received) => assert_eq!(received.id, message.id),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(bob_rx.try_recv().unwrap(), ServerEvent::Notify(_)));
    }

    #[tokio::test]
    async fn test_message_validation() {
        let f = fixture().await;

        assert!(matches!(
            f.fanout.send_message(f.alice, f.bob, "   ", None).await,
            Err(ServerError::BadRequest(_))
        ));
        assert!(matches!(
            f.fanout.send_message(f.alice, f.alice, "me", None).await,
            Err(ServerError::BadRequest(_))
        ));
        assert!(matches!(
            f.fanout.send_message(f.alice, UserId::new(), "hi", None).await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_seen_notifies_sender() {
        let f = fixture().await;
        f.fanout.send_message(f.alice, f.bob, "one", None).await.unwrap();
        let (_alice_conn, mut alice_rx) = connect(&f.fanout, f.alice).await;

        assert_eq!(f.fanout.mark_seen(f.alice, f.bob).await.unwrap(), 1);
        assert_eq!(
            alice_rx.try_recv().unwrap(),
            ServerEvent::MessagesSeen { reader_id: f.bob }
        );

        let conversation = f.db.lock().await.conversation(f.alice, f.bob).unwrap();
        assert!(conversation.iter().all(|m| m.seen && m.delivered));
    }

    #[tokio::test]
    async fn test_mark_seen_of_own_messages_is_ignored() {
        let f = fixture().await;
        let (_alice_conn, mut alice_rx) = connect(&f.fanout, f.alice).await;

        assert_eq!(f.fanout.mark_seen(f.alice, f.alice).await.unwrap(), 0);
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_notification_failure_is_swallowed() {
        let f = fixture().await;
        let (_bob_conn, mut bob_rx) = connect(&f.fanout, f.bob).await;

        // Dangling post reference violates the foreign key.
        let dangling = NotificationKind::Like {
            post_id: lumen_shared::types::PostId::new(),
        };
        assert!(f.fanout.notify(f.bob, f.alice, dangling).await.is_none());
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_message_stored_when_notification_fails() {
        let f = fixture().await;
        f.db
            .lock()
            .await
            .conn()
            .execute_batch("DROP TABLE notifications")
            .unwrap();
        let (_bob_conn, mut bob_rx) = connect(&f.fanout, f.bob).await;

        let message = f
            .fanout
            .send_message(f.alice, f.bob, "still here", None)
            .await
            .unwrap();
        assert!(message.delivered);
        assert!(matches!(
            bob_rx.try_recv().unwrap(),
            ServerEvent::ReceiveMessage(_)
        ));
        assert!(bob_rx.try_recv().is_err());

        let conversation = f.db.lock().await.conversation(f.alice, f.bob).unwrap();
        assert_eq!(conversation.len(), 1);
    }

    #[tokio::test]
    async fn test_presence_broadcasts() {
        let f = fixture().await;
        let mut events = f.fanout.subscribe();

        let (conn, _rx) = connect(&f.fanout, f.alice).await;
        let online = events.recv().await.unwrap();
        assert_eq!(online.event, ServerEvent::UserOnline { user_id: f.alice });

        assert_eq!(f.fanout.leave(conn.id).await, Some(f.alice));
        let offline = events.recv().await.unwrap();
        assert_eq!(offline.event, ServerEvent::UserOffline { user_id: f.alice });

        // Leaving twice announces nothing.
        assert_eq!(f.fanout.leave(conn.id).await, None);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_typing_forwarded_only_when_online() {
        let f = fixture().await;
        f.fanout.typing(f.alice, f.bob).await;

        let (_bob_conn, mut bob_rx) = connect(&f.fanout, f.bob).await;
        f.fanout.typing(f.alice, f.bob).await;
        f.fanout.stop_typing(f.alice, f.bob).await;

        assert_eq!(
            bob_rx.try_recv().unwrap(),
            ServerEvent::Typing { sender_id: f.alice }
        );
        assert_eq!(
            bob_rx.try_recv().unwrap(),
            ServerEvent::StopTyping { sender_id: f.alice }
        );
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_join_lists_users_already_online() {
        let f = fixture().await;
        let (_alice_conn, mut alice_rx) = connect(&f.fanout, f.alice).await;
        assert!(alice_rx.try_recv().is_err());

        let (_bob_conn, mut bob_rx) = connect(&f.fanout, f.bob).await;
        assert_eq!(
            bob_rx.try_recv().unwrap(),
            ServerEvent::UserOnline { user_id: f.alice }
        );
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rebroadcast_carries_origin() {
        let f = fixture().await;
        let mut events = f.fanout.subscribe();
        let origin = ConnId::new();

        f.fanout
            .rebroadcast(origin, ServerEvent::NewPost(serde_json::json!({ "id": 1 })));
        let received = events.recv().await.unwrap();
        assert_eq!(received.origin, Some(origin));
    }
}
