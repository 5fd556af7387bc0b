use rusqlite::params;

use lumen_shared::types::{MessageId, UserId};
use lumen_shared::views::MessageView;

use crate::database::Database;
use crate::error::{not_found, Result};
use crate::models::Message;
use crate::row::{get_id, get_ts, now, ts};
use crate::users::summary_at;

const MESSAGE_VIEW_SELECT: &str = "SELECT m.id, m.text, m.delivered, m.seen, m.created_at,
                                          s.id, s.username, s.avatar_url,
                                          r.id, r.username, r.avatar_url
                                   FROM messages m
                                   JOIN users s ON s.id = m.sender_id
                                   JOIN users r ON r.id = m.receiver_id";

impl Database {
    /// Store a direct message. `delivered` records whether the receiver had a
    /// live connection at send time.
    pub fn insert_message(
        &self,
        sender: UserId,
        receiver: UserId,
        text: &str,
        delivered: bool,
    ) -> Result<Message> {
        let message = Message {
            id: MessageId::new(),
            sender_id: sender,
            receiver_id: receiver,
            text: text.to_string(),
            delivered,
            seen: false,
            created_at: now(),
        };

        self.conn().execute(
            "INSERT INTO messages (id, sender_id, receiver_id, text, delivered, seen, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
            params![
                message.id.to_string(),
                sender.to_string(),
                receiver.to_string(),
                message.text,
                message.delivered,
                ts(&message.created_at),
            ],
        )?;

        Ok(message)
    }

    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                "SELECT id, sender_id, receiver_id, text, delivered, seen, created_at
                 FROM messages WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok(Message {
                        id: get_id(row, 0)?,
                        sender_id: get_id(row, 1)?,
                        receiver_id: get_id(row, 2)?,
                        text: row.get(3)?,
                        delivered: row.get(4)?,
                        seen: row.get(5)?,
                        created_at: get_ts(row, 6)?,
                    })
                },
            )
            .map_err(not_found)
    }

    pub fn message_view(&self, id: MessageId) -> Result<MessageView> {
        self.conn()
            .query_row(
                &format!("{MESSAGE_VIEW_SELECT} WHERE m.id = ?1"),
                params![id.to_string()],
                row_to_message_view,
            )
            .map_err(not_found)
    }

    /// Both directions of the conversation between `a` and `b`, oldest first.
    pub fn conversation(&self, a: UserId, b: UserId) -> Result<Vec<MessageView>> {
        let mut stmt = self.conn().prepare(&format!(
            "{MESSAGE_VIEW_SELECT}
             WHERE (m.sender_id = ?1 AND m.receiver_id = ?2)
                OR (m.sender_id = ?2 AND m.receiver_id = ?1)
             ORDER BY m.created_at ASC, m.rowid ASC"
        ))?;

        let rows = stmt.query_map(params![a.to_string(), b.to_string()], row_to_message_view)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Mark every unseen message from `sender` to `reader` as seen. A seen
    /// message is delivered by definition, so `delivered` is raised too.
    ///
    /// Returns the number of messages that changed.
    pub fn mark_seen(&self, sender: UserId, reader: UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE messages SET seen = 1, delivered = 1
             WHERE sender_id = ?1 AND receiver_id = ?2 AND seen = 0",
            params![sender.to_string(), reader.to_string()],
        )?;
        Ok(affected)
    }
}

fn row_to_message_view(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageView> {
    Ok(MessageView {
        id: get_id(row, 0)?,
        text: row.get(1)?,
        delivered: row.get(2)?,
        seen: row.get(3)?,
        created_at: get_ts(row, 4)?,
        sender: summary_at(row, 5)?,
        receiver: summary_at(row, 8)?,
    })
}
