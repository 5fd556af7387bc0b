//! Bearer sessions. The store only ever sees the hash of a token.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use lumen_shared::types::UserId;

use crate::database::Database;
use crate::error::Result;
use crate::models::Session;
use crate::row::{get_id, get_ts, now, ts};

impl Database {
    pub fn create_session(&self, token_hash: &str, user_id: UserId) -> Result<Session> {
        let session = Session {
            user_id,
            created_at: now(),
        };

        self.conn().execute(
            "INSERT INTO sessions (token_hash, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![token_hash, user_id.to_string(), ts(&session.created_at)],
        )?;

        Ok(session)
    }

    pub fn get_session(&self, token_hash: &str) -> Result<Option<Session>> {
        let session = self
            .conn()
            .query_row(
                "SELECT user_id, created_at FROM sessions WHERE token_hash = ?1",
                params![token_hash],
                |row| {
                    Ok(Session {
                        user_id: get_id(row, 0)?,
                        created_at: get_ts(row, 1)?,
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    /// Returns `true` if a session was removed.
    pub fn delete_session(&self, token_hash: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM sessions WHERE token_hash = ?1",
            params![token_hash],
        )?;
        Ok(affected > 0)
    }

    /// Drop every session created before `cutoff`. Returns the number removed.
    pub fn purge_sessions_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM sessions WHERE created_at < ?1",
            params![ts(&cutoff)],
        )?;
        Ok(affected)
    }
}
