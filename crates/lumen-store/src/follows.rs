//! The follow relation.
//!
//! Each edge is one row in `follows`, so a user's followers and followees are
//! two projections of the same data and can never disagree.

use rusqlite::{params, OptionalExtension, TransactionBehavior};

use lumen_shared::types::UserId;
use lumen_shared::views::UserSummary;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::row::{now, ts};
use crate::users::row_to_summary;

impl Database {
    /// Flip the follow edge `follower -> followee` in a single transaction.
    ///
    /// Returns `true` if `follower` now follows `followee`.
    pub fn toggle_follow(&mut self, follower: UserId, followee: UserId) -> Result<bool> {
        if follower == followee {
            return Err(StoreError::InvalidInput("cannot follow yourself".into()));
        }

        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let target_exists = tx
            .query_row(
                "SELECT 1 FROM users WHERE id = ?1",
                params![followee.to_string()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !target_exists {
            return Err(StoreError::NotFound);
        }

        let removed = tx.execute(
            "DELETE FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
            params![follower.to_string(), followee.to_string()],
        )?;

        let following = if removed == 0 {
            tx.execute(
                "INSERT INTO follows (follower_id, followee_id, created_at) VALUES (?1, ?2, ?3)",
                params![follower.to_string(), followee.to_string(), ts(&now())],
            )?;
            true
        } else {
            false
        };

        tx.commit()?;

        tracing::debug!(%follower, %followee, following, "follow toggled");
        Ok(following)
    }

    pub fn is_following(&self, follower: UserId, followee: UserId) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
                params![follower.to_string(), followee.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Users following `user`, most recent first.
    pub fn followers(&self, user: UserId) -> Result<Vec<UserSummary>> {
        let mut stmt = self.conn().prepare(
            "SELECT u.id, u.username, u.avatar_url
             FROM follows f JOIN users u ON u.id = f.follower_id
             WHERE f.followee_id = ?1
             ORDER BY f.created_at DESC",
        )?;
        let rows = stmt.query_map(params![user.to_string()], row_to_summary)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Users `user` follows, most recent first.
    pub fn following(&self, user: UserId) -> Result<Vec<UserSummary>> {
        let mut stmt = self.conn().prepare(
            "SELECT u.id, u.username, u.avatar_url
             FROM follows f JOIN users u ON u.id = f.followee_id
             WHERE f.follower_id = ?1
             ORDER BY f.created_at DESC",
        )?;
        let rows = stmt.query_map(params![user.to_string()], row_to_summary)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    pub fn count_followers(&self, user: UserId) -> Result<u64> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM follows WHERE followee_id = ?1",
            params![user.to_string()],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    pub fn count_following(&self, user: UserId) -> Result<u64> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM follows WHERE follower_id = ?1",
            params![user.to_string()],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}
