//! CRUD operations for [`User`] records.

use rusqlite::{params, OptionalExtension};

use lumen_shared::types::UserId;
use lumen_shared::views::{ProfileView, UserSummary};

use crate::database::Database;
use crate::error::{is_unique_violation, not_found, Result, StoreError};
use crate::models::{ProfileUpdate, User};
use crate::row::{fold_case, get_id, get_ts, like_pattern, now, ts};

const USER_COLUMNS: &str = "id, username, password_hash, avatar_url, bio, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Register a new user. Fails with [`StoreError::Conflict`] if the
    /// username is taken.
    pub fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        avatar_url: Option<&str>,
    ) -> Result<User> {
        let user = User {
            id: UserId::new(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            avatar_url: avatar_url.map(str::to_string),
            bio: None,
            created_at: now(),
        };

        self.conn()
            .execute(
                "INSERT INTO users
                     (id, username, username_lc, password_hash, avatar_url, bio, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user.id.to_string(),
                    user.username,
                    fold_case(&user.username),
                    user.password_hash,
                    user.avatar_url,
                    user.bio,
                    ts(&user.created_at),
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict(format!("username '{username}' is taken"))
                } else {
                    StoreError::Sqlite(e)
                }
            })?;

        tracing::debug!(user = %user.id, username = %user.username, "user created");
        Ok(user)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                row_to_user,
            )
            .map_err(not_found)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                row_to_user,
            )
            .map_err(not_found)
    }

    pub fn user_exists(&self, id: UserId) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM users WHERE id = ?1",
                params![id.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn user_summary(&self, id: UserId) -> Result<UserSummary> {
        self.conn()
            .query_row(
                "SELECT id, username, avatar_url FROM users WHERE id = ?1",
                params![id.to_string()],
                row_to_summary,
            )
            .map_err(not_found)
    }

    /// Everyone except `me`, alphabetically.
    pub fn list_users_except(&self, me: UserId) -> Result<Vec<UserSummary>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, username, avatar_url FROM users
             WHERE id <> ?1
             ORDER BY username ASC",
        )?;

        let rows = stmt.query_map(params![me.to_string()], row_to_summary)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Case-insensitive (Unicode) substring match on usernames, in insertion
    /// order.
    pub fn search_users(&self, needle: &str, limit: u32) -> Result<Vec<UserSummary>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, username, avatar_url FROM users
             WHERE username_lc LIKE ?1 ESCAPE '\\'
             ORDER BY rowid ASC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(
            params![like_pattern(&fold_case(needle)), limit],
            row_to_summary,
        )?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Profile data for `user` as seen by `viewer`.
    pub fn profile_view(&self, viewer: UserId, user: &User) -> Result<ProfileView> {
        Ok(ProfileView {
            user: user.view(),
            post_count: self.count_posts_by(user.id)?,
            followers_count: self.count_followers(user.id)?,
            following_count: self.count_following(user.id)?,
            is_me: viewer == user.id,
            is_following: viewer != user.id && self.is_following(viewer, user.id)?,
        })
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    pub fn update_profile(&self, id: UserId, update: &ProfileUpdate) -> Result<User> {
        let mut user = self.get_user(id)?;

        if let Some(bio) = &update.bio {
            user.bio = bio.clone();
        }
        if let Some(avatar_url) = &update.avatar_url {
            user.avatar_url = avatar_url.clone();
        }

        self.conn().execute(
            "UPDATE users SET bio = ?1, avatar_url = ?2 WHERE id = ?3",
            params![user.bio, user.avatar_url, id.to_string()],
        )?;

        Ok(user)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: get_id(row, 0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        avatar_url: row.get(3)?,
        bio: row.get(4)?,
        created_at: get_ts(row, 5)?,
    })
}

/// Map `(id, username, avatar_url)` starting at column 0.
pub(crate) fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserSummary> {
    summary_at(row, 0)
}

/// Map `(id, username, avatar_url)` starting at column `start`.
pub(crate) fn summary_at(row: &rusqlite::Row<'_>, start: usize) -> rusqlite::Result<UserSummary> {
    Ok(UserSummary {
        id: get_id(row, start)?,
        username: row.get(start + 1)?,
        avatar_url: row.get(start + 2)?,
    })
}
