//! Posts, their like sets and their comment threads.

use rusqlite::{params, params_from_iter, OptionalExtension, TransactionBehavior};

use lumen_shared::types::{CommentId, PostId, UserId};
use lumen_shared::views::{CommentView, PostView, UserSummary};

use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::{Comment, Post, PostFilter};
use crate::row::{fold_case, get_id, get_ts, like_pattern, now, ts};
use crate::users::summary_at;

/// Post columns followed by the author's summary columns.
const POST_SELECT: &str = "SELECT p.id, p.author_id, p.image_url, p.caption, p.created_at,
                                  u.id, u.username, u.avatar_url
                           FROM posts p JOIN users u ON u.id = p.author_id";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    pub fn create_post(&self, author: UserId, image_url: &str, caption: &str) -> Result<Post> {
        let post = Post {
            id: PostId::new(),
            author_id: author,
            image_url: image_url.to_string(),
            caption: caption.to_string(),
            created_at: now(),
        };

        self.conn().execute(
            "INSERT INTO posts (id, author_id, image_url, caption, caption_lc, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                post.id.to_string(),
                author.to_string(),
                post.image_url,
                post.caption,
                fold_case(&post.caption),
                ts(&post.created_at),
            ],
        )?;

        Ok(post)
    }

    /// Append a comment to a post's thread.
    pub fn add_comment(&self, post_id: PostId, author: UserId, text: &str) -> Result<Comment> {
        if !self.post_exists(post_id)? {
            return Err(StoreError::NotFound);
        }

        let comment = Comment {
            id: CommentId::new(),
            post_id,
            author_id: author,
            text: text.to_string(),
            created_at: now(),
        };

        self.conn().execute(
            "INSERT INTO comments (id, post_id, author_id, text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                comment.id.to_string(),
                post_id.to_string(),
                author.to_string(),
                comment.text,
                ts(&comment.created_at),
            ],
        )?;

        Ok(comment)
    }

    // ------------------------------------------------------------------
    // Likes
    // ------------------------------------------------------------------

    /// Flip `user`'s like on `post_id` in a single transaction.
    ///
    /// Returns `true` if the post is now liked by `user`.
    pub fn toggle_like(&mut self, post_id: PostId, user: UserId) -> Result<bool> {
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM posts WHERE id = ?1",
                params![post_id.to_string()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Err(StoreError::NotFound);
        }

        let removed = tx.execute(
            "DELETE FROM post_likes WHERE post_id = ?1 AND user_id = ?2",
            params![post_id.to_string(), user.to_string()],
        )?;

        let liked = if removed == 0 {
            tx.execute(
                "INSERT INTO post_likes (post_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![post_id.to_string(), user.to_string(), ts(&now())],
            )?;
            true
        } else {
            false
        };

        tx.commit()?;
        Ok(liked)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_post(&self, id: PostId) -> Result<Post> {
        self.conn()
            .query_row(
                "SELECT id, author_id, image_url, caption, created_at FROM posts WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok(Post {
                        id: get_id(row, 0)?,
                        author_id: get_id(row, 1)?,
                        image_url: row.get(2)?,
                        caption: row.get(3)?,
                        created_at: get_ts(row, 4)?,
                    })
                },
            )
            .map_err(not_found)
    }

    pub fn post_exists(&self, id: PostId) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM posts WHERE id = ?1",
                params![id.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// A single post with author, likes and comments resolved.
    pub fn post_view(&self, id: PostId) -> Result<PostView> {
        let (post, author) = self
            .conn()
            .query_row(
                &format!("{POST_SELECT} WHERE p.id = ?1"),
                params![id.to_string()],
                row_to_post_with_author,
            )
            .map_err(not_found)?;
        self.hydrate_post(post, author)
    }

    /// Newest first.
    pub fn list_posts(&self, filter: PostFilter) -> Result<Vec<PostView>> {
        let (clause, args) = match filter {
            PostFilter::All => (String::new(), Vec::new()),
            PostFilter::Author(author) => {
                ("WHERE p.author_id = ?1".to_string(), vec![author.to_string()])
            }
            PostFilter::FollowedBy(viewer) => (
                "WHERE p.author_id = ?1
                    OR p.author_id IN (SELECT followee_id FROM follows WHERE follower_id = ?1)"
                    .to_string(),
                vec![viewer.to_string()],
            ),
        };

        let sql = format!("{POST_SELECT} {clause} ORDER BY p.created_at DESC, p.rowid DESC");
        self.query_post_views(&sql, params_from_iter(args.iter()))
    }

    /// Most-liked first, newest first among equals.
    pub fn explore_posts(&self, limit: u32) -> Result<Vec<PostView>> {
        let sql = format!(
            "{POST_SELECT}
             ORDER BY (SELECT COUNT(*) FROM post_likes l WHERE l.post_id = p.id) DESC,
                      p.created_at DESC, p.rowid DESC
             LIMIT ?1"
        );
        self.query_post_views(&sql, params![limit])
    }

    /// Case-insensitive (Unicode) substring match on captions, in insertion
    /// order.
    pub fn search_posts(&self, needle: &str, limit: u32) -> Result<Vec<PostView>> {
        let sql = format!(
            "{POST_SELECT}
             WHERE p.caption_lc LIKE ?1 ESCAPE '\\'
             ORDER BY p.rowid ASC
             LIMIT ?2"
        );
        self.query_post_views(&sql, params![like_pattern(&fold_case(needle)), limit])
    }

    pub fn count_posts_by(&self, author: UserId) -> Result<u64> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM posts WHERE author_id = ?1",
            params![author.to_string()],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    pub fn likes_for_post(&self, post_id: PostId) -> Result<Vec<UserId>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id FROM post_likes WHERE post_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![post_id.to_string()], |row| get_id(row, 0))?;

        let mut likes = Vec::new();
        for row in rows {
            likes.push(row?);
        }
        Ok(likes)
    }

    /// Oldest first.
    pub fn comments_for_post(&self, post_id: PostId) -> Result<Vec<CommentView>> {
        let mut stmt = self.conn().prepare(
            "SELECT c.id, c.text, c.created_at, u.id, u.username, u.avatar_url
             FROM comments c JOIN users u ON u.id = c.author_id
             WHERE c.post_id = ?1
             ORDER BY c.created_at ASC, c.rowid ASC",
        )?;
        let rows = stmt.query_map(params![post_id.to_string()], |row| {
            Ok(CommentView {
                id: get_id(row, 0)?,
                text: row.get(1)?,
                created_at: get_ts(row, 2)?,
                author: summary_at(row, 3)?,
            })
        })?;

        let mut comments = Vec::new();
        for row in rows {
            comments.push(row?);
        }
        Ok(comments)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn query_post_views<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<PostView>> {
        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt.query_map(params, row_to_post_with_author)?;

        let mut posts = Vec::new();
        for row in rows {
            let (post, author) = row?;
            posts.push(self.hydrate_post(post, author)?);
        }
        Ok(posts)
    }

    fn hydrate_post(&self, post: Post, author: UserSummary) -> Result<PostView> {
        Ok(PostView {
            likes: self.likes_for_post(post.id)?,
            comments: self.comments_for_post(post.id)?,
            id: post.id,
            author,
            image_url: post.image_url,
            caption: post.caption,
            created_at: post.created_at,
        })
    }
}

fn row_to_post_with_author(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Post, UserSummary)> {
    let post = Post {
        id: get_id(row, 0)?,
        author_id: get_id(row, 1)?,
        image_url: row.get(2)?,
        caption: row.get(3)?,
        created_at: get_ts(row, 4)?,
    };
    Ok((post, summary_at(row, 5)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, UserId, UserId) {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user("alice", "h", Some("a.png")).unwrap().id;
        let bob = db.create_user("bob", "h", None).unwrap().id;
        (db, alice, bob)
    }

    #[test]
    fn create_and_view_post() {
        let (db, alice, _) = setup();
        let post = db.create_post(alice, "https://img/1.jpg", "sunset").unwrap();

        let view = db.post_view(post.id).unwrap();
        assert_eq!(view.author.username, "alice");
        assert_eq!(view.author.avatar_url.as_deref(), Some("a.png"));
        assert_eq!(view.image_url, "https://img/1.jpg");
        assert!(view.likes.is_empty());
        assert!(view.comments.is_empty());
    }

    #[test]
    fn like_twice_toggles_back() {
        let (mut db, alice, bob) = setup();
        let post = db.create_post(alice, "i.jpg", "").unwrap();

        assert!(db.toggle_like(post.id, bob).unwrap());
        assert_eq!(db.likes_for_post(post.id).unwrap(), vec![bob]);

        assert!(!db.toggle_like(post.id, bob).unwrap());
        assert!(db.likes_for_post(post.id).unwrap().is_empty());
    }

    #[test]
    fn like_set_never_holds_duplicates() {
        let (mut db, alice, bob) = setup();
        let post = db.create_post(alice, "i.jpg", "").unwrap();

        for _ in 0..5 {
            db.toggle_like(post.id, bob).unwrap();
            db.toggle_like(post.id, alice).unwrap();
        }
        assert_eq!(db.likes_for_post(post.id).unwrap(), vec![bob, alice]);

        db.toggle_like(post.id, bob).unwrap();
        assert_eq!(db.likes_for_post(post.id).unwrap(), vec![alice]);
    }

    #[test]
    fn like_missing_post_is_not_found() {
        let (mut db, alice, _) = setup();
        assert!(matches!(
            db.toggle_like(PostId::new(), alice),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn comments_are_ordered_oldest_first() {
        let (db, alice, bob) = setup();
        let post = db.create_post(alice, "i.jpg", "").unwrap();

        db.add_comment(post.id, bob, "first").unwrap();
        db.add_comment(post.id, alice, "second").unwrap();

        let comments = db.comments_for_post(post.id).unwrap();
        let texts: Vec<_> = comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert_eq!(comments[0].author.username, "bob");

        assert!(matches!(
            db.add_comment(PostId::new(), bob, "x"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn list_posts_filters() {
        let (mut db, alice, bob) = setup();
        let carol = db.create_user("carol", "h", None).unwrap().id;

        let a1 = db.create_post(alice, "a1.jpg", "").unwrap();
        let b1 = db.create_post(bob, "b1.jpg", "").unwrap();
        let c1 = db.create_post(carol, "c1.jpg", "").unwrap();
        db.toggle_follow(alice, bob).unwrap();

        let all: Vec<_> = db.list_posts(PostFilter::All).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(all, vec![c1.id, b1.id, a1.id]);

        let by_bob: Vec<_> = db
            .list_posts(PostFilter::Author(bob))
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(by_bob, vec![b1.id]);

        let feed: Vec<_> = db
            .list_posts(PostFilter::FollowedBy(alice))
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(feed, vec![b1.id, a1.id]);
    }

    #[test]
    fn explore_orders_by_likes() {
        let (mut db, alice, bob) = setup();
        let quiet = db.create_post(alice, "q.jpg", "").unwrap();
        let popular = db.create_post(alice, "p.jpg", "").unwrap();
        let newest = db.create_post(bob, "n.jpg", "").unwrap();

        db.toggle_like(popular.id, bob).unwrap();
        db.toggle_like(popular.id, alice).unwrap();
        db.toggle_like(quiet.id, bob).unwrap();

        let order: Vec<_> = db.explore_posts(10).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(order, vec![popular.id, quiet.id, newest.id]);
        assert_eq!(db.explore_posts(1).unwrap().len(), 1);
    }

    #[test]
    fn search_posts_by_caption() {
        let (db, alice, _) = setup();
        db.create_post(alice, "1.jpg", "Beach Day").unwrap();
        db.create_post(alice, "2.jpg", "mountain").unwrap();

        let hits = db.search_posts("beach", 20).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].caption, "Beach Day");
        assert!(db.search_posts("desert", 20).unwrap().is_empty());

        db.create_post(alice, "3.jpg", "CAFÉ au lait").unwrap();
        let hits = db.search_posts("café", 20).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].caption, "CAFÉ au lait");
        assert_eq!(db.count_posts_by(alice).unwrap(), 3);
    }
}
