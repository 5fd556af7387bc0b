use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    sender_id   TEXT NOT NULL,
    receiver_id TEXT NOT NULL,
    text        TEXT NOT NULL,
    delivered   INTEGER NOT NULL DEFAULT 0,    -- boolean 0/1
    seen        INTEGER NOT NULL DEFAULT 0,    -- boolean 0/1
    created_at  TEXT NOT NULL,

    CHECK (seen = 0 OR delivered = 1),
    FOREIGN KEY (sender_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (receiver_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_pair_ts
    ON messages(sender_id, receiver_id, created_at);

CREATE TABLE IF NOT EXISTS notifications (
    id          TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    receiver_id TEXT NOT NULL,
    sender_id   TEXT NOT NULL,
    kind        TEXT NOT NULL CHECK (kind IN ('like', 'comment', 'follow', 'message')),
    post_id     TEXT,                          -- like / comment only
    message_id  TEXT,                          -- message only
    is_read     INTEGER NOT NULL DEFAULT 0,    -- boolean 0/1
    created_at  TEXT NOT NULL,

    CHECK (post_id IS NULL OR message_id IS NULL),
    FOREIGN KEY (receiver_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (sender_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_notifications_receiver_ts
    ON notifications(receiver_id, created_at DESC);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
