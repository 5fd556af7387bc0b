//! v003 -- Case-folded copies of usernames and captions for search.

use rusqlite::{params, Connection};

use crate::row::fold_case;

const UP_SQL: &str = r#"
ALTER TABLE users ADD COLUMN username_lc TEXT NOT NULL DEFAULT '';
ALTER TABLE posts ADD COLUMN caption_lc TEXT NOT NULL DEFAULT '';
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)?;
    backfill(conn, "users", "username", "username_lc")?;
    backfill(conn, "posts", "caption", "caption_lc")
}

/// Fill `target` with the folded `source` for rows that predate the column.
fn backfill(
    conn: &Connection,
    table: &str,
    source: &str,
    target: &str,
) -> Result<(), rusqlite::Error> {
    let rows = {
        let mut stmt = conn.prepare(&format!("SELECT rowid, {source} FROM {table}"))?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    let mut update = conn.prepare(&format!("UPDATE {table} SET {target} = ?1 WHERE rowid = ?2"))?;
    for (rowid, text) in rows {
        update.execute(params![fold_case(&text), rowid])?;
    }
    Ok(())
}
