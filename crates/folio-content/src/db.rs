use rusqlite::Connection;

use crate::error::Result;

/// Initialise the content tables and indices.
///
/// Safe to call on every startup — uses `IF NOT EXISTS` throughout.
/// History rows reference their item with `ON DELETE CASCADE`, so a hard
/// delete drops the full version trail (requires `PRAGMA foreign_keys=ON`,
/// set by the caller when opening the connection).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS content (
            id          TEXT PRIMARY KEY,
            type        TEXT NOT NULL,
            slug        TEXT NOT NULL,
            data        TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'draft',
            version     INTEGER NOT NULL DEFAULT 1,
            sort_order  INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            deleted_at  TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_content_type ON content(type);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_content_type_slug ON content(type, slug);
        CREATE INDEX IF NOT EXISTS idx_content_deleted ON content(deleted_at);

        CREATE TABLE IF NOT EXISTS content_history (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            content_id     TEXT NOT NULL REFERENCES content(id) ON DELETE CASCADE,
            version        INTEGER NOT NULL,
            data           TEXT NOT NULL,
            change_type    TEXT NOT NULL,
            changed_by     TEXT,
            change_summary TEXT,
            created_at     TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_history_content_version
            ON content_history(content_id, version DESC);",
    )?;
    Ok(())
}
