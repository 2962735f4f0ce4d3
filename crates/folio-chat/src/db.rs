use rusqlite::Connection;

use crate::error::Result;

/// Initialise the chat tables and indices.
///
/// Safe to call on every startup — uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chat_sessions (
            id             TEXT PRIMARY KEY,
            visitor_id     TEXT NOT NULL,
            ip_hash        TEXT NOT NULL,
            user_agent     TEXT,
            message_count  INTEGER NOT NULL DEFAULT 0,
            status         TEXT NOT NULL DEFAULT 'active',
            created_at     TEXT NOT NULL,
            last_active_at TEXT NOT NULL,
            expires_at     TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chat_sessions_visitor
            ON chat_sessions(visitor_id, last_active_at DESC);
        CREATE INDEX IF NOT EXISTS idx_chat_sessions_ip ON chat_sessions(ip_hash);
        CREATE INDEX IF NOT EXISTS idx_chat_sessions_expires ON chat_sessions(expires_at);

        CREATE TABLE IF NOT EXISTS chat_messages (
            id          TEXT PRIMARY KEY,
            session_id  TEXT NOT NULL REFERENCES chat_sessions(id) ON DELETE CASCADE,
            role        TEXT NOT NULL,
            content     TEXT NOT NULL,
            tokens_used INTEGER,
            model       TEXT,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chat_messages_session ON chat_messages(session_id);",
    )?;
    Ok(())
}
