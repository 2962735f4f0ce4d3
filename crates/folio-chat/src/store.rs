use std::sync::Mutex;

use folio_core::id;
use rusqlite::Connection;
use tracing::{debug, instrument};

use crate::error::{ChatError, Result};
use crate::types::{ChatSession, MessageRole, SessionStatus, StoredMessage};

/// Sessions expire this long after creation.
const SESSION_TTL_HOURS: i64 = 24;

/// Thread-safe store for chat sessions and their messages.
///
/// Wraps a single SQLite connection in a `Mutex`. Message appends update the
/// session counters in the same transaction, so a single-session client
/// always observes messages in total order.
pub struct ChatStore {
    db: Mutex<Connection>,
}

impl ChatStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    #[instrument(skip(self))]
    pub fn create_session(
        &self,
        visitor_id: &str,
        ip_hash: &str,
        user_agent: Option<&str>,
    ) -> Result<ChatSession> {
        let session_id = id::generate("sess");
        let now = chrono::Utc::now();
        let created_at = now.to_rfc3339();
        let expires_at = (now + chrono::Duration::hours(SESSION_TTL_HOURS)).to_rfc3339();

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO chat_sessions
             (id, visitor_id, ip_hash, user_agent, message_count, status,
              created_at, last_active_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, 0, 'active', ?5, ?5, ?6)",
            rusqlite::params![session_id, visitor_id, ip_hash, user_agent, created_at, expires_at],
        )?;
        debug!(session_id = %session_id, "chat session created");

        db.query_row(
            &format!("{SELECT_SESSION} WHERE id = ?1"),
            rusqlite::params![session_id],
            row_to_session,
        )
        .map_err(ChatError::from)
    }

    /// The most-recently-active live session for a visitor, if any.
    ///
    /// Sessions past their expiry are flipped to `expired` on the way — the
    /// sweep is lazy, there is no background job.
    #[instrument(skip(self))]
    pub fn find_active_session(&self, visitor_id: &str) -> Result<Option<ChatSession>> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();

        db.execute(
            "UPDATE chat_sessions SET status = 'expired'
             WHERE status = 'active' AND expires_at <= ?1",
            rusqlite::params![now],
        )?;

        match db.query_row(
            &format!(
                "{SELECT_SESSION}
                 WHERE visitor_id = ?1 AND status = 'active' AND expires_at > ?2
                 ORDER BY last_active_at DESC
                 LIMIT 1"
            ),
            rusqlite::params![visitor_id, now],
            row_to_session,
        ) {
            Ok(session) => Ok(Some(session)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(ChatError::Database(e)),
        }
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<ChatSession>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            &format!("{SELECT_SESSION} WHERE id = ?1"),
            rusqlite::params![session_id],
            row_to_session,
        ) {
            Ok(session) => Ok(Some(session)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(ChatError::Database(e)),
        }
    }

    /// Append a message and bump the session's `message_count` and
    /// `last_active_at` atomically.
    #[instrument(skip(self, content))]
    pub fn append_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
        tokens_used: Option<i64>,
        model: Option<&str>,
    ) -> Result<StoredMessage> {
        let message_id = id::generate("msg");
        let now = chrono::Utc::now().to_rfc3339();

        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        // Counter bump first: it doubles as the existence check, before the
        // insert can trip the foreign key.
        let rows = tx.execute(
            "UPDATE chat_sessions
             SET message_count = message_count + 1, last_active_at = ?1
             WHERE id = ?2",
            rusqlite::params![now, session_id],
        )?;
        if rows == 0 {
            return Err(ChatError::SessionNotFound {
                id: session_id.to_string(),
            });
        }
        tx.execute(
            "INSERT INTO chat_messages
             (id, session_id, role, content, tokens_used, model, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![message_id, session_id, role.as_str(), content, tokens_used, model, now],
        )?;
        tx.commit()?;

        Ok(StoredMessage {
            id: message_id,
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            tokens_used,
            model: model.map(String::from),
            created_at: now,
        })
    }

    /// The most recent `limit` messages for a session, oldest first.
    #[instrument(skip(self))]
    pub fn recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, session_id, role, content, tokens_used, model, created_at
             FROM chat_messages
             WHERE session_id = ?1
             ORDER BY created_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![session_id, limit as i64], row_to_message)?;
        let mut messages: Vec<_> = rows.filter_map(|r| r.ok()).collect();
        messages.reverse();
        Ok(messages)
    }

    /// Mark a session ended. Idempotence is not offered: ending twice errors.
    #[instrument(skip(self))]
    pub fn end_session(&self, session_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "UPDATE chat_sessions SET status = 'ended' WHERE id = ?1 AND status = 'active'",
            rusqlite::params![session_id],
        )?;
        if rows == 0 {
            return Err(ChatError::SessionNotFound {
                id: session_id.to_string(),
            });
        }
        Ok(())
    }
}

const SELECT_SESSION: &str = "SELECT id, visitor_id, ip_hash, user_agent, message_count,
                                     status, created_at, last_active_at, expires_at
                              FROM chat_sessions";

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatSession> {
    let status_str: String = row.get(5)?;
    Ok(ChatSession {
        id: row.get(0)?,
        visitor_id: row.get(1)?,
        ip_hash: row.get(2)?,
        user_agent: row.get(3)?,
        message_count: row.get(4)?,
        status: SessionStatus::parse(&status_str),
        created_at: row.get(6)?,
        last_active_at: row.get(7)?,
        expires_at: row.get(8)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    let role_str: String = row.get(2)?;
    Ok(StoredMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: MessageRole::parse(&role_str),
        content: row.get(3)?,
        tokens_used: row.get(4)?,
        model: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> ChatStore {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        crate::db::init_db(&conn).unwrap();
        ChatStore::new(conn)
    }

    #[test]
    fn create_and_find_active_session() {
        let store = test_store();
        let session = store.create_session("v1", "hash", Some("agent")).unwrap();
        assert!(session.id.starts_with("sess_"));
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.message_count, 0);

        let found = store.find_active_session("v1").unwrap().unwrap();
        assert_eq!(found.id, session.id);
        assert!(store.find_active_session("v2").unwrap().is_none());
    }

    #[test]
    fn append_bumps_counters_in_order() {
        let store = test_store();
        let session = store.create_session("v1", "hash", None).unwrap();

        store
            .append_message(&session.id, MessageRole::User, "hi", None, None)
            .unwrap();
        store
            .append_message(
                &session.id,
                MessageRole::Assistant,
                "hello",
                Some(12),
                Some("gpt-4o-mini"),
            )
            .unwrap();

        let session = store.get_session(&session.id).unwrap().unwrap();
        assert_eq!(session.message_count, 2);

        let messages = store.recent_messages(&session.id, 10).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].tokens_used, Some(12));
    }

    #[test]
    fn append_to_unknown_session_fails() {
        let store = test_store();
        assert!(matches!(
            store.append_message("sess_missing", MessageRole::User, "hi", None, None),
            Err(ChatError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn recent_messages_windows_to_limit() {
        let store = test_store();
        let session = store.create_session("v1", "hash", None).unwrap();
        for i in 0..5 {
            store
                .append_message(&session.id, MessageRole::User, &format!("m{i}"), None, None)
                .unwrap();
        }

        let window = store.recent_messages(&session.id, 2).unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].content, "m3");
        assert_eq!(window[1].content, "m4");
    }

    #[test]
    fn expired_sessions_are_swept_on_lookup() {
        let store = test_store();
        let session = store.create_session("v1", "hash", None).unwrap();

        // Force the expiry into the past.
        {
            let db = store.db.lock().unwrap();
            db.execute(
                "UPDATE chat_sessions SET expires_at = ?1 WHERE id = ?2",
                rusqlite::params![
                    (chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339(),
                    session.id
                ],
            )
            .unwrap();
        }

        assert!(store.find_active_session("v1").unwrap().is_none());
        let session = store.get_session(&session.id).unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Expired);
    }

    #[test]
    fn most_recently_active_session_wins() {
        let store = test_store();
        let first = store.create_session("v1", "hash", None).unwrap();
        let second = store.create_session("v1", "hash", None).unwrap();

        // Touch the first session so it becomes the most recently active.
        store
            .append_message(&first.id, MessageRole::User, "hi", None, None)
            .unwrap();

        let found = store.find_active_session("v1").unwrap().unwrap();
        assert_eq!(found.id, first.id);
        assert_ne!(found.id, second.id);
    }

    #[test]
    fn end_session_transitions_once() {
        let store = test_store();
        let session = store.create_session("v1", "hash", None).unwrap();

        store.end_session(&session.id).unwrap();
        assert!(store.find_active_session("v1").unwrap().is_none());
        assert!(store.end_session(&session.id).is_err());
    }
}
