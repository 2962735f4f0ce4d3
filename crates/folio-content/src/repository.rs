use std::sync::{Arc, Mutex};

use folio_core::events::{ContentEvent, Event, EventBus};
use folio_core::id;
use rusqlite::{Connection, Transaction};
use tracing::{debug, instrument};

use crate::error::{ContentError, Result};
use crate::types::{
    Bundle, ChangeType, ContentItem, ContentStatus, ContentType, CreateContent, HistoryEntry,
    ListQuery, UpdateContent,
};
use crate::validate;

/// Thread-safe repository for content items and their version history.
///
/// Wraps a single SQLite connection in a `Mutex`; every mutation writes the
/// item and its history snapshot inside one transaction so the two can never
/// diverge.
pub struct ContentRepository {
    db: Mutex<Connection>,
    events: Arc<EventBus>,
}

impl ContentRepository {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection, events: Arc<EventBus>) -> Self {
        Self {
            db: Mutex::new(conn),
            events,
        }
    }

    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: &str) -> Result<Option<ContentItem>> {
        let db = self.db.lock().unwrap();
        query_one(
            &db,
            &format!("{SELECT_ITEM} WHERE id = ?1 AND deleted_at IS NULL"),
            rusqlite::params![id],
        )
    }

    #[instrument(skip(self))]
    pub fn find_by_slug(
        &self,
        content_type: ContentType,
        slug: &str,
    ) -> Result<Option<ContentItem>> {
        let db = self.db.lock().unwrap();
        query_one(
            &db,
            &format!("{SELECT_ITEM} WHERE type = ?1 AND slug = ?2 AND deleted_at IS NULL"),
            rusqlite::params![content_type.as_str(), slug],
        )
    }

    #[instrument(skip(self))]
    pub fn find_by_type(&self, content_type: ContentType) -> Result<Vec<ContentItem>> {
        let db = self.db.lock().unwrap();
        query_many(
            &db,
            &format!("{SELECT_ITEM} WHERE type = ?1 AND deleted_at IS NULL {ORDER_ITEMS}"),
            rusqlite::params![content_type.as_str()],
        )
    }

    /// Published, non-deleted items, optionally filtered by type.
    #[instrument(skip(self))]
    pub fn find_published(&self, content_type: Option<ContentType>) -> Result<Vec<ContentItem>> {
        let db = self.db.lock().unwrap();
        match content_type {
            Some(t) => query_many(
                &db,
                &format!(
                    "{SELECT_ITEM} WHERE type = ?1 AND status = 'published' \
                     AND deleted_at IS NULL {ORDER_ITEMS}"
                ),
                rusqlite::params![t.as_str()],
            ),
            None => query_many(
                &db,
                &format!(
                    "{SELECT_ITEM} WHERE status = 'published' AND deleted_at IS NULL {ORDER_ITEMS}"
                ),
                rusqlite::params![],
            ),
        }
    }

    /// Paginated admin listing; drafts and (optionally) deleted rows included.
    #[instrument(skip(self))]
    pub fn find_all(&self, query: &ListQuery) -> Result<Vec<ContentItem>> {
        use rusqlite::types::Value as SqlValue;

        let mut sql = format!("{SELECT_ITEM} WHERE 1=1");
        let mut params: Vec<SqlValue> = Vec::new();

        if let Some(t) = query.content_type {
            params.push(SqlValue::Text(t.as_str().to_string()));
            sql.push_str(&format!(" AND type = ?{}", params.len()));
        }
        if let Some(s) = query.status {
            params.push(SqlValue::Text(s.as_str().to_string()));
            sql.push_str(&format!(" AND status = ?{}", params.len()));
        }
        if !query.include_deleted {
            sql.push_str(" AND deleted_at IS NULL");
        }
        params.push(SqlValue::Integer(query.limit));
        sql.push_str(&format!(" {ORDER_ITEMS} LIMIT ?{}", params.len()));
        params.push(SqlValue::Integer(query.offset));
        sql.push_str(&format!(" OFFSET ?{}", params.len()));

        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), row_to_item)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(ContentError::from)
    }

    /// Whether `(type, slug)` is taken. Counts soft-deleted rows too, so
    /// resurrecting a freed slug stays a deliberate admin action.
    #[instrument(skip(self))]
    pub fn slug_exists(
        &self,
        content_type: ContentType,
        slug: &str,
        exclude_id: Option<&str>,
    ) -> Result<bool> {
        let db = self.db.lock().unwrap();
        slug_exists_tx(&db, content_type, slug, exclude_id)
    }

    /// Create an item at version 1 with its `created` history row.
    #[instrument(skip(self, dto), fields(content_type = %dto.content_type, slug = %dto.slug))]
    pub fn create(&self, dto: CreateContent, changed_by: Option<&str>) -> Result<ContentItem> {
        validate::validate_slug(&dto.slug)?;

        let id = id::generate("content");
        let now = now_rfc3339();
        let status = dto.status.unwrap_or(ContentStatus::Draft);
        let sort_order = dto.sort_order.unwrap_or(0);
        let data_json = dto.data.to_string();

        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;

        if slug_exists_tx(&tx, dto.content_type, &dto.slug, None)? {
            return Err(ContentError::SlugConflict {
                content_type: dto.content_type.to_string(),
                slug: dto.slug,
            });
        }
        if dto.content_type.is_singleton() && singleton_exists_tx(&tx, dto.content_type)? {
            return Err(ContentError::SingletonConflict {
                content_type: dto.content_type.to_string(),
            });
        }

        tx.execute(
            "INSERT INTO content (id, type, slug, data, status, version, sort_order,
                                  created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7, ?7)",
            rusqlite::params![
                id,
                dto.content_type.as_str(),
                dto.slug,
                data_json,
                status.as_str(),
                sort_order,
                now
            ],
        )?;
        insert_history(&tx, &id, 1, &data_json, ChangeType::Created, changed_by, &now)?;
        tx.commit()?;

        let item = get_required(&db, &id)?;
        debug!(id = %item.id, "content created");
        self.events
            .emit(Event::ContentCreated(content_event(&item)));
        Ok(item)
    }

    /// Apply a selective update, capturing the pre-update snapshot at its old
    /// version before bumping to `old + 1`.
    #[instrument(skip(self, updates))]
    pub fn update_with_history(
        &self,
        id: &str,
        updates: UpdateContent,
        changed_by: Option<&str>,
    ) -> Result<ContentItem> {
        let now = now_rfc3339();

        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;

        let existing = get_live_tx(&tx, id)?;

        let slug = match updates.slug {
            Some(slug) => {
                validate::validate_slug(&slug)?;
                if slug != existing.slug
                    && slug_exists_tx(&tx, existing.content_type, &slug, Some(id))?
                {
                    return Err(ContentError::SlugConflict {
                        content_type: existing.content_type.to_string(),
                        slug,
                    });
                }
                slug
            }
            None => existing.slug.clone(),
        };
        let data = updates.data.unwrap_or_else(|| existing.data.clone());
        let status = updates.status.unwrap_or(existing.status);
        let sort_order = updates.sort_order.unwrap_or(existing.sort_order);

        insert_history(
            &tx,
            id,
            existing.version,
            &existing.data.to_string(),
            ChangeType::Updated,
            changed_by,
            &now,
        )?;
        tx.execute(
            "UPDATE content
             SET slug = ?1, data = ?2, status = ?3, sort_order = ?4,
                 version = ?5, updated_at = ?6
             WHERE id = ?7",
            rusqlite::params![
                slug,
                data.to_string(),
                status.as_str(),
                sort_order,
                existing.version + 1,
                now,
                id
            ],
        )?;
        tx.commit()?;

        let item = get_required(&db, id)?;
        debug!(id = %item.id, version = item.version, "content updated");
        self.events
            .emit(Event::ContentUpdated(content_event(&item)));
        Ok(item)
    }

    /// Soft delete: the row stays, masked from every public query.
    #[instrument(skip(self))]
    pub fn delete(&self, id: &str, changed_by: Option<&str>) -> Result<ContentItem> {
        let now = now_rfc3339();

        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;

        let existing = get_live_tx(&tx, id)?;
        insert_history(
            &tx,
            id,
            existing.version,
            &existing.data.to_string(),
            ChangeType::Deleted,
            changed_by,
            &now,
        )?;
        tx.execute(
            "UPDATE content SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now, id],
        )?;
        tx.commit()?;

        let item = ContentItem {
            deleted_at: Some(now.clone()),
            updated_at: now,
            ..existing
        };
        debug!(id = %item.id, "content soft-deleted");
        self.events
            .emit(Event::ContentDeleted(content_event(&item)));
        Ok(item)
    }

    /// Physical removal. The history trail cascades away with the row.
    #[instrument(skip(self))]
    pub fn hard_delete(&self, id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let rows = db.execute("DELETE FROM content WHERE id = ?1", rusqlite::params![id])?;
        if rows == 0 {
            return Err(ContentError::NotFound { id: id.to_string() });
        }
        debug!(id, "content hard-deleted");
        Ok(())
    }

    /// Overwrite `data` with the snapshot recorded at `version`, first
    /// capturing current state as a `restored` history row. The item's
    /// version advances to `current + 1` — no gaps, no reuse.
    #[instrument(skip(self))]
    pub fn restore_version(
        &self,
        id: &str,
        version: i64,
        changed_by: Option<&str>,
    ) -> Result<ContentItem> {
        let now = now_rfc3339();

        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;

        let existing = get_live_tx(&tx, id)?;
        let snapshot: Option<String> = tx
            .query_row(
                "SELECT data FROM content_history
                 WHERE content_id = ?1 AND version = ?2
                 ORDER BY id DESC LIMIT 1",
                rusqlite::params![id, version],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(none_on_no_rows)?;
        let snapshot = snapshot.ok_or(ContentError::VersionNotFound {
            id: id.to_string(),
            version,
        })?;

        insert_history(
            &tx,
            id,
            existing.version,
            &existing.data.to_string(),
            ChangeType::Restored,
            changed_by,
            &now,
        )?;
        tx.execute(
            "UPDATE content SET data = ?1, version = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![snapshot, existing.version + 1, now, id],
        )?;
        tx.commit()?;

        let item = get_required(&db, id)?;
        debug!(id = %item.id, restored_from = version, version = item.version, "content restored");
        self.events
            .emit(Event::ContentRestored(content_event(&item)));
        Ok(item)
    }

    /// History rows for an item, newest version first.
    #[instrument(skip(self))]
    pub fn get_history(&self, id: &str, limit: i64, offset: i64) -> Result<Vec<HistoryEntry>> {
        let db = self.db.lock().unwrap();

        let exists: i64 = db.query_row(
            "SELECT COUNT(*) FROM content WHERE id = ?1",
            rusqlite::params![id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(ContentError::NotFound { id: id.to_string() });
        }

        let mut stmt = db.prepare(
            "SELECT id, content_id, version, data, change_type, changed_by,
                    change_summary, created_at
             FROM content_history
             WHERE content_id = ?1
             ORDER BY version DESC, id DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(rusqlite::params![id, limit, offset], row_to_history)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(ContentError::from)
    }

    /// All published content partitioned by type.
    pub fn get_bundle(&self) -> Result<Bundle> {
        let items = self.find_published(None)?;
        let mut bundle = Bundle {
            projects: Vec::new(),
            experiences: Vec::new(),
            education: Vec::new(),
            skills: Vec::new(),
            about: None,
            contact: None,
        };
        for item in items {
            match item.content_type {
                ContentType::Project => bundle.projects.push(item),
                ContentType::Experience => bundle.experiences.push(item),
                ContentType::Education => bundle.education.push(item),
                ContentType::Skill => bundle.skills.push(item),
                ContentType::About => bundle.about = bundle.about.or(Some(item)),
                ContentType::Contact => bundle.contact = bundle.contact.or(Some(item)),
            }
        }
        Ok(bundle)
    }

    /// Readiness probe — `SELECT 1` against the underlying store.
    pub fn ping(&self) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

const SELECT_ITEM: &str = "SELECT id, type, slug, data, status, version, sort_order,
                                  created_at, updated_at, deleted_at
                           FROM content";
const ORDER_ITEMS: &str = "ORDER BY sort_order ASC, created_at DESC";

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn content_event(item: &ContentItem) -> ContentEvent {
    ContentEvent {
        id: item.id.clone(),
        content_type: item.content_type.to_string(),
        slug: item.slug.clone(),
        version: item.version,
    }
}

fn none_on_no_rows<T>(e: rusqlite::Error) -> rusqlite::Result<Option<T>> {
    match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other),
    }
}

fn query_one(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Option<ContentItem>> {
    conn.query_row(sql, params, row_to_item)
        .map(Some)
        .or_else(none_on_no_rows)
        .map_err(ContentError::from)
}

fn query_many(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<ContentItem>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, row_to_item)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(ContentError::from)
}

/// Read a row by id regardless of deletion state; error if deleted or absent.
fn get_live_tx(tx: &Transaction<'_>, id: &str) -> Result<ContentItem> {
    let item: Option<ContentItem> = tx
        .query_row(
            &format!("{SELECT_ITEM} WHERE id = ?1"),
            rusqlite::params![id],
            row_to_item,
        )
        .map(Some)
        .or_else(none_on_no_rows)?;
    match item {
        Some(item) if item.deleted_at.is_none() => Ok(item),
        _ => Err(ContentError::NotFound { id: id.to_string() }),
    }
}

fn get_required(conn: &Connection, id: &str) -> Result<ContentItem> {
    query_one(
        conn,
        &format!("{SELECT_ITEM} WHERE id = ?1"),
        rusqlite::params![id],
    )?
    .ok_or(ContentError::NotFound { id: id.to_string() })
}

fn slug_exists_tx(
    conn: &Connection,
    content_type: ContentType,
    slug: &str,
    exclude_id: Option<&str>,
) -> Result<bool> {
    let count: i64 = match exclude_id {
        Some(exclude) => conn.query_row(
            "SELECT COUNT(*) FROM content WHERE type = ?1 AND slug = ?2 AND id != ?3",
            rusqlite::params![content_type.as_str(), slug, exclude],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT COUNT(*) FROM content WHERE type = ?1 AND slug = ?2",
            rusqlite::params![content_type.as_str(), slug],
            |row| row.get(0),
        )?,
    };
    Ok(count > 0)
}

fn singleton_exists_tx(conn: &Connection, content_type: ContentType) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM content WHERE type = ?1 AND deleted_at IS NULL",
        rusqlite::params![content_type.as_str()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn insert_history(
    tx: &Transaction<'_>,
    content_id: &str,
    version: i64,
    data_json: &str,
    change_type: ChangeType,
    changed_by: Option<&str>,
    now: &str,
) -> Result<()> {
    tx.execute(
        "INSERT INTO content_history
         (content_id, version, data, change_type, changed_by, change_summary, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6)",
        rusqlite::params![
            content_id,
            version,
            data_json,
            change_type.as_str(),
            changed_by,
            now
        ],
    )?;
    Ok(())
}

/// Map a SQLite row to a `ContentItem`. Stored data that fails to parse maps
/// to JSON null rather than failing the read.
fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContentItem> {
    let type_str: String = row.get(1)?;
    let status_str: String = row.get(4)?;
    let data_str: String = row.get(3)?;

    Ok(ContentItem {
        id: row.get(0)?,
        content_type: ContentType::parse(&type_str).unwrap_or(ContentType::Project),
        slug: row.get(2)?,
        data: serde_json::from_str(&data_str).unwrap_or(serde_json::Value::Null),
        status: ContentStatus::parse(&status_str).unwrap_or(ContentStatus::Draft),
        version: row.get(5)?,
        sort_order: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        deleted_at: row.get(9)?,
    })
}

fn row_to_history(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let change_str: String = row.get(4)?;
    let data_str: String = row.get(3)?;
    let change_type = match change_str.as_str() {
        "created" => ChangeType::Created,
        "updated" => ChangeType::Updated,
        "deleted" => ChangeType::Deleted,
        _ => ChangeType::Restored,
    };

    Ok(HistoryEntry {
        id: row.get(0)?,
        content_id: row.get(1)?,
        version: row.get(2)?,
        data: serde_json::from_str(&data_str).unwrap_or(serde_json::Value::Null),
        change_type,
        changed_by: row.get(5)?,
        change_summary: row.get(6)?,
        created_at: row.get(7)?,
    })
}
