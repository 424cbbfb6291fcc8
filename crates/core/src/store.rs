// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed durable cache store.
//!
//! The [`CacheStore`] holds everything the engine must keep across process
//! restarts: cached entities, per-collection sync timestamps, and the
//! mutation queue (queue operations live in the `queue` module). No method
//! here performs network I/O.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::str::FromStr;

use crate::entity::{CachedEntity, EntityKind};
use crate::error::{Error, Result};

/// Default local storage quota (50 MiB) when the consumer sets none.
pub const DEFAULT_QUOTA_BYTES: u64 = 50 * 1024 * 1024;

/// SQL schema for the offline cache database.
pub const SCHEMA: &str = r#"
-- Cached entities, keyed by (kind, id); child kinds also carry the owning
-- trip id so collections can be listed and replaced wholesale.
CREATE TABLE IF NOT EXISTS entities (
    kind TEXT NOT NULL,
    id TEXT NOT NULL,
    parent_id TEXT,
    data TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    pending INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (kind, id)
);

-- Last successful fetch per collection, for the smart-refresh policy.
-- parent_id is '' for top-level collections (the trip list).
CREATE TABLE IF NOT EXISTS collections (
    kind TEXT NOT NULL,
    parent_id TEXT NOT NULL DEFAULT '',
    last_synced_at TEXT NOT NULL,
    PRIMARY KEY (kind, parent_id)
);

-- Durable mutation queue; AUTOINCREMENT fixes insertion order.
CREATE TABLE IF NOT EXISTS mutations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL,
    enqueued_at TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_entities_parent ON entities(kind, parent_id);
CREATE INDEX IF NOT EXISTS idx_entities_pending ON entities(pending);
"#;

/// Parse an RFC3339 timestamp from the database.
fn parse_timestamp(
    value: &str,
    column: &str,
) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(Error::CorruptedData(format!(
                    "invalid timestamp '{value}' in column '{column}'"
                ))),
            )
        })
}

/// Parse an entity kind from the database.
fn parse_kind(value: &str) -> std::result::Result<EntityKind, rusqlite::Error> {
    EntityKind::from_str(value).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(Error::CorruptedData(format!("invalid entity kind '{value}'"))),
        )
    })
}

/// Local storage usage exposed to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageInfo {
    pub used_bytes: u64,
    pub quota_bytes: u64,
    pub pending_sync_count: usize,
}

/// Run schema creation and all migrations on a database connection.
///
/// Idempotent; safe to run on every open.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    migrate_add_pending(conn)?;
    Ok(())
}

/// Migration: add the pending flag to caches created before optimistic
/// rows were tracked.
fn migrate_add_pending(conn: &Connection) -> Result<()> {
    let has_pending: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM pragma_table_info('entities') WHERE name = 'pending'",
            [],
            |row| row.get(0),
        )
        .unwrap_or(false);

    if !has_pending {
        conn.execute(
            "ALTER TABLE entities ADD COLUMN pending INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    Ok(())
}

/// SQLite connection with offline cache and mutation queue operations.
pub struct CacheStore {
    /// The underlying SQLite connection.
    pub conn: Connection,
    quota_bytes: u64,
}

impl CacheStore {
    /// Open a cache database at the given path, creating and migrating if needed.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // WAL mode so reads and the sync pass don't block each other
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        let store = CacheStore { conn, quota_bytes: DEFAULT_QUOTA_BYTES };
        run_migrations(&store.conn)?;
        Ok(store)
    }

    /// Open an in-memory cache (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = CacheStore { conn, quota_bytes: DEFAULT_QUOTA_BYTES };
        run_migrations(&store.conn)?;
        Ok(store)
    }

    /// Sets the local storage quota enforced by writes.
    pub fn set_quota_bytes(&mut self, quota: u64) {
        self.quota_bytes = quota;
    }

    /// Returns the cached entity for the given key, if any.
    pub fn get(&self, kind: EntityKind, id: &str) -> Result<Option<CachedEntity>> {
        let row = self
            .conn
            .query_row(
                "SELECT kind, id, parent_id, data, fetched_at, pending
                 FROM entities WHERE kind = ?1 AND id = ?2",
                params![kind.as_str(), id],
                Self::row_to_entity,
            )
            .optional()?;
        Ok(row)
    }

    /// Returns all cached entities of a kind under the given parent, in id
    /// order. `None` lists top-level entities (trips).
    pub fn list_by_parent(
        &self,
        kind: EntityKind,
        parent_id: Option<&str>,
    ) -> Result<Vec<CachedEntity>> {
        let mut stmt = self.conn.prepare(
            "SELECT kind, id, parent_id, data, fetched_at, pending
             FROM entities
             WHERE kind = ?1 AND (parent_id = ?2 OR (?2 IS NULL AND parent_id IS NULL))
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![kind.as_str(), parent_id], Self::row_to_entity)?;
        let mut entities = Vec::new();
        for row in rows {
            entities.push(row?);
        }
        Ok(entities)
    }

    /// Inserts or replaces a cached entity.
    ///
    /// Returns [`Error::StorageFull`] when the cache exceeds its quota so
    /// the consumer can evict and retry; nothing is dropped silently.
    pub fn put(&self, entity: &CachedEntity) -> Result<()> {
        self.check_quota()?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO entities (kind, id, parent_id, data, fetched_at, pending)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entity.kind.as_str(),
                    entity.id,
                    entity.parent_id,
                    entity.data.to_string(),
                    entity.fetched_at.to_rfc3339(),
                    entity.pending,
                ],
            )
            .map_err(|e| self.map_disk_full(e))?;
        Ok(())
    }

    /// Inserts or replaces a batch of entities in one transaction.
    pub fn put_batch(&mut self, entities: &[CachedEntity]) -> Result<()> {
        self.check_quota()?;
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO entities (kind, id, parent_id, data, fetched_at, pending)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for entity in entities {
                stmt.execute(params![
                    entity.kind.as_str(),
                    entity.id,
                    entity.parent_id,
                    entity.data.to_string(),
                    entity.fetched_at.to_rfc3339(),
                    entity.pending,
                ])?;
            }
        }
        tx.commit().map_err(|e| self.map_disk_full(e))?;
        Ok(())
    }

    /// Removes a cached entity. Returns true if a row was deleted.
    pub fn delete(&self, kind: EntityKind, id: &str) -> Result<bool> {
        let n = self.conn.execute(
            "DELETE FROM entities WHERE kind = ?1 AND id = ?2",
            params![kind.as_str(), id],
        )?;
        Ok(n > 0)
    }

    /// Removes every cached entity of a kind under the given parent.
    /// Used when a fetched collection replaces the cached one.
    pub fn delete_by_parent(&self, kind: EntityKind, parent_id: Option<&str>) -> Result<usize> {
        let n = self.conn.execute(
            "DELETE FROM entities
             WHERE kind = ?1 AND (parent_id = ?2 OR (?2 IS NULL AND parent_id IS NULL))",
            params![kind.as_str(), parent_id],
        )?;
        Ok(n)
    }

    /// Removes server-confirmed entities of a kind under the given parent,
    /// leaving locally-optimistic rows in place. Used when a fetched
    /// collection replaces the cached one: pending writes stay visible
    /// until their own sync settles them.
    pub fn delete_confirmed_by_parent(
        &self,
        kind: EntityKind,
        parent_id: Option<&str>,
    ) -> Result<usize> {
        let n = self.conn.execute(
            "DELETE FROM entities
             WHERE kind = ?1 AND pending = 0
               AND (parent_id = ?2 OR (?2 IS NULL AND parent_id IS NULL))",
            params![kind.as_str(), parent_id],
        )?;
        Ok(n)
    }

    /// Rewrites the parent id of every child row after a parent trip's temp
    /// id was reconciled. The JSON body's `trip_id` is rewritten along with
    /// the parent column so a decoded child never exposes the retired id.
    pub fn reparent_children(&self, old_parent: &str, new_parent: &str) -> Result<usize> {
        let n = self.conn.execute(
            "UPDATE entities
             SET parent_id = ?2, data = json_set(data, '$.trip_id', ?2)
             WHERE parent_id = ?1",
            params![old_parent, new_parent],
        )?;
        Ok(n)
    }

    /// Returns the last successful fetch time for a collection, if any.
    pub fn last_synced_at(
        &self,
        kind: EntityKind,
        parent_id: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT last_synced_at FROM collections WHERE kind = ?1 AND parent_id = ?2",
                params![kind.as_str(), parent_id.unwrap_or("")],
                |row| row.get(0),
            )
            .optional()?;
        match value {
            None => Ok(None),
            Some(s) => Ok(Some(parse_timestamp(&s, "last_synced_at")?)),
        }
    }

    /// Records a successful collection fetch.
    pub fn mark_synced(
        &self,
        kind: EntityKind,
        parent_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO collections (kind, parent_id, last_synced_at)
             VALUES (?1, ?2, ?3)",
            params![kind.as_str(), parent_id.unwrap_or(""), at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Returns storage usage, the configured quota, and the number of
    /// queued mutations.
    pub fn storage_info(&self) -> Result<StorageInfo> {
        Ok(StorageInfo {
            used_bytes: self.used_bytes()?,
            quota_bytes: self.quota_bytes,
            pending_sync_count: self.pending_sync_count()?,
        })
    }

    /// Returns the database size in bytes via sqlite page accounting.
    pub fn used_bytes(&self) -> Result<u64> {
        // sqlite hands pragmas back as i64; both are non-negative.
        let page_count: i64 = self.conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = self.conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
        Ok((page_count as u64) * (page_size as u64))
    }

    fn check_quota(&self) -> Result<()> {
        let used = self.used_bytes()?;
        if used > self.quota_bytes {
            return Err(Error::StorageFull { used, quota: self.quota_bytes });
        }
        Ok(())
    }

    /// Maps sqlite disk-full failures to the recoverable StorageFull kind.
    fn map_disk_full(&self, err: rusqlite::Error) -> Error {
        if let rusqlite::Error::SqliteFailure(e, _) = &err {
            if e.code == rusqlite::ErrorCode::DiskFull {
                return Error::StorageFull {
                    used: self.used_bytes().unwrap_or(0),
                    quota: self.quota_bytes,
                };
            }
        }
        Error::Database(err)
    }

    fn row_to_entity(row: &rusqlite::Row<'_>) -> std::result::Result<CachedEntity, rusqlite::Error> {
        let kind: String = row.get(0)?;
        let data: String = row.get(3)?;
        let fetched_at: String = row.get(4)?;
        Ok(CachedEntity {
            kind: parse_kind(&kind)?,
            id: row.get(1)?,
            parent_id: row.get(2)?,
            data: serde_json::from_str(&data).map_err(|_| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(Error::CorruptedData("invalid entity JSON".to_string())),
                )
            })?,
            fetched_at: parse_timestamp(&fetched_at, "fetched_at")?,
            pending: row.get(5)?,
        })
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
