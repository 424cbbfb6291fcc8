// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Durable mutation queue operations.
//!
//! The queue lives in the same sqlite file as the cache so a crash can
//! never separate cached optimistic state from the mutations that produced
//! it. Insertion order is fixed by the AUTOINCREMENT id; the queue itself
//! never reorders entries. Ordering and elision decisions belong to the
//! sync coordinator.

use chrono::Utc;
use rusqlite::params;

use crate::error::{Error, Result};
use crate::mutation::{Mutation, MutationPayload};
use crate::store::CacheStore;

impl CacheStore {
    /// Appends a mutation to the queue. Returns its queue id.
    pub fn enqueue(&self, payload: &MutationPayload) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO mutations (payload, enqueued_at, retry_count) VALUES (?1, ?2, 0)",
            params![serde_json::to_string(payload)?, Utc::now().to_rfc3339()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Returns all queued mutations in stable insertion order.
    pub fn queued_mutations(&self) -> Result<Vec<Mutation>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, payload, enqueued_at, retry_count FROM mutations ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let payload: String = row.get(1)?;
            let enqueued_at: String = row.get(2)?;
            let retry_count: u32 = row.get(3)?;
            Ok((id, payload, enqueued_at, retry_count))
        })?;

        let mut mutations = Vec::new();
        for row in rows {
            let (id, payload, enqueued_at, retry_count) = row?;
            mutations.push(Mutation {
                id,
                payload: serde_json::from_str(&payload)?,
                enqueued_at: chrono::DateTime::parse_from_rfc3339(&enqueued_at)
                    .map_err(|_| {
                        Error::CorruptedData(format!("invalid enqueued_at '{enqueued_at}'"))
                    })?
                    .with_timezone(&Utc),
                retry_count,
            });
        }
        Ok(mutations)
    }

    /// Removes a mutation from the queue. Returns true if it was present.
    pub fn remove_mutation(&self, id: i64) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM mutations WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    /// Sets the retry count of a queued mutation.
    pub fn update_retry_count(&self, id: i64, retry_count: u32) -> Result<()> {
        let n = self.conn.execute(
            "UPDATE mutations SET retry_count = ?2 WHERE id = ?1",
            params![id, retry_count],
        )?;
        if n == 0 {
            return Err(Error::MutationNotFound(id));
        }
        Ok(())
    }

    /// Replaces the payload of a queued mutation in place, preserving its
    /// queue position and retry count.
    ///
    /// Used only by temp-id reconciliation to rewrite references to a
    /// confirmed temp id.
    pub fn replace_mutation(&self, id: i64, payload: &MutationPayload) -> Result<()> {
        let n = self.conn.execute(
            "UPDATE mutations SET payload = ?2 WHERE id = ?1",
            params![id, serde_json::to_string(payload)?],
        )?;
        if n == 0 {
            return Err(Error::MutationNotFound(id));
        }
        Ok(())
    }

    /// Returns the number of queued mutations.
    pub fn pending_sync_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM mutations", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
