// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for roam-core operations.

use thiserror::Error;

use crate::entity::EntityKind;

/// All possible errors that can occur in roam-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{kind} '{id}' not found: no cached copy and no connectivity")]
    NotFoundOffline { kind: EntityKind, id: String },

    #[error(
        "local storage full: {used} of {quota} bytes used\n  hint: evict cached collections and retry"
    )]
    StorageFull { used: u64, quota: u64 },

    #[error("invalid balances: {0}")]
    InvalidBalances(String),

    #[error("invalid temp id: '{0}'")]
    InvalidTempId(String),

    #[error(
        "invalid entity kind: '{0}'\n  hint: valid kinds are: trip, expense, settlement, note, checklist_item"
    )]
    InvalidEntityKind(String),

    #[error("mutation not found in queue: {0}")]
    MutationNotFound(i64),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupted data: {0}")]
    CorruptedData(String),
}

/// A specialized Result type for roam-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
