// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Core entity types for the roam sync engine.
//!
//! This module contains the domain objects cached by the engine (Trip,
//! Expense, Settlement, Note, ChecklistItem), the typed cache key, and the
//! generic cache row that wraps any of them as JSON.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Classification of cacheable domain objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Top-level trip, the parent of every other kind.
    Trip,
    /// Shared expense within a trip.
    Expense,
    /// Recorded repayment between two participants.
    Settlement,
    /// Free-form trip note.
    Note,
    /// Packing/planning checklist entry.
    ChecklistItem,
}

impl EntityKind {
    /// Returns the string representation used in storage and temp ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Trip => "trip",
            EntityKind::Expense => "expense",
            EntityKind::Settlement => "settlement",
            EntityKind::Note => "note",
            EntityKind::ChecklistItem => "checklist_item",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "trip" => Ok(EntityKind::Trip),
            "expense" => Ok(EntityKind::Expense),
            "settlement" => Ok(EntityKind::Settlement),
            "note" => Ok(EntityKind::Note),
            "checklist_item" => Ok(EntityKind::ChecklistItem),
            _ => Err(Error::InvalidEntityKind(s.to_string())),
        }
    }
}

/// Typed cache key identifying a single cached entity.
///
/// Replaces the string-concatenation keys of the original engine so two
/// kinds can never collide on a shared id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityKey {
    /// Creates a key for the given kind and id.
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        EntityKey { kind, id: id.into() }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// A member of a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
}

/// The top-level entity everything else hangs off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

/// A shared expense, split evenly among `split_among`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    pub trip_id: String,
    pub title: String,
    pub amount: f64,
    pub currency: String,
    /// Participant who fronted the money.
    pub paid_by: String,
    /// Participants sharing the cost (may include the payer).
    pub split_among: Vec<String>,
    /// Participants who have already paid the payer back for their share.
    #[serde(default)]
    pub settled_by: Vec<String>,
}

/// A recorded repayment from a debtor to a creditor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: String,
    pub trip_id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub amount: f64,
    pub currency: String,
}

/// A free-form trip note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub trip_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub content: String,
}

/// A single checklist entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub trip_id: String,
    pub text: String,
    #[serde(default)]
    pub done: bool,
}

/// A single row in the durable cache.
///
/// Exactly one representation of an entity is authoritative at a time:
/// `pending = false` means server-confirmed, `pending = true` means
/// locally-optimistic (written ahead of server confirmation).
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntity {
    pub kind: EntityKind,
    pub id: String,
    /// Owning trip id for child kinds; `None` for trips themselves.
    pub parent_id: Option<String>,
    /// Entity body as JSON, deserialized on demand per kind.
    pub data: Value,
    pub fetched_at: DateTime<Utc>,
    pub pending: bool,
}

impl CachedEntity {
    /// Wraps a serializable entity as a server-confirmed cache row.
    pub fn confirmed<T: Serialize>(
        kind: EntityKind,
        id: impl Into<String>,
        parent_id: Option<String>,
        entity: &T,
    ) -> Result<Self> {
        Ok(CachedEntity {
            kind,
            id: id.into(),
            parent_id,
            data: serde_json::to_value(entity)?,
            fetched_at: Utc::now(),
            pending: false,
        })
    }

    /// Wraps a serializable entity as a locally-optimistic cache row.
    pub fn optimistic<T: Serialize>(
        kind: EntityKind,
        id: impl Into<String>,
        parent_id: Option<String>,
        entity: &T,
    ) -> Result<Self> {
        let mut row = Self::confirmed(kind, id, parent_id, entity)?;
        row.pending = true;
        Ok(row)
    }

    /// Returns the typed cache key for this row.
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.id.clone())
    }

    /// Deserializes the JSON body into a concrete entity type.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

/// Shallow-merges a JSON object patch into a target JSON object.
///
/// Only top-level fields are replaced; a `null` in the patch clears the
/// field. Non-object targets or patches are replaced wholesale.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    match (target.as_object_mut(), patch.as_object()) {
        (Some(obj), Some(patch_obj)) => {
            for (field, value) in patch_obj {
                if value.is_null() {
                    obj.remove(field);
                } else {
                    obj.insert(field.clone(), value.clone());
                }
            }
        }
        _ => *target = patch.clone(),
    }
}

#[cfg(test)]
#[path = "entity_tests.rs"]
mod tests;
