// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Queued mutation operations.
//!
//! Every write the engine could not confirm with the server immediately is
//! captured as a [`Mutation`] and persisted in the queue. The payload is a
//! closed tagged enum, so replay dispatch is exhaustive at compile time.
//! Creates carry the full entity body with its temp id inside, which keeps
//! the temp id threaded through every later rewrite; there is no
//! field-equality matching fallback anywhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::{ChecklistItem, EntityKind, Expense, Note, Settlement, Trip};

/// A durable record of one pending write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    /// Queue id (sqlite rowid); assigns stable insertion order.
    pub id: i64,
    /// The actual change being performed.
    pub payload: MutationPayload,
    pub enqueued_at: DateTime<Utc>,
    /// Number of failed replay attempts so far.
    pub retry_count: u32,
}

/// Payload describing the specific change being performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationPayload {
    CreateTrip { trip: Trip },
    UpdateTrip { trip_id: String, patch: Value },
    DeleteTrip { trip_id: String },

    CreateExpense { trip_id: String, expense: Expense },
    UpdateExpense { trip_id: String, expense_id: String, patch: Value },
    DeleteExpense { trip_id: String, expense_id: String },
    /// Mark one participant's share of an expense as paid back.
    SettleExpense { trip_id: String, expense_id: String, participant_id: String },

    CreateSettlement { trip_id: String, settlement: Settlement },
    UpdateSettlement { trip_id: String, settlement_id: String, patch: Value },
    DeleteSettlement { trip_id: String, settlement_id: String },

    CreateNote { trip_id: String, note: Note },
    UpdateNote { trip_id: String, note_id: String, patch: Value },
    DeleteNote { trip_id: String, note_id: String },

    CreateChecklistItem { trip_id: String, item: ChecklistItem },
    UpdateChecklistItem { trip_id: String, item_id: String, patch: Value },
    DeleteChecklistItem { trip_id: String, item_id: String },
}

impl MutationPayload {
    /// Returns the kind of entity this mutation targets.
    pub fn entity_kind(&self) -> EntityKind {
        use MutationPayload::*;
        match self {
            CreateTrip { .. } | UpdateTrip { .. } | DeleteTrip { .. } => EntityKind::Trip,
            CreateExpense { .. }
            | UpdateExpense { .. }
            | DeleteExpense { .. }
            | SettleExpense { .. } => EntityKind::Expense,
            CreateSettlement { .. } | UpdateSettlement { .. } | DeleteSettlement { .. } => {
                EntityKind::Settlement
            }
            CreateNote { .. } | UpdateNote { .. } | DeleteNote { .. } => EntityKind::Note,
            CreateChecklistItem { .. }
            | UpdateChecklistItem { .. }
            | DeleteChecklistItem { .. } => EntityKind::ChecklistItem,
        }
    }

    /// Returns the id of the entity this mutation targets.
    pub fn entity_id(&self) -> &str {
        use MutationPayload::*;
        match self {
            CreateTrip { trip } => &trip.id,
            UpdateTrip { trip_id, .. } | DeleteTrip { trip_id } => trip_id,
            CreateExpense { expense, .. } => &expense.id,
            UpdateExpense { expense_id, .. }
            | DeleteExpense { expense_id, .. }
            | SettleExpense { expense_id, .. } => expense_id,
            CreateSettlement { settlement, .. } => &settlement.id,
            UpdateSettlement { settlement_id, .. } | DeleteSettlement { settlement_id, .. } => {
                settlement_id
            }
            CreateNote { note, .. } => &note.id,
            UpdateNote { note_id, .. } | DeleteNote { note_id, .. } => note_id,
            CreateChecklistItem { item, .. } => &item.id,
            UpdateChecklistItem { item_id, .. } | DeleteChecklistItem { item_id, .. } => item_id,
        }
    }

    /// Returns the owning trip id, or `None` for trip-level mutations.
    pub fn parent_id(&self) -> Option<&str> {
        use MutationPayload::*;
        match self {
            CreateTrip { .. } | UpdateTrip { .. } | DeleteTrip { .. } => None,
            CreateExpense { trip_id, .. }
            | UpdateExpense { trip_id, .. }
            | DeleteExpense { trip_id, .. }
            | SettleExpense { trip_id, .. }
            | CreateSettlement { trip_id, .. }
            | UpdateSettlement { trip_id, .. }
            | DeleteSettlement { trip_id, .. }
            | CreateNote { trip_id, .. }
            | UpdateNote { trip_id, .. }
            | DeleteNote { trip_id, .. }
            | CreateChecklistItem { trip_id, .. }
            | UpdateChecklistItem { trip_id, .. }
            | DeleteChecklistItem { trip_id, .. } => Some(trip_id),
        }
    }

    /// Returns true for create mutations.
    pub fn is_create(&self) -> bool {
        use MutationPayload::*;
        matches!(
            self,
            CreateTrip { .. }
                | CreateExpense { .. }
                | CreateSettlement { .. }
                | CreateNote { .. }
                | CreateChecklistItem { .. }
        )
    }

    /// Returns true for delete mutations.
    pub fn is_delete(&self) -> bool {
        use MutationPayload::*;
        matches!(
            self,
            DeleteTrip { .. }
                | DeleteExpense { .. }
                | DeleteSettlement { .. }
                | DeleteNote { .. }
                | DeleteChecklistItem { .. }
        )
    }

    /// Returns true if this mutation references the given id, either as
    /// its target entity or as its owning trip.
    pub fn references(&self, id: &str) -> bool {
        self.entity_id() == id || self.parent_id() == Some(id)
    }

    /// Rewrites every occurrence of `old` (target id or owning trip id)
    /// to `new`. Returns true if anything changed.
    ///
    /// Used by temp-id reconciliation after the server confirms a create.
    pub fn rewrite_id(&mut self, old: &str, new: &str) -> bool {
        use MutationPayload::*;
        let mut changed = false;

        let rewrite = |field: &mut String, changed: &mut bool| {
            if field == old {
                *field = new.to_string();
                *changed = true;
            }
        };

        match self {
            CreateTrip { trip } => {
                rewrite(&mut trip.id, &mut changed);
            }
            UpdateTrip { trip_id, .. } | DeleteTrip { trip_id } => {
                rewrite(trip_id, &mut changed);
            }
            CreateExpense { trip_id, expense } => {
                rewrite(trip_id, &mut changed);
                rewrite(&mut expense.id, &mut changed);
                rewrite(&mut expense.trip_id, &mut changed);
            }
            UpdateExpense { trip_id, expense_id, .. }
            | DeleteExpense { trip_id, expense_id } => {
                rewrite(trip_id, &mut changed);
                rewrite(expense_id, &mut changed);
            }
            SettleExpense { trip_id, expense_id, .. } => {
                rewrite(trip_id, &mut changed);
                rewrite(expense_id, &mut changed);
            }
            CreateSettlement { trip_id, settlement } => {
                rewrite(trip_id, &mut changed);
                rewrite(&mut settlement.id, &mut changed);
                rewrite(&mut settlement.trip_id, &mut changed);
            }
            UpdateSettlement { trip_id, settlement_id, .. }
            | DeleteSettlement { trip_id, settlement_id } => {
                rewrite(trip_id, &mut changed);
                rewrite(settlement_id, &mut changed);
            }
            CreateNote { trip_id, note } => {
                rewrite(trip_id, &mut changed);
                rewrite(&mut note.id, &mut changed);
                rewrite(&mut note.trip_id, &mut changed);
            }
            UpdateNote { trip_id, note_id, .. } | DeleteNote { trip_id, note_id } => {
                rewrite(trip_id, &mut changed);
                rewrite(note_id, &mut changed);
            }
            CreateChecklistItem { trip_id, item } => {
                rewrite(trip_id, &mut changed);
                rewrite(&mut item.id, &mut changed);
                rewrite(&mut item.trip_id, &mut changed);
            }
            UpdateChecklistItem { trip_id, item_id, .. }
            | DeleteChecklistItem { trip_id, item_id } => {
                rewrite(trip_id, &mut changed);
                rewrite(item_id, &mut changed);
            }
        }

        changed
    }
}

#[cfg(test)]
#[path = "mutation_tests.rs"]
mod tests;
