// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Remote gateway boundary.
//!
//! The coordinator is agnostic to transport; it only needs one call per
//! mutation type plus trip-scoped fetches, each eventually resolving to
//! the server-confirmed entity or a distinguishable failure. The gateway
//! owns no state and the engine imposes no timeout of its own beyond what
//! the implementation's transport provides.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use roam_core::{ChecklistItem, Expense, Note, Settlement, Trip};

/// Failure of a gateway call.
///
/// `Network` is the connectivity/transport class the coordinator treats as
/// "we may as well be offline"; `Rejected` is the server saying no.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("network unavailable: {0}")]
    Network(String),

    #[error("server rejected request: {0}")]
    Rejected(String),
}

impl GatewayError {
    /// Returns true for connectivity-class failures.
    pub fn is_network(&self) -> bool {
        matches!(self, GatewayError::Network(_))
    }
}

/// A specialized Result type for gateway calls.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// The narrow interface to the actual server.
#[async_trait]
pub trait Gateway: Send + Sync {
    // Trips
    async fn fetch_trips(&self) -> GatewayResult<Vec<Trip>>;
    async fn fetch_trip(&self, id: &str) -> GatewayResult<Trip>;
    async fn create_trip(&self, trip: &Trip) -> GatewayResult<Trip>;
    async fn update_trip(&self, id: &str, patch: &Value) -> GatewayResult<Trip>;
    async fn delete_trip(&self, id: &str) -> GatewayResult<()>;

    // Expenses
    async fn fetch_expenses(&self, trip_id: &str) -> GatewayResult<Vec<Expense>>;
    async fn create_expense(&self, trip_id: &str, expense: &Expense) -> GatewayResult<Expense>;
    async fn update_expense(
        &self,
        trip_id: &str,
        id: &str,
        patch: &Value,
    ) -> GatewayResult<Expense>;
    async fn delete_expense(&self, trip_id: &str, id: &str) -> GatewayResult<()>;
    async fn settle_expense_participant(
        &self,
        trip_id: &str,
        expense_id: &str,
        participant_id: &str,
    ) -> GatewayResult<()>;

    // Settlements
    async fn fetch_settlements(&self, trip_id: &str) -> GatewayResult<Vec<Settlement>>;
    async fn create_settlement(
        &self,
        trip_id: &str,
        settlement: &Settlement,
    ) -> GatewayResult<Settlement>;
    async fn update_settlement(
        &self,
        trip_id: &str,
        id: &str,
        patch: &Value,
    ) -> GatewayResult<Settlement>;
    async fn delete_settlement(&self, trip_id: &str, id: &str) -> GatewayResult<()>;

    // Notes
    async fn fetch_notes(&self, trip_id: &str) -> GatewayResult<Vec<Note>>;
    async fn create_note(&self, trip_id: &str, note: &Note) -> GatewayResult<Note>;
    async fn update_note(&self, trip_id: &str, id: &str, patch: &Value) -> GatewayResult<Note>;
    async fn delete_note(&self, trip_id: &str, id: &str) -> GatewayResult<()>;

    // Checklist
    async fn fetch_checklist(&self, trip_id: &str) -> GatewayResult<Vec<ChecklistItem>>;
    async fn create_checklist_item(
        &self,
        trip_id: &str,
        item: &ChecklistItem,
    ) -> GatewayResult<ChecklistItem>;
    async fn update_checklist_item(
        &self,
        trip_id: &str,
        id: &str,
        patch: &Value,
    ) -> GatewayResult<ChecklistItem>;
    async fn delete_checklist_item(&self, trip_id: &str, id: &str) -> GatewayResult<()>;
}
