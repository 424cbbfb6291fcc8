// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Scriptable in-memory gateway used by the coordinator and monitor tests.
//!
//! Keeps a fake server-side dataset, records every call it receives, and
//! can be told to fail: either wholesale (network down) or per method
//! (server rejection). Fetches can additionally be gated on a semaphore to
//! hold them in flight.

#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use roam_core::entity::merge_patch;
use roam_core::{ChecklistItem, Expense, Note, Settlement, Trip};

use crate::gateway::{Gateway, GatewayError, GatewayResult};

#[derive(Default)]
pub(crate) struct MockGateway {
    pub trips: Mutex<HashMap<String, Trip>>,
    pub expenses: Mutex<HashMap<String, Expense>>,
    pub settlements: Mutex<HashMap<String, Settlement>>,
    pub notes: Mutex<HashMap<String, Note>>,
    pub checklist: Mutex<HashMap<String, ChecklistItem>>,
    calls: Mutex<Vec<String>>,
    network_down: AtomicBool,
    rejected: Mutex<HashSet<&'static str>>,
    fetch_gate: Mutex<Option<Arc<Semaphore>>>,
    seq: AtomicU32,
}

impl MockGateway {
    pub fn new() -> Self {
        MockGateway::default()
    }

    /// Makes every call fail with a connectivity-class error.
    pub fn set_network_down(&self, down: bool) {
        self.network_down.store(down, Ordering::SeqCst);
    }

    /// Makes the named method fail with a server rejection.
    pub fn reject(&self, method: &'static str) {
        self.rejected.lock().unwrap().insert(method);
    }

    pub fn allow(&self, method: &'static str) {
        self.rejected.lock().unwrap().remove(method);
    }

    /// Holds every subsequent fetch until permits are added to the
    /// returned semaphore.
    pub fn gate_fetches(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.fetch_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls to the given method.
    pub fn calls_for(&self, method: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split(' ').next() == Some(method))
            .count()
    }

    /// Number of recorded calls whose detail mentions the given id.
    pub fn calls_mentioning(&self, id: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(id)).count()
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn begin(&self, method: &'static str, detail: &str) -> GatewayResult<()> {
        self.calls.lock().unwrap().push(format!("{method} {detail}"));
        if self.network_down.load(Ordering::SeqCst) {
            return Err(GatewayError::Network("mock network down".into()));
        }
        if self.rejected.lock().unwrap().contains(method) {
            return Err(GatewayError::Rejected(format!("mock rejected {method}")));
        }
        Ok(())
    }

    async fn wait_fetch_gate(&self) {
        let gate = self.fetch_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _ = gate.acquire().await;
        }
    }

    fn apply_patch<T>(entity: &T, patch: &Value) -> T
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        let mut value = serde_json::to_value(entity).unwrap();
        merge_patch(&mut value, patch);
        serde_json::from_value(value).unwrap()
    }

    fn sorted_by_id<T: Clone>(map: &HashMap<String, T>, keep: impl Fn(&T) -> bool) -> Vec<T> {
        let mut entries: Vec<(&String, &T)> = map.iter().filter(|(_, v)| keep(v)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, v)| v.clone()).collect()
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn fetch_trips(&self) -> GatewayResult<Vec<Trip>> {
        self.begin("fetch_trips", "")?;
        self.wait_fetch_gate().await;
        Ok(Self::sorted_by_id(&self.trips.lock().unwrap(), |_| true))
    }

    async fn fetch_trip(&self, id: &str) -> GatewayResult<Trip> {
        self.begin("fetch_trip", id)?;
        self.wait_fetch_gate().await;
        self.trips
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::Rejected(format!("no trip {id}")))
    }

    async fn create_trip(&self, trip: &Trip) -> GatewayResult<Trip> {
        self.begin("create_trip", &trip.id)?;
        let mut created = trip.clone();
        created.id = self.next_id("trip");
        self.trips.lock().unwrap().insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn update_trip(&self, id: &str, patch: &Value) -> GatewayResult<Trip> {
        self.begin("update_trip", id)?;
        let mut trips = self.trips.lock().unwrap();
        let trip = trips
            .get(id)
            .ok_or_else(|| GatewayError::Rejected(format!("no trip {id}")))?;
        let updated = Self::apply_patch(trip, patch);
        trips.insert(id.to_string(), updated);
        Ok(trips[id].clone())
    }

    async fn delete_trip(&self, id: &str) -> GatewayResult<()> {
        self.begin("delete_trip", id)?;
        self.trips.lock().unwrap().remove(id);
        Ok(())
    }

    async fn fetch_expenses(&self, trip_id: &str) -> GatewayResult<Vec<Expense>> {
        self.begin("fetch_expenses", trip_id)?;
        self.wait_fetch_gate().await;
        Ok(Self::sorted_by_id(&self.expenses.lock().unwrap(), |e| {
            e.trip_id == trip_id
        }))
    }

    async fn create_expense(&self, trip_id: &str, expense: &Expense) -> GatewayResult<Expense> {
        self.begin("create_expense", &expense.id)?;
        let mut created = expense.clone();
        created.id = self.next_id("exp");
        created.trip_id = trip_id.to_string();
        self.expenses.lock().unwrap().insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn update_expense(
        &self,
        _trip_id: &str,
        id: &str,
        patch: &Value,
    ) -> GatewayResult<Expense> {
        self.begin("update_expense", id)?;
        let mut expenses = self.expenses.lock().unwrap();
        let expense = expenses
            .get(id)
            .ok_or_else(|| GatewayError::Rejected(format!("no expense {id}")))?;
        let updated = Self::apply_patch(expense, patch);
        expenses.insert(id.to_string(), updated);
        Ok(expenses[id].clone())
    }

    async fn delete_expense(&self, _trip_id: &str, id: &str) -> GatewayResult<()> {
        self.begin("delete_expense", id)?;
        self.expenses.lock().unwrap().remove(id);
        Ok(())
    }

    async fn settle_expense_participant(
        &self,
        _trip_id: &str,
        expense_id: &str,
        participant_id: &str,
    ) -> GatewayResult<()> {
        self.begin("settle_expense", expense_id)?;
        let mut expenses = self.expenses.lock().unwrap();
        let expense = expenses
            .get_mut(expense_id)
            .ok_or_else(|| GatewayError::Rejected(format!("no expense {expense_id}")))?;
        if !expense.settled_by.iter().any(|p| p == participant_id) {
            expense.settled_by.push(participant_id.to_string());
        }
        Ok(())
    }

    async fn fetch_settlements(&self, trip_id: &str) -> GatewayResult<Vec<Settlement>> {
        self.begin("fetch_settlements", trip_id)?;
        self.wait_fetch_gate().await;
        Ok(Self::sorted_by_id(&self.settlements.lock().unwrap(), |s| {
            s.trip_id == trip_id
        }))
    }

    async fn create_settlement(
        &self,
        trip_id: &str,
        settlement: &Settlement,
    ) -> GatewayResult<Settlement> {
        self.begin("create_settlement", &settlement.id)?;
        let mut created = settlement.clone();
        created.id = self.next_id("set");
        created.trip_id = trip_id.to_string();
        self.settlements.lock().unwrap().insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn update_settlement(
        &self,
        _trip_id: &str,
        id: &str,
        patch: &Value,
    ) -> GatewayResult<Settlement> {
        self.begin("update_settlement", id)?;
        let mut settlements = self.settlements.lock().unwrap();
        let settlement = settlements
            .get(id)
            .ok_or_else(|| GatewayError::Rejected(format!("no settlement {id}")))?;
        let updated = Self::apply_patch(settlement, patch);
        settlements.insert(id.to_string(), updated);
        Ok(settlements[id].clone())
    }

    async fn delete_settlement(&self, _trip_id: &str, id: &str) -> GatewayResult<()> {
        self.begin("delete_settlement", id)?;
        self.settlements.lock().unwrap().remove(id);
        Ok(())
    }

    async fn fetch_notes(&self, trip_id: &str) -> GatewayResult<Vec<Note>> {
        self.begin("fetch_notes", trip_id)?;
        self.wait_fetch_gate().await;
        Ok(Self::sorted_by_id(&self.notes.lock().unwrap(), |n| {
            n.trip_id == trip_id
        }))
    }

    async fn create_note(&self, trip_id: &str, note: &Note) -> GatewayResult<Note> {
        self.begin("create_note", &note.id)?;
        let mut created = note.clone();
        created.id = self.next_id("note");
        created.trip_id = trip_id.to_string();
        self.notes.lock().unwrap().insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn update_note(&self, _trip_id: &str, id: &str, patch: &Value) -> GatewayResult<Note> {
        self.begin("update_note", id)?;
        let mut notes = self.notes.lock().unwrap();
        let note = notes
            .get(id)
            .ok_or_else(|| GatewayError::Rejected(format!("no note {id}")))?;
        let updated = Self::apply_patch(note, patch);
        notes.insert(id.to_string(), updated);
        Ok(notes[id].clone())
    }

    async fn delete_note(&self, _trip_id: &str, id: &str) -> GatewayResult<()> {
        self.begin("delete_note", id)?;
        self.notes.lock().unwrap().remove(id);
        Ok(())
    }

    async fn fetch_checklist(&self, trip_id: &str) -> GatewayResult<Vec<ChecklistItem>> {
        self.begin("fetch_checklist", trip_id)?;
        self.wait_fetch_gate().await;
        Ok(Self::sorted_by_id(&self.checklist.lock().unwrap(), |i| {
            i.trip_id == trip_id
        }))
    }

    async fn create_checklist_item(
        &self,
        trip_id: &str,
        item: &ChecklistItem,
    ) -> GatewayResult<ChecklistItem> {
        self.begin("create_checklist_item", &item.id)?;
        let mut created = item.clone();
        created.id = self.next_id("chk");
        created.trip_id = trip_id.to_string();
        self.checklist.lock().unwrap().insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn update_checklist_item(
        &self,
        _trip_id: &str,
        id: &str,
        patch: &Value,
    ) -> GatewayResult<ChecklistItem> {
        self.begin("update_checklist_item", id)?;
        let mut checklist = self.checklist.lock().unwrap();
        let item = checklist
            .get(id)
            .ok_or_else(|| GatewayError::Rejected(format!("no checklist item {id}")))?;
        let updated = Self::apply_patch(item, patch);
        checklist.insert(id.to_string(), updated);
        Ok(checklist[id].clone())
    }

    async fn delete_checklist_item(&self, _trip_id: &str, id: &str) -> GatewayResult<()> {
        self.begin("delete_checklist_item", id)?;
        self.checklist.lock().unwrap().remove(id);
        Ok(())
    }
}
