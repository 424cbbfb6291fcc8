// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Sync coordinator: optimistic reads/writes over the durable cache,
//! the mutation queue, temp-id reconciliation, and the sync pass.
//!
//! Every consumer-facing call touches the cache first. Reads fall back to
//! cache when the gateway fails or connectivity is gone; writes apply
//! optimistically and enqueue when they cannot be confirmed immediately.
//! The sync pass drains the queue strictly in enqueue order, one operation
//! at a time, so an update is never replayed ahead of the create it
//! depends on.
//!
//! The coordinator is an explicit, constructed object: multiple
//! independent instances (each with their own cache file and gateway) can
//! coexist, which is also what the tests rely on.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use roam_core::balance::BalanceSummary;
use roam_core::entity::{merge_patch, CachedEntity, EntityKey, EntityKind};
use roam_core::{
    net_balances, optimize, temp_id, CacheStore, ChecklistItem, Error, Expense, Mutation,
    MutationPayload, Note, Result, Settlement, SettlementTx, StorageInfo, Trip,
};

use crate::config::SyncConfig;
use crate::gateway::{Gateway, GatewayError, GatewayResult};

/// Cache bookkeeping shared by the generic read/write paths.
pub(crate) trait Syncable: Serialize + DeserializeOwned + Clone + Send + Sync {
    const KIND: EntityKind;
    fn id(&self) -> &str;
}

impl Syncable for Trip {
    const KIND: EntityKind = EntityKind::Trip;
    fn id(&self) -> &str {
        &self.id
    }
}

impl Syncable for Expense {
    const KIND: EntityKind = EntityKind::Expense;
    fn id(&self) -> &str {
        &self.id
    }
}

impl Syncable for Settlement {
    const KIND: EntityKind = EntityKind::Settlement;
    fn id(&self) -> &str {
        &self.id
    }
}

impl Syncable for Note {
    const KIND: EntityKind = EntityKind::Note;
    fn id(&self) -> &str {
        &self.id
    }
}

impl Syncable for ChecklistItem {
    const KIND: EntityKind = EntityKind::ChecklistItem;
    fn id(&self) -> &str {
        &self.id
    }
}

/// Typed key for the in-flight fetch dedup set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FetchKey {
    Entity(EntityKey),
    Collection {
        kind: EntityKind,
        parent_id: Option<String>,
    },
}

/// Removes its key from the in-flight set when the fetch finishes,
/// whichever way it finishes.
struct FetchGuard<'a> {
    in_flight: &'a StdMutex<HashSet<FetchKey>>,
    key: FetchKey,
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.key);
    }
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// True when another pass was already running and this one did nothing.
    pub skipped: bool,
    /// Operations confirmed by the server and removed from the queue.
    pub replayed: usize,
    /// Operations that failed and stay queued with a bumped retry count.
    pub failed: usize,
    /// Operations dropped permanently (retry ceiling, or dependents of a
    /// dropped create).
    pub dropped: usize,
    /// Operations elided because their temp entity was created and deleted
    /// entirely offline.
    pub cancelled: usize,
    /// True when connectivity loss aborted the remainder of the pass.
    pub aborted: bool,
}

impl SyncReport {
    fn skipped() -> Self {
        SyncReport {
            skipped: true,
            ..SyncReport::default()
        }
    }
}

enum ReplayOutcome {
    /// Server confirmed the operation; for creates, carries the temp id
    /// and the confirmed cache row to reconcile.
    Applied(Option<(String, CachedEntity)>),
    Failed(GatewayError),
}

/// Generates the consumer-facing surface for one trip-scoped child kind:
/// list/get reads plus create/update/delete writes, each funneling into
/// the generic helpers at the bottom of the impl. The per-kind tokens name
/// the entity type, the gateway calls, and the queue payload variants with
/// their field names.
macro_rules! child_api {
    (
        $ty:ty,
        list: $list:ident, get: $get:ident,
        create: $create:ident => $create_call:ident($create_var:ident { $entity:ident }),
        update: $update:ident => $update_call:ident($update_var:ident { $id_field:ident }),
        delete: $delete:ident => $delete_call:ident($delete_var:ident),
        fetch: $fetch:ident
    ) => {
        pub async fn $list(&self, trip_id: &str) -> Result<Vec<$ty>> {
            self.read_collection(Some(trip_id), self.gateway.$fetch(trip_id))
                .await
        }

        pub async fn $get(&self, trip_id: &str, id: &str) -> Result<$ty> {
            self.read_child(trip_id, id, self.gateway.$fetch(trip_id))
                .await
        }

        pub async fn $create(&self, trip_id: &str, mut entity: $ty) -> Result<$ty> {
            entity.id = temp_id::generate(<$ty as Syncable>::KIND);
            entity.trip_id = trip_id.to_string();
            let payload = MutationPayload::$create_var {
                trip_id: trip_id.to_string(),
                $entity: entity.clone(),
            };
            self.create_entity(
                Some(trip_id),
                &entity,
                payload,
                self.gateway.$create_call(trip_id, &entity),
            )
            .await
        }

        pub async fn $update(&self, trip_id: &str, id: &str, patch: Value) -> Result<$ty> {
            let payload = MutationPayload::$update_var {
                trip_id: trip_id.to_string(),
                $id_field: id.to_string(),
                patch: patch.clone(),
            };
            self.update_entity::<$ty>(
                Some(trip_id),
                id,
                &patch,
                payload,
                self.gateway.$update_call(trip_id, id, &patch),
            )
            .await
        }

        pub async fn $delete(&self, trip_id: &str, id: &str) -> Result<()> {
            let payload = MutationPayload::$delete_var {
                trip_id: trip_id.to_string(),
                $id_field: id.to_string(),
            };
            self.delete_entity(
                <$ty as Syncable>::KIND,
                id,
                payload,
                self.gateway.$delete_call(trip_id, id),
            )
            .await
        }
    };
}

/// The offline-first engine facade.
pub struct SyncCoordinator<G: Gateway> {
    gateway: G,
    store: Mutex<CacheStore>,
    in_flight: StdMutex<HashSet<FetchKey>>,
    sync_running: AtomicBool,
    online: AtomicBool,
    config: SyncConfig,
}

impl<G: Gateway> SyncCoordinator<G> {
    /// Creates a coordinator over its own cache store and gateway.
    pub fn new(gateway: G, mut store: CacheStore, config: SyncConfig) -> Self {
        store.set_quota_bytes(config.storage_quota_bytes);
        SyncCoordinator {
            gateway,
            store: Mutex::new(store),
            in_flight: StdMutex::new(HashSet::new()),
            sync_running: AtomicBool::new(false),
            online: AtomicBool::new(true),
            config,
        }
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the gateway this engine talks to.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Records the current connectivity state. Driven by the network
    /// monitor; consumers may also set it directly.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Returns the last known connectivity state.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Returns true while queued mutations await replay.
    pub async fn has_pending_sync(&self) -> Result<bool> {
        Ok(self.store.lock().await.pending_sync_count()? > 0)
    }

    /// Returns local storage usage, quota, and the pending queue length.
    pub async fn storage_info(&self) -> Result<StorageInfo> {
        self.store.lock().await.storage_info()
    }

    /// Explicit "sync now" trigger.
    pub async fn force_sync(&self) -> Result<SyncReport> {
        self.run_sync_pass().await
    }

    // ------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------

    pub async fn list_trips(&self) -> Result<Vec<Trip>> {
        self.read_collection(None, self.gateway.fetch_trips()).await
    }

    pub async fn get_trip(&self, id: &str) -> Result<Trip> {
        self.read_entity(id, None, self.gateway.fetch_trip(id)).await
    }

    // ------------------------------------------------------------------
    // Write surface
    // ------------------------------------------------------------------

    pub async fn create_trip(&self, mut trip: Trip) -> Result<Trip> {
        trip.id = temp_id::generate(EntityKind::Trip);
        let payload = MutationPayload::CreateTrip { trip: trip.clone() };
        self.create_entity(None, &trip, payload, self.gateway.create_trip(&trip))
            .await
    }

    pub async fn update_trip(&self, id: &str, patch: Value) -> Result<Trip> {
        let payload = MutationPayload::UpdateTrip {
            trip_id: id.to_string(),
            patch: patch.clone(),
        };
        self.update_entity::<Trip>(None, id, &patch, payload, self.gateway.update_trip(id, &patch))
            .await
    }

    pub async fn delete_trip(&self, id: &str) -> Result<()> {
        let payload = MutationPayload::DeleteTrip {
            trip_id: id.to_string(),
        };
        self.delete_entity(EntityKind::Trip, id, payload, self.gateway.delete_trip(id))
            .await
    }

    // ------------------------------------------------------------------
    // Trip-scoped surface, one block per child kind
    // ------------------------------------------------------------------

    child_api!(
        Expense,
        list: list_expenses, get: get_expense,
        create: create_expense => create_expense(CreateExpense { expense }),
        update: update_expense => update_expense(UpdateExpense { expense_id }),
        delete: delete_expense => delete_expense(DeleteExpense),
        fetch: fetch_expenses
    );

    child_api!(
        Settlement,
        list: list_settlements, get: get_settlement,
        create: create_settlement => create_settlement(CreateSettlement { settlement }),
        update: update_settlement => update_settlement(UpdateSettlement { settlement_id }),
        delete: delete_settlement => delete_settlement(DeleteSettlement),
        fetch: fetch_settlements
    );

    child_api!(
        Note,
        list: list_notes, get: get_note,
        create: create_note => create_note(CreateNote { note }),
        update: update_note => update_note(UpdateNote { note_id }),
        delete: delete_note => delete_note(DeleteNote),
        fetch: fetch_notes
    );

    child_api!(
        ChecklistItem,
        list: list_checklist, get: get_checklist_item,
        create: create_checklist_item => create_checklist_item(CreateChecklistItem { item }),
        update: update_checklist_item => update_checklist_item(UpdateChecklistItem { item_id }),
        delete: delete_checklist_item => delete_checklist_item(DeleteChecklistItem),
        fetch: fetch_checklist
    );

    /// Marks one participant's share of an expense as paid back.
    pub async fn settle_expense_participant(
        &self,
        trip_id: &str,
        expense_id: &str,
        participant_id: &str,
    ) -> Result<()> {
        {
            let store = self.store.lock().await;
            if let Some(mut row) = store.get(EntityKind::Expense, expense_id)? {
                let mut expense: Expense = row.decode()?;
                if !expense.settled_by.iter().any(|p| p == participant_id) {
                    expense.settled_by.push(participant_id.to_string());
                }
                row.data = serde_json::to_value(&expense)?;
                row.pending = true;
                store.put(&row)?;
            }
        }

        if self.is_online() && !temp_id::is_temp(expense_id) {
            match self
                .gateway
                .settle_expense_participant(trip_id, expense_id, participant_id)
                .await
            {
                Ok(()) => {
                    let store = self.store.lock().await;
                    if let Some(mut row) = store.get(EntityKind::Expense, expense_id)? {
                        row.pending = false;
                        store.put(&row)?;
                    }
                    return Ok(());
                }
                Err(err) => {
                    warn!(expense_id, error = %err, "settle call failed, queueing");
                }
            }
        }

        self.store.lock().await.enqueue(&MutationPayload::SettleExpense {
            trip_id: trip_id.to_string(),
            expense_id: expense_id.to_string(),
            participant_id: participant_id.to_string(),
        })?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Balances
    // ------------------------------------------------------------------

    /// Derives per-participant net balances from cached expenses and
    /// settlements. Offline this is a local approximation that cannot see
    /// collaborators' concurrent changes; the summary says so instead of
    /// refusing to answer.
    pub async fn trip_balances(&self, trip_id: &str) -> Result<BalanceSummary> {
        let store = self.store.lock().await;
        let expenses = decode_all::<Expense>(store.list_by_parent(EntityKind::Expense, Some(trip_id))?)?;
        let settlements =
            decode_all::<Settlement>(store.list_by_parent(EntityKind::Settlement, Some(trip_id))?)?;

        let expenses_synced = store.last_synced_at(EntityKind::Expense, Some(trip_id))?;
        let settlements_synced = store.last_synced_at(EntityKind::Settlement, Some(trip_id))?;
        let based_on = match (expenses_synced, settlements_synced) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let currency = expenses
            .first()
            .map(|e| e.currency.clone())
            .or_else(|| settlements.first().map(|s| s.currency.clone()))
            .unwrap_or_else(|| "EUR".to_string());

        Ok(BalanceSummary {
            balances: net_balances(&expenses, &settlements),
            currency,
            computed_at: chrono::Utc::now(),
            based_on,
            offline: !self.is_online(),
        })
    }

    /// Runs the settlement optimizer over the current cached balances.
    pub async fn suggest_settlements(&self, trip_id: &str) -> Result<Vec<SettlementTx>> {
        let summary = self.trip_balances(trip_id).await?;
        optimize(&summary.balances, &summary.currency)
    }

    // ------------------------------------------------------------------
    // Sync pass
    // ------------------------------------------------------------------

    /// Drains the mutation queue. At most one pass runs at a time; a
    /// trigger that arrives while one is running is skipped, not queued.
    pub async fn run_sync_pass(&self) -> Result<SyncReport> {
        if self.sync_running.swap(true, Ordering::SeqCst) {
            debug!("sync pass already running, skipping trigger");
            return Ok(SyncReport::skipped());
        }
        let result = self.sync_pass_inner().await;
        self.sync_running.store(false, Ordering::SeqCst);
        result
    }

    async fn sync_pass_inner(&self) -> Result<SyncReport> {
        // Replaying while offline would only burn retry budget on calls
        // that cannot reach the server.
        if !self.is_online() {
            debug!("offline, not replaying");
            return Ok(SyncReport {
                aborted: true,
                ..SyncReport::default()
            });
        }
        let mut queued = self.store.lock().await.queued_mutations()?;
        let mut report = SyncReport::default();
        if queued.is_empty() {
            return Ok(report);
        }
        info!(pending = queued.len(), "starting sync pass");

        let mut removed: HashSet<i64> = HashSet::new();
        self.cancel_offline_roundtrips(&queued, &mut removed, &mut report)
            .await?;

        for i in 0..queued.len() {
            let mutation = queued[i].clone();
            if removed.contains(&mutation.id) {
                continue;
            }
            match self.replay(&mutation.payload).await? {
                ReplayOutcome::Applied(confirm) => {
                    let store = self.store.lock().await;
                    store.remove_mutation(mutation.id)?;
                    if let Some((temp, row)) = confirm {
                        store.delete(row.kind, &temp)?;
                        store.put(&row)?;
                        reconcile_temp_id(&store, row.kind, &temp, &row.id)?;
                        // Keep this pass's snapshot in step with the queue
                        // rows reconciliation just rewrote.
                        for later in queued.iter_mut().skip(i + 1) {
                            later.payload.rewrite_id(&temp, &row.id);
                        }
                    }
                    report.replayed += 1;
                    debug!(mutation = mutation.id, "replayed");
                }
                ReplayOutcome::Failed(err) => {
                    let attempts = mutation.retry_count + 1;
                    let store = self.store.lock().await;
                    if attempts >= self.config.max_retries {
                        // Known limitation: the pending change is lost for
                        // good here, with only this log line as a trace.
                        warn!(
                            mutation = mutation.id,
                            attempts,
                            error = %err,
                            "retry ceiling reached, dropping mutation; local change stays unsynced"
                        );
                        store.remove_mutation(mutation.id)?;
                        report.dropped += 1;
                        self.drop_dependents(&store, &mutation, &queued, &mut removed, &mut report)?;
                    } else {
                        store.update_retry_count(mutation.id, attempts)?;
                        report.failed += 1;
                        debug!(mutation = mutation.id, attempts, error = %err, "replay failed");
                    }
                    drop(store);
                    if err.is_network() {
                        // Connectivity gone: leave the rest untouched for
                        // the next pass.
                        report.aborted = true;
                        break;
                    }
                }
            }
        }

        info!(
            replayed = report.replayed,
            failed = report.failed,
            dropped = report.dropped,
            cancelled = report.cancelled,
            aborted = report.aborted,
            "sync pass finished"
        );
        Ok(report)
    }

    /// A temp entity with both a create and a delete queued never existed
    /// as far as the server is concerned: drop every operation referencing
    /// it and purge it from the cache. This is the only elision the engine
    /// performs.
    async fn cancel_offline_roundtrips(
        &self,
        queued: &[Mutation],
        removed: &mut HashSet<i64>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let created: HashSet<&str> = queued
            .iter()
            .filter(|m| m.payload.is_create())
            .map(|m| m.payload.entity_id())
            .filter(|id| temp_id::is_temp(id))
            .collect();
        let cancelled: Vec<String> = queued
            .iter()
            .filter(|m| m.payload.is_delete() && created.contains(m.payload.entity_id()))
            .map(|m| m.payload.entity_id().to_string())
            .collect();
        if cancelled.is_empty() {
            return Ok(());
        }

        let store = self.store.lock().await;
        for mutation in queued {
            if cancelled.iter().any(|id| mutation.payload.references(id)) {
                store.remove_mutation(mutation.id)?;
                removed.insert(mutation.id);
                report.cancelled += 1;
            }
        }
        for id in &cancelled {
            let kind = temp_id::parse(id)?;
            store.delete(kind, id)?;
            if kind == EntityKind::Trip {
                for child in [
                    EntityKind::Expense,
                    EntityKind::Settlement,
                    EntityKind::Note,
                    EntityKind::ChecklistItem,
                ] {
                    store.delete_by_parent(child, Some(id))?;
                }
            }
            debug!(temp_id = %id, "cancelled offline create+delete pair");
        }
        Ok(())
    }

    /// Open question resolved: operations queued against a create that was
    /// dropped at the retry ceiling are dropped with it. The server never
    /// learned the temp entity exists, so replaying them can only fail.
    fn drop_dependents(
        &self,
        store: &CacheStore,
        dropped: &Mutation,
        queued: &[Mutation],
        removed: &mut HashSet<i64>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let target = dropped.payload.entity_id();
        if !dropped.payload.is_create() || !temp_id::is_temp(target) {
            return Ok(());
        }
        for later in queued {
            if later.id != dropped.id
                && !removed.contains(&later.id)
                && later.payload.references(target)
            {
                warn!(
                    mutation = later.id,
                    temp_id = target,
                    "dropping dependent of an unsyncable create"
                );
                store.remove_mutation(later.id)?;
                removed.insert(later.id);
                report.dropped += 1;
            }
        }
        Ok(())
    }

    /// Dispatches one queued mutation to the matching gateway call.
    async fn replay(&self, payload: &MutationPayload) -> Result<ReplayOutcome> {
        use MutationPayload::*;

        macro_rules! plain {
            ($call:expr) => {
                match $call.await {
                    Ok(_) => Ok(ReplayOutcome::Applied(None)),
                    Err(err) => Ok(ReplayOutcome::Failed(err)),
                }
            };
        }
        macro_rules! create {
            ($call:expr, $temp:expr, $kind:expr, $parent:expr) => {
                match $call.await {
                    Ok(confirmed) => {
                        let row = CachedEntity::confirmed(
                            $kind,
                            confirmed.id().to_string(),
                            $parent,
                            &confirmed,
                        )?;
                        Ok(ReplayOutcome::Applied(Some(($temp.clone(), row))))
                    }
                    Err(err) => Ok(ReplayOutcome::Failed(err)),
                }
            };
        }

        match payload {
            CreateTrip { trip } => {
                create!(self.gateway.create_trip(trip), trip.id, EntityKind::Trip, None)
            }
            UpdateTrip { trip_id, patch } => plain!(self.gateway.update_trip(trip_id, patch)),
            DeleteTrip { trip_id } => plain!(self.gateway.delete_trip(trip_id)),

            CreateExpense { trip_id, expense } => create!(
                self.gateway.create_expense(trip_id, expense),
                expense.id,
                EntityKind::Expense,
                Some(trip_id.clone())
            ),
            UpdateExpense { trip_id, expense_id, patch } => {
                plain!(self.gateway.update_expense(trip_id, expense_id, patch))
            }
            DeleteExpense { trip_id, expense_id } => {
                plain!(self.gateway.delete_expense(trip_id, expense_id))
            }
            SettleExpense { trip_id, expense_id, participant_id } => plain!(self
                .gateway
                .settle_expense_participant(trip_id, expense_id, participant_id)),

            CreateSettlement { trip_id, settlement } => create!(
                self.gateway.create_settlement(trip_id, settlement),
                settlement.id,
                EntityKind::Settlement,
                Some(trip_id.clone())
            ),
            UpdateSettlement { trip_id, settlement_id, patch } => {
                plain!(self.gateway.update_settlement(trip_id, settlement_id, patch))
            }
            DeleteSettlement { trip_id, settlement_id } => {
                plain!(self.gateway.delete_settlement(trip_id, settlement_id))
            }

            CreateNote { trip_id, note } => create!(
                self.gateway.create_note(trip_id, note),
                note.id,
                EntityKind::Note,
                Some(trip_id.clone())
            ),
            UpdateNote { trip_id, note_id, patch } => {
                plain!(self.gateway.update_note(trip_id, note_id, patch))
            }
            DeleteNote { trip_id, note_id } => {
                plain!(self.gateway.delete_note(trip_id, note_id))
            }

            CreateChecklistItem { trip_id, item } => create!(
                self.gateway.create_checklist_item(trip_id, item),
                item.id,
                EntityKind::ChecklistItem,
                Some(trip_id.clone())
            ),
            UpdateChecklistItem { trip_id, item_id, patch } => {
                plain!(self.gateway.update_checklist_item(trip_id, item_id, patch))
            }
            DeleteChecklistItem { trip_id, item_id } => {
                plain!(self.gateway.delete_checklist_item(trip_id, item_id))
            }
        }
    }

    // ------------------------------------------------------------------
    // Generic read/write plumbing
    // ------------------------------------------------------------------

    fn try_begin_fetch(&self, key: FetchKey) -> Option<FetchGuard<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if set.contains(&key) {
            return None;
        }
        set.insert(key.clone());
        Some(FetchGuard {
            in_flight: &self.in_flight,
            key,
        })
    }

    async fn cached_entity<T: Syncable>(&self, id: &str) -> Result<T> {
        let store = self.store.lock().await;
        match store.get(T::KIND, id)? {
            Some(row) => row.decode(),
            None => Err(Error::NotFoundOffline {
                kind: T::KIND,
                id: id.to_string(),
            }),
        }
    }

    async fn read_entity<T: Syncable>(
        &self,
        id: &str,
        parent_id: Option<&str>,
        fetch: impl Future<Output = GatewayResult<T>>,
    ) -> Result<T> {
        let key = FetchKey::Entity(EntityKey::new(T::KIND, id));
        let Some(_guard) = self.try_begin_fetch(key) else {
            // A fetch for this key is outstanding: serve the cached value
            // rather than issuing a duplicate call. May be stale; that is
            // the documented trade.
            return self.cached_entity(id).await;
        };

        if self.is_online() {
            match fetch.await {
                Ok(entity) => {
                    let row = CachedEntity::confirmed(
                        T::KIND,
                        entity.id().to_string(),
                        parent_id.map(str::to_string),
                        &entity,
                    )?;
                    self.store.lock().await.put(&row)?;
                    return Ok(entity);
                }
                Err(err) => {
                    debug!(kind = %T::KIND, id, error = %err, "fetch failed, falling back to cache");
                }
            }
        }
        self.cached_entity(id).await
    }

    async fn read_collection<T: Syncable>(
        &self,
        parent_id: Option<&str>,
        fetch: impl Future<Output = GatewayResult<Vec<T>>>,
    ) -> Result<Vec<T>> {
        let cached = |store: &CacheStore| -> Result<Vec<T>> {
            decode_all(store.list_by_parent(T::KIND, parent_id)?)
        };

        let key = FetchKey::Collection {
            kind: T::KIND,
            parent_id: parent_id.map(str::to_string),
        };
        let Some(_guard) = self.try_begin_fetch(key) else {
            return cached(&*self.store.lock().await);
        };

        if self.is_online() {
            // Smart refresh: a recent enough fetch is served from cache.
            let fresh = {
                let store = self.store.lock().await;
                match store.last_synced_at(T::KIND, parent_id)? {
                    Some(at) => {
                        let age = chrono::Utc::now().signed_duration_since(at);
                        age.to_std().map(|a| a < self.config.refresh_ttl).unwrap_or(true)
                    }
                    None => false,
                }
            };
            if fresh {
                return cached(&*self.store.lock().await);
            }

            match fetch.await {
                Ok(entities) => {
                    let now = chrono::Utc::now();
                    let rows = entities
                        .iter()
                        .map(|e| {
                            CachedEntity::confirmed(
                                T::KIND,
                                e.id().to_string(),
                                parent_id.map(str::to_string),
                                e,
                            )
                        })
                        .collect::<Result<Vec<_>>>()?;
                    let mut store = self.store.lock().await;
                    // Pending optimistic rows stay; their own sync settles them.
                    store.delete_confirmed_by_parent(T::KIND, parent_id)?;
                    store.put_batch(&rows)?;
                    store.mark_synced(T::KIND, parent_id, now)?;
                    return cached(&store);
                }
                Err(err) => {
                    debug!(kind = %T::KIND, error = %err, "collection fetch failed, falling back to cache");
                }
            }
        }
        cached(&*self.store.lock().await)
    }

    /// Reads one child entity through its collection. Online this honors
    /// the refresh TTL, the in-flight dedup, and the cache fallback of
    /// `read_collection`, so a collaborator's change shows up once the
    /// cached collection goes stale; offline it is a plain cache read.
    async fn read_child<T: Syncable>(
        &self,
        trip_id: &str,
        id: &str,
        fetch: impl Future<Output = GatewayResult<Vec<T>>>,
    ) -> Result<T> {
        if self.is_online() {
            let listed = self.read_collection(Some(trip_id), fetch).await?;
            if let Some(entity) = listed.into_iter().find(|e| e.id() == id) {
                return Ok(entity);
            }
        }
        if let Some(row) = self.store.lock().await.get(T::KIND, id)? {
            return row.decode();
        }
        Err(Error::NotFoundOffline {
            kind: T::KIND,
            id: id.to_string(),
        })
    }

    async fn create_entity<T: Syncable>(
        &self,
        parent_id: Option<&str>,
        entity: &T,
        payload: MutationPayload,
        call: impl Future<Output = GatewayResult<T>>,
    ) -> Result<T> {
        // Optimistic write first: the caller sees its own create without
        // ever waiting on the network.
        let row = CachedEntity::optimistic(
            T::KIND,
            entity.id().to_string(),
            parent_id.map(str::to_string),
            entity,
        )?;
        self.store.lock().await.put(&row)?;

        if self.is_online() {
            match call.await {
                Ok(confirmed) => {
                    let store = self.store.lock().await;
                    store.delete(T::KIND, entity.id())?;
                    let confirmed_row = CachedEntity::confirmed(
                        T::KIND,
                        confirmed.id().to_string(),
                        parent_id.map(str::to_string),
                        &confirmed,
                    )?;
                    store.put(&confirmed_row)?;
                    reconcile_temp_id(&store, T::KIND, entity.id(), confirmed.id())?;
                    return Ok(confirmed);
                }
                Err(err) => {
                    warn!(kind = %T::KIND, temp_id = entity.id(), error = %err, "create failed, queueing");
                }
            }
        }

        self.store.lock().await.enqueue(&payload)?;
        Ok(entity.clone())
    }

    async fn update_entity<T: Syncable>(
        &self,
        parent_id: Option<&str>,
        id: &str,
        patch: &Value,
        payload: MutationPayload,
        call: impl Future<Output = GatewayResult<T>>,
    ) -> Result<T> {
        let optimistic: Option<T> = {
            let store = self.store.lock().await;
            match store.get(T::KIND, id)? {
                Some(mut row) => {
                    merge_patch(&mut row.data, patch);
                    row.pending = true;
                    store.put(&row)?;
                    Some(row.decode()?)
                }
                None => None,
            }
        };

        if self.is_online() && !temp_id::is_temp(id) {
            match call.await {
                Ok(confirmed) => {
                    let row = CachedEntity::confirmed(
                        T::KIND,
                        confirmed.id().to_string(),
                        parent_id.map(str::to_string),
                        &confirmed,
                    )?;
                    self.store.lock().await.put(&row)?;
                    return Ok(confirmed);
                }
                Err(err) => {
                    warn!(kind = %T::KIND, id, error = %err, "update failed, queueing");
                }
            }
        }

        match optimistic {
            Some(result) => {
                // Queue the original patch, not the merged result: the
                // cache row may be superseded again before replay.
                self.store.lock().await.enqueue(&payload)?;
                Ok(result)
            }
            None => Err(Error::NotFoundOffline {
                kind: T::KIND,
                id: id.to_string(),
            }),
        }
    }

    async fn delete_entity(
        &self,
        kind: EntityKind,
        id: &str,
        payload: MutationPayload,
        call: impl Future<Output = GatewayResult<()>>,
    ) -> Result<()> {
        {
            let store = self.store.lock().await;
            store.delete(kind, id)?;
            if kind == EntityKind::Trip {
                for child in [
                    EntityKind::Expense,
                    EntityKind::Settlement,
                    EntityKind::Note,
                    EntityKind::ChecklistItem,
                ] {
                    store.delete_by_parent(child, Some(id))?;
                }
            }
        }

        // A temp id never goes over the wire: either its create is still
        // queued (the pair cancels at the next pass) or reconciliation
        // already renamed it.
        if temp_id::is_temp(id) {
            self.store.lock().await.enqueue(&payload)?;
            return Ok(());
        }

        if self.is_online() {
            match call.await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(kind = %kind, id, error = %err, "delete failed, queueing");
                }
            }
        }

        self.store.lock().await.enqueue(&payload)?;
        Ok(())
    }
}

/// Rewrites every reference to a confirmed temp id: child rows are
/// reparented and every queued mutation mentioning the temp id is
/// rewritten in place. Runs exactly once, at confirmation time.
fn reconcile_temp_id(
    store: &CacheStore,
    kind: EntityKind,
    temp: &str,
    new_id: &str,
) -> Result<()> {
    if kind == EntityKind::Trip {
        store.reparent_children(temp, new_id)?;
    }
    for mutation in store.queued_mutations()? {
        let mut payload = mutation.payload.clone();
        if payload.rewrite_id(temp, new_id) {
            store.replace_mutation(mutation.id, &payload)?;
        }
    }
    info!(temp_id = temp, server_id = new_id, "reconciled temp id");
    Ok(())
}

fn decode_all<T: DeserializeOwned>(rows: Vec<CachedEntity>) -> Result<Vec<T>> {
    rows.iter().map(CachedEntity::decode).collect()
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
