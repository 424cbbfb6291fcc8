// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::store::CacheStore;
use serde_json::json;
use tempfile::TempDir;

fn delete_payload(id: &str) -> MutationPayload {
    MutationPayload::DeleteExpense {
        trip_id: "trip-1".into(),
        expense_id: id.into(),
    }
}

#[test]
fn enqueue_preserves_insertion_order() {
    let store = CacheStore::open_in_memory().unwrap();

    let a = store.enqueue(&delete_payload("exp-a")).unwrap();
    let b = store.enqueue(&delete_payload("exp-b")).unwrap();
    let c = store.enqueue(&delete_payload("exp-c")).unwrap();
    assert!(a < b && b < c);

    let queued = store.queued_mutations().unwrap();
    assert_eq!(queued.len(), 3);
    assert_eq!(queued[0].payload.entity_id(), "exp-a");
    assert_eq!(queued[1].payload.entity_id(), "exp-b");
    assert_eq!(queued[2].payload.entity_id(), "exp-c");
    assert_eq!(queued[0].retry_count, 0);
}

#[test]
fn order_survives_removal_in_the_middle() {
    let store = CacheStore::open_in_memory().unwrap();
    store.enqueue(&delete_payload("exp-a")).unwrap();
    let b = store.enqueue(&delete_payload("exp-b")).unwrap();
    store.enqueue(&delete_payload("exp-c")).unwrap();

    assert!(store.remove_mutation(b).unwrap());
    assert!(!store.remove_mutation(b).unwrap());

    let queued = store.queued_mutations().unwrap();
    assert_eq!(queued.len(), 2);
    assert_eq!(queued[0].payload.entity_id(), "exp-a");
    assert_eq!(queued[1].payload.entity_id(), "exp-c");
}

#[test]
fn retry_count_updates() {
    let store = CacheStore::open_in_memory().unwrap();
    let id = store.enqueue(&delete_payload("exp-a")).unwrap();

    store.update_retry_count(id, 2).unwrap();
    let queued = store.queued_mutations().unwrap();
    assert_eq!(queued[0].retry_count, 2);

    assert!(matches!(
        store.update_retry_count(999, 1),
        Err(Error::MutationNotFound(999))
    ));
}

#[test]
fn replace_mutation_keeps_position_and_retries() {
    let store = CacheStore::open_in_memory().unwrap();
    store.enqueue(&delete_payload("exp-a")).unwrap();
    let id = store
        .enqueue(&MutationPayload::UpdateExpense {
            trip_id: "trip-1".into(),
            expense_id: "temp-expense-1-x".into(),
            patch: json!({"amount": 12.0}),
        })
        .unwrap();
    store.update_retry_count(id, 1).unwrap();

    let mut rewritten = store.queued_mutations().unwrap()[1].payload.clone();
    assert!(rewritten.rewrite_id("temp-expense-1-x", "exp-42"));
    store.replace_mutation(id, &rewritten).unwrap();

    let queued = store.queued_mutations().unwrap();
    assert_eq!(queued[1].id, id);
    assert_eq!(queued[1].payload.entity_id(), "exp-42");
    assert_eq!(queued[1].retry_count, 1);
}

#[test]
fn queue_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.db");

    {
        let store = CacheStore::open(&path).unwrap();
        store.enqueue(&delete_payload("exp-a")).unwrap();
        store.enqueue(&delete_payload("exp-b")).unwrap();
    }

    {
        let store = CacheStore::open(&path).unwrap();
        let queued = store.queued_mutations().unwrap();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].payload.entity_id(), "exp-a");
        assert_eq!(store.pending_sync_count().unwrap(), 2);
    }
}
