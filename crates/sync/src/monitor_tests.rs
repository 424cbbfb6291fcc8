// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use roam_core::CacheStore;

use crate::config::SyncConfig;
use crate::coordinator::SyncCoordinator;
use crate::test_gateway::MockGateway;

use super::*;

fn engine() -> Arc<SyncCoordinator<MockGateway>> {
    Arc::new(SyncCoordinator::new(
        MockGateway::new(),
        CacheStore::open_in_memory().unwrap(),
        SyncConfig::default(),
    ))
}

#[tokio::test]
async fn reports_the_latest_state_and_absorbs_repeats() {
    let monitor = NetworkMonitor::new(true);
    assert!(monitor.is_online());

    let mut rx = monitor.subscribe();
    monitor.set_online(true);
    assert!(!rx.has_changed().unwrap());

    monitor.set_online(false);
    assert!(rx.has_changed().unwrap());
    assert!(!monitor.is_online());
}

#[tokio::test(start_paused = true)]
async fn reconnect_flap_collapses_into_one_sync_pass() {
    let engine = engine();
    engine.set_online(false);
    engine.delete_note("trip-1", "note-1").await.unwrap();
    assert!(engine.has_pending_sync().await.unwrap());

    let monitor = NetworkMonitor::new(false);
    let _task = monitor.spawn(engine.clone());
    tokio::task::yield_now().await;

    monitor.set_online(true);
    monitor.set_online(false);
    monitor.set_online(true);

    // Past the debounce window; well short of the periodic tick.
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert!(engine.is_online());
    assert_eq!(engine.gateway().calls_for("delete_note"), 1);
    assert!(!engine.has_pending_sync().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn going_offline_runs_no_pass() {
    let engine = engine();
    engine.set_online(false);
    engine.delete_note("trip-1", "note-1").await.unwrap();

    let monitor = NetworkMonitor::new(false);
    let _task = monitor.spawn(engine.clone());
    tokio::task::yield_now().await;

    // Still offline after the debounce window would have elapsed.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(engine.gateway().calls().is_empty());
    assert!(engine.has_pending_sync().await.unwrap());
    assert!(!engine.is_online());
}

#[tokio::test(start_paused = true)]
async fn periodic_tick_drains_the_queue_while_online() {
    let engine = engine();
    // Queue a delete by letting its direct call fail.
    engine.gateway().set_network_down(true);
    engine.delete_checklist_item("trip-1", "chk-1").await.unwrap();
    assert_eq!(engine.gateway().calls_for("delete_checklist_item"), 1);
    engine.gateway().set_network_down(false);

    let monitor = NetworkMonitor::new(true);
    let _task = monitor.spawn(engine.clone());
    tokio::task::yield_now().await;

    // No transition happens; the fallback timer has to pick it up.
    tokio::time::sleep(Duration::from_secs(31)).await;

    assert_eq!(engine.gateway().calls_for("delete_checklist_item"), 2);
    assert!(!engine.has_pending_sync().await.unwrap());
}
