// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connectivity monitor.
//!
//! Tracks online/offline transitions reported by the embedder, debounces
//! reconnect bursts into a single sync pass, and drives a periodic
//! fallback pass in case a transition event was missed. Purely event and
//! timer driven; nothing here blocks.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::coordinator::SyncCoordinator;
use crate::gateway::Gateway;

/// Watches connectivity and triggers the coordinator's sync passes.
pub struct NetworkMonitor {
    tx: watch::Sender<bool>,
}

impl NetworkMonitor {
    /// Creates a monitor with the given initial connectivity state.
    pub fn new(initially_online: bool) -> Self {
        let (tx, _) = watch::channel(initially_online);
        NetworkMonitor { tx }
    }

    /// Reports a connectivity transition (from the embedder's network
    /// events). Repeated reports of the same state are absorbed.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|state| {
            let changed = *state != online;
            *state = online;
            changed
        });
    }

    /// Returns the last reported connectivity state.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Returns a receiver observing connectivity transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Spawns the driver task: on every offline-to-online transition it
    /// waits out the debounce window, re-checks the latest state (so a
    /// flap collapses into at most one pass), and runs a sync pass; a
    /// periodic tick re-asserts the state and syncs while online.
    pub fn spawn<G: Gateway + 'static>(
        &self,
        coordinator: Arc<SyncCoordinator<G>>,
    ) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        let config = coordinator.config().clone();
        coordinator.set_online(*rx.borrow());

        tokio::spawn(async move {
            let mut tick = tokio::time::interval(config.poll_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick of an interval fires immediately; swallow it
            // so startup does not race the embedder's first report.
            tick.tick().await;

            loop {
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            debug!("network monitor channel closed, stopping");
                            return;
                        }
                        let online = *rx.borrow_and_update();
                        coordinator.set_online(online);
                        if !online {
                            debug!("went offline");
                            continue;
                        }
                        tokio::time::sleep(config.debounce).await;
                        let settled = *rx.borrow_and_update();
                        coordinator.set_online(settled);
                        if settled {
                            debug!("reconnected, running debounced sync pass");
                            if let Err(err) = coordinator.run_sync_pass().await {
                                warn!(error = %err, "debounced sync pass failed");
                            }
                        }
                    }
                    _ = tick.tick() => {
                        let online = *rx.borrow_and_update();
                        coordinator.set_online(online);
                        if online {
                            if let Err(err) = coordinator.run_sync_pass().await {
                                warn!(error = %err, "periodic sync pass failed");
                            }
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
