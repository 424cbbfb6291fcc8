// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! roam-sync: Offline-first sync engine for the roam trip planner
//!
//! This crate orchestrates the durable cache and mutation queue from
//! roam-core: optimistic reads and writes, queued replay with temp-id
//! reconciliation, and connectivity-driven sync passes.

pub mod config;
pub mod coordinator;
pub mod gateway;
pub mod monitor;
#[cfg(test)]
pub(crate) mod test_gateway;

pub use config::SyncConfig;
pub use coordinator::{SyncCoordinator, SyncReport};
pub use gateway::{Gateway, GatewayError, GatewayResult};
pub use monitor::NetworkMonitor;
