// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! roam-core: Foundation for the roam offline-first trip planner
//!
//! This crate provides the durable offline cache, the mutation queue, the
//! temp-id scheme, and the balance/settlement math used by the roam-sync
//! coordinator. Everything here is synchronous and network-free.

pub mod balance;
pub mod entity;
pub mod error;
pub mod mutation;
pub mod queue;
pub mod settle;
pub mod store;
pub mod temp_id;

pub use balance::{net_balances, BalanceSummary};
pub use entity::{
    CachedEntity, ChecklistItem, EntityKey, EntityKind, Expense, Note, Participant, Settlement,
    Trip,
};
pub use error::{Error, Result};
pub use mutation::{Mutation, MutationPayload};
pub use settle::{optimize, SettlementTx};
pub use store::{CacheStore, StorageInfo, DEFAULT_QUOTA_BYTES};
