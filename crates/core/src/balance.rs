// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Net balance derivation from cached expenses and settlements.
//!
//! Balances are never persisted; they are recomputed on demand from
//! whatever the cache currently holds and stamped with the staleness of
//! that data. Positive means the participant is owed money, negative
//! means they owe.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::entity::{Expense, Settlement};

/// Derived per-participant balances for one trip, with staleness context.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceSummary {
    /// Participant id to signed net amount; BTreeMap for stable iteration.
    pub balances: BTreeMap<String, f64>,
    pub currency: String,
    pub computed_at: DateTime<Utc>,
    /// Last successful expense-collection sync the figures are based on,
    /// if the collection was ever fetched.
    pub based_on: Option<DateTime<Utc>>,
    /// True when computed without connectivity: a local approximation that
    /// cannot see collaborators' concurrent changes.
    pub offline: bool,
}

/// Computes net balances from expenses and settlements.
///
/// Each expense credits the payer with the full amount and debits every
/// split member an equal share. A member listed in `settled_by` has paid
/// the payer back outside the ledger, so their share moves back: their
/// debt and the payer's credit both shrink by one share. A settlement
/// transfers `amount` from the debtor (`from_user_id`, toward zero) to
/// the creditor (`to_user_id`).
pub fn net_balances(expenses: &[Expense], settlements: &[Settlement]) -> BTreeMap<String, f64> {
    let mut balances: BTreeMap<String, f64> = BTreeMap::new();

    for expense in expenses {
        if expense.split_among.is_empty() {
            continue;
        }
        let share = expense.amount / expense.split_among.len() as f64;

        *balances.entry(expense.paid_by.clone()).or_default() += expense.amount;
        for member in &expense.split_among {
            *balances.entry(member.clone()).or_default() -= share;
        }
        for member in &expense.settled_by {
            if member != &expense.paid_by && expense.split_among.contains(member) {
                *balances.entry(member.clone()).or_default() += share;
                *balances.entry(expense.paid_by.clone()).or_default() -= share;
            }
        }
    }

    for settlement in settlements {
        *balances.entry(settlement.from_user_id.clone()).or_default() += settlement.amount;
        *balances.entry(settlement.to_user_id.clone()).or_default() -= settlement.amount;
    }

    balances
}

#[cfg(test)]
#[path = "balance_tests.rs"]
mod tests;
