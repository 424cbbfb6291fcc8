// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Debt settlement optimizer.
//!
//! Pure function turning net balances into a minimal ordered list of
//! repayment transactions. Greedy largest-debtor/largest-creditor pairing
//! produces at most `n - 1` transactions for `n` nonzero balances; ties
//! break by participant id so the output is reproducible across devices.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Amounts closer to zero than this are treated as settled.
const ZERO_EPSILON: f64 = 1e-9;

/// Tolerance for the balances-sum-to-zero validation (one cent).
const SUM_EPSILON: f64 = 0.01;

/// A proposed repayment from one participant to another.
///
/// Not persisted; the consumer may submit it as a real Settlement entity.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementTx {
    pub from_user_id: String,
    pub to_user_id: String,
    pub amount: f64,
    pub currency: String,
}

/// Computes settlement transactions that zero every balance.
///
/// Rejects non-finite balances and balances that do not sum to
/// approximately zero; no partial output is produced on invalid input.
pub fn optimize(balances: &BTreeMap<String, f64>, currency: &str) -> Result<Vec<SettlementTx>> {
    for (participant, amount) in balances {
        if !amount.is_finite() {
            return Err(Error::InvalidBalances(format!(
                "balance for '{participant}' is not finite"
            )));
        }
    }

    let total: f64 = balances.values().sum();
    if total.abs() > SUM_EPSILON {
        return Err(Error::InvalidBalances(format!(
            "balances sum to {total:.2}, expected ~0"
        )));
    }

    // (id, remaining magnitude); zero balances are discarded up front.
    let mut creditors: Vec<(String, f64)> = Vec::new();
    let mut debtors: Vec<(String, f64)> = Vec::new();
    for (participant, &amount) in balances {
        if amount > ZERO_EPSILON {
            creditors.push((participant.clone(), amount));
        } else if amount < -ZERO_EPSILON {
            debtors.push((participant.clone(), -amount));
        }
    }

    let mut transactions = Vec::new();
    while !debtors.is_empty() && !creditors.is_empty() {
        let di = largest(&debtors);
        let ci = largest(&creditors);
        let amount = debtors[di].1.min(creditors[ci].1);

        transactions.push(SettlementTx {
            from_user_id: debtors[di].0.clone(),
            to_user_id: creditors[ci].0.clone(),
            amount,
            currency: currency.to_string(),
        });

        debtors[di].1 -= amount;
        creditors[ci].1 -= amount;
        if debtors[di].1 <= ZERO_EPSILON {
            debtors.remove(di);
        }
        if creditors[ci].1 <= ZERO_EPSILON {
            creditors.remove(ci);
        }
    }

    Ok(transactions)
}

/// Index of the entry with the largest remaining amount, ties broken by
/// participant id ascending.
fn largest(entries: &[(String, f64)]) -> usize {
    let mut best = 0;
    for (i, entry) in entries.iter().enumerate().skip(1) {
        let (best_id, best_amount) = &entries[best];
        if entry.1 > *best_amount || (entry.1 == *best_amount && entry.0 < *best_id) {
            best = i;
        }
    }
    best
}

#[cfg(test)]
#[path = "settle_tests.rs"]
mod tests;
