// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;

fn expense(amount: f64, paid_by: &str, split: &[&str], settled: &[&str]) -> Expense {
    Expense {
        id: "exp-1".into(),
        trip_id: "trip-1".into(),
        title: "Ferry".into(),
        amount,
        currency: "EUR".into(),
        paid_by: paid_by.into(),
        split_among: split.iter().map(|s| s.to_string()).collect(),
        settled_by: settled.iter().map(|s| s.to_string()).collect(),
    }
}

fn settlement(from: &str, to: &str, amount: f64) -> Settlement {
    Settlement {
        id: "set-1".into(),
        trip_id: "trip-1".into(),
        from_user_id: from.into(),
        to_user_id: to.into(),
        amount,
        currency: "EUR".into(),
    }
}

#[test]
fn even_split_credits_payer() {
    let balances = net_balances(&[expense(30.0, "ana", &["ana", "bo", "cy"], &[])], &[]);
    assert_eq!(balances["ana"], 20.0);
    assert_eq!(balances["bo"], -10.0);
    assert_eq!(balances["cy"], -10.0);
    assert!(balances.values().sum::<f64>().abs() < 1e-9);
}

#[test]
fn settled_share_moves_back() {
    let balances = net_balances(&[expense(30.0, "ana", &["ana", "bo", "cy"], &["bo"])], &[]);
    // bo already paid ana back outside the ledger.
    assert_eq!(balances["ana"], 10.0);
    assert_eq!(balances["bo"], 0.0);
    assert_eq!(balances["cy"], -10.0);
}

#[test]
fn settling_the_payer_is_a_noop() {
    let with = net_balances(&[expense(30.0, "ana", &["ana", "bo"], &["ana"])], &[]);
    let without = net_balances(&[expense(30.0, "ana", &["ana", "bo"], &[])], &[]);
    assert_eq!(with, without);
}

#[test]
fn settled_by_non_member_is_ignored() {
    let with = net_balances(&[expense(30.0, "ana", &["ana", "bo"], &["zed"])], &[]);
    let without = net_balances(&[expense(30.0, "ana", &["ana", "bo"], &[])], &[]);
    assert_eq!(with, without);
}

#[test]
fn settlements_reduce_debt() {
    let balances = net_balances(
        &[expense(30.0, "ana", &["ana", "bo", "cy"], &[])],
        &[settlement("bo", "ana", 10.0)],
    );
    assert_eq!(balances["ana"], 10.0);
    assert_eq!(balances["bo"], 0.0);
    assert_eq!(balances["cy"], -10.0);
}

#[test]
fn empty_split_is_skipped() {
    let balances = net_balances(&[expense(30.0, "ana", &[], &[])], &[]);
    assert!(balances.is_empty());
}

#[test]
fn multiple_expenses_accumulate() {
    let balances = net_balances(
        &[
            expense(20.0, "ana", &["ana", "bo"], &[]),
            expense(10.0, "bo", &["ana", "bo"], &[]),
        ],
        &[],
    );
    assert_eq!(balances["ana"], 5.0);
    assert_eq!(balances["bo"], -5.0);
}
