//! Concurrent deposits and withdrawals against a single account.
//!
//! These run on the multi-threaded runtime so conditional writes genuinely
//! race inside the memory backend. Task counts are kept small enough for the
//! default test run; the heavier storage-level stress tests live in
//! `coffer-storage/tests/concurrent_stress.rs` behind `#[ignore]`.

#![allow(clippy::expect_used, clippy::panic)]

use coffer_ledger::{Ledger, LedgerConfig, LedgerError, OwnerId};
use coffer_storage::{MemoryBackend, testutil::FaultyBackend};
use tokio::task::JoinSet;

/// Number of concurrent tasks in the mixed workload.
const CONCURRENCY: usize = 8;

/// Operations per task in the mixed workload.
const OPS_PER_TASK: usize = 12;

fn ledger_with_attempts(max_attempts: u32) -> Ledger<MemoryBackend> {
    let config = LedgerConfig::builder().max_attempts(max_attempts).build().expect("valid config");
    Ledger::new(MemoryBackend::new(), config).expect("valid ledger")
}

// ---------------------------------------------------------------------------
// Test: Two racing deposits both land
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_deposits_both_commit() {
    let ledger = ledger_with_attempts(5);
    let owner = OwnerId::generate();
    let account = ledger.open_account(owner).await.expect("open");

    let a = tokio::spawn({
        let ledger = ledger.clone();
        async move { ledger.deposit(account.id, 100, owner).await }
    });
    let b = tokio::spawn({
        let ledger = ledger.clone();
        async move { ledger.deposit(account.id, 50, owner).await }
    });
    let a = a.await.expect("task").expect("deposit 100");
    let b = b.await.expect("task").expect("deposit 50");

    let mut balances = [a.balance, b.balance];
    balances.sort_unstable();
    assert!(balances == [1050, 1150] || balances == [1100, 1150], "got {balances:?}");

    let report = ledger.inquire(account.id, owner).await.expect("inquire");
    assert_eq!(report.balance, 1150);

    let history = ledger.history(account.id, owner).await.expect("history");
    let mut amounts: Vec<u64> = history.deposits.iter().map(|d| d.amount).collect();
    amounts.sort_unstable();
    assert_eq!(amounts, vec![50, 100]);
}

// ---------------------------------------------------------------------------
// Test: Deterministic interleaving of the same race
// ---------------------------------------------------------------------------

/// The deposit of 50 lands between the read and the conditional write of the
/// deposit of 100. The loser must re-read and commit on top of the winner.
#[tokio::test]
async fn interleaved_deposit_is_not_lost() {
    let ledger = Ledger::new(FaultyBackend::new(MemoryBackend::new()), LedgerConfig::default())
        .expect("valid ledger");
    let owner = OwnerId::generate();
    let account = ledger.open_account(owner).await.expect("open");

    let competitor = ledger.clone();
    ledger.backend().interleave_once(move || async move {
        competitor.deposit(account.id, 50, owner).await.expect("competing deposit");
    });

    let receipt = ledger.deposit(account.id, 100, owner).await.expect("deposit");

    assert_eq!(receipt.balance, 1150);
    assert_eq!(receipt.attempts, 2);
    let history = ledger.history(account.id, owner).await.expect("history");
    let trail: Vec<(u64, u64)> =
        history.deposits.iter().map(|d| (d.amount, d.balance_after)).collect();
    assert_eq!(trail, vec![(50, 1050), (100, 1150)]);
}

// ---------------------------------------------------------------------------
// Test: Withdrawals never overdraw under contention
// ---------------------------------------------------------------------------

/// Twice as many withdrawals of 100 as the balance can cover race each other.
/// Exactly ten may succeed; the rest must see insufficient funds.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_withdrawals_never_overdraw() {
    let ledger = ledger_with_attempts(1_000);
    let owner = OwnerId::generate();
    let account = ledger.open_account(owner).await.expect("open");

    let mut set = JoinSet::new();
    for _ in 0..20 {
        let ledger = ledger.clone();
        set.spawn(async move { ledger.withdraw(account.id, 100, owner).await });
    }

    let mut successes = 0usize;
    let mut insufficient = 0usize;
    while let Some(result) = set.join_next().await {
        match result.expect("task should not panic") {
            Ok(_) => successes += 1,
            Err(LedgerError::InsufficientFunds { .. }) => insufficient += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(successes, 10);
    assert_eq!(insufficient, 10);
    let report = ledger.inquire(account.id, owner).await.expect("inquire");
    assert_eq!(report.balance, 0);
}

// ---------------------------------------------------------------------------
// Test: Mixed workload matches a serial application of its successes
// ---------------------------------------------------------------------------

/// Every reported success must be reflected in the final balance, and
/// nothing else. Conflicts that exhaust the attempt bound are allowed but
/// must leave no trace.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_workload_matches_successful_operations() {
    let ledger = ledger_with_attempts(5);
    let owner = OwnerId::generate();
    let account = ledger.open_account(owner).await.expect("open");

    let mut set = JoinSet::new();
    for task_id in 0..CONCURRENCY {
        let ledger = ledger.clone();
        set.spawn(async move {
            let mut net: i64 = 0;
            let mut deposits = 0usize;
            let mut withdrawals = 0usize;
            for i in 0..OPS_PER_TASK {
                let amount = ((task_id * OPS_PER_TASK + i) % 90 + 10) as u64;
                if (task_id + i) % 3 == 0 {
                    match ledger.withdraw(account.id, amount, owner).await {
                        Ok(_) => {
                            net -= amount as i64;
                            withdrawals += 1;
                        },
                        Err(
                            LedgerError::InsufficientFunds { .. }
                            | LedgerError::ConcurrentUpdateConflict { .. },
                        ) => {},
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                } else {
                    match ledger.deposit(account.id, amount, owner).await {
                        Ok(_) => {
                            net += amount as i64;
                            deposits += 1;
                        },
                        Err(LedgerError::ConcurrentUpdateConflict { .. }) => {},
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            }
            (net, deposits, withdrawals)
        });
    }

    let mut net = 0i64;
    let mut deposits = 0usize;
    let mut withdrawals = 0usize;
    while let Some(result) = set.join_next().await {
        let (n, d, w) = result.expect("task should not panic");
        net += n;
        deposits += d;
        withdrawals += w;
    }

    let report = ledger.inquire(account.id, owner).await.expect("inquire");
    assert_eq!(report.balance as i64, 1000 + net);

    let history = ledger.history(account.id, owner).await.expect("history");
    assert_eq!(history.deposits.len(), deposits);
    assert_eq!(history.withdrawals.len(), withdrawals);

    let snapshot = ledger.metrics().snapshot();
    assert_eq!(snapshot.commits as usize, deposits + withdrawals);
}
