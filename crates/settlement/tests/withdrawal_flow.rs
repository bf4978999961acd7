//! Withdrawal flow integration tests
//!
//! Runs the plan → settle → confirm pipeline end to end against the
//! in-memory ledger:
//! 1. Multi-pool cascade from index 0 to a later pool
//! 2. Planning against a completed pool
//! 3. Confirmation timeout, reconciliation and resume
//! 4. Many holders draining one pool concurrently
//! 5. Rejection half-way through a cascade
//! 6. Cancellation between settlements

use std::sync::Arc;
use std::time::Duration;

use equitycraft_core::{
    plan, plan_for_holding, Amount, CoreError, OutRef, PolicyId, Pool, PoolIndex, PoolStatus,
};
use equitycraft_settlement::{
    reconcile, ExecuteOptions, LedgerConfig, LedgerService, MemoryLedger, SettlementError,
    SettlementOutcome, WithdrawalError, WithdrawalOrchestrator,
};

const POLICY: PolicyId = PolicyId([0xe0; 28]);

fn holder(seed: u8) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[0] = seed;
    key[1] = 0xEC;
    key
}

fn pool(index: PoolIndex, amount: Amount) -> Pool {
    Pool {
        index,
        name: format!("Period {index}"),
        description: format!("Rewards for period {index}"),
        anchor: OutRef::new([0x50 + index as u8; 32], 0),
        total_amount: amount,
        status: PoolStatus::Active,
    }
}

/// Ledger with `pools` funded and holder 1 bound
fn ledger_with(pools: &[Pool], config: LedgerConfig) -> MemoryLedger {
    equitycraft_logging::init_test();
    let ledger = MemoryLedger::new(config, holder(1));
    for p in pools {
        ledger.add_pool(POLICY, p.clone()).unwrap();
    }
    ledger
}

// ── Scenario 1: cascade across intermediate pools ───────────────────────────

#[tokio::test]
async fn test_cascade_from_index_zero_to_pool_two() {
    let pools = vec![pool(0, 10_000), pool(1, 10_000), pool(2, 10_000)];
    let ledger = ledger_with(&pools, LedgerConfig::instant());
    ledger.credit(POLICY, 0, 5_000).unwrap();

    let holding = ledger.get_holdings(&POLICY).await.unwrap();
    let plan = plan_for_holding(&holding, &pools[2], &pools, 1_200, None).unwrap();
    assert_eq!(
        plan.intermediate_pools.iter().map(|p| p.index).collect::<Vec<_>>(),
        vec![0, 1]
    );

    let orchestrator = WithdrawalOrchestrator::new(Arc::new(ledger.clone()), POLICY);
    let receipt = orchestrator
        .execute(&plan, &ExecuteOptions::default())
        .await
        .unwrap();

    let order: Vec<_> = receipt.settlements.iter().map(|s| s.pool_index).collect();
    assert_eq!(order, vec![0, 1, 2]);
    assert_eq!(receipt.final_index, 3);
    assert_eq!(receipt.total_debited(), 1_200);

    assert_eq!(ledger.pool_balance(&POLICY, 0), Some(10_000));
    assert_eq!(ledger.pool_balance(&POLICY, 1), Some(10_000));
    assert_eq!(ledger.pool_balance(&POLICY, 2), Some(8_800));

    let after = ledger.get_holdings(&POLICY).await.unwrap();
    assert_eq!(after.amount_at(0), 3_800);
    assert_eq!(after.amount_at(3), 1_200);
    assert_eq!(after.total(), 5_000);
}

// ── Scenario 2: completed target ────────────────────────────────────────────

#[tokio::test]
async fn test_completed_pool_is_unavailable() {
    let mut completed = pool(1, 0);
    completed.status = PoolStatus::Completed;
    let pools = vec![pool(0, 1_000), completed.clone()];
    let ledger = ledger_with(&pools, LedgerConfig::instant());
    ledger.credit(POLICY, 1, 100).unwrap();

    let holding = ledger.get_holdings(&POLICY).await.unwrap();
    let result = plan_for_holding(&holding, &completed, &pools, 100, None);

    assert_eq!(result, Err(CoreError::PoolUnavailable(1)));
    assert_eq!(ledger.transaction_count(), 0);
}

// ── Scenario 3: timeout, reconcile, resume ──────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_timeout_reconcile_and_resume() {
    let pools = vec![pool(0, 10_000), pool(1, 10_000), pool(2, 10_000)];
    let ledger = ledger_with(&pools, LedgerConfig::with_latency(Duration::from_millis(50)));
    ledger.credit(POLICY, 0, 5_000).unwrap();
    ledger.withhold_confirmation(POLICY, 2);

    let plan = plan(0, &pools[2], &pools, 1_200).unwrap();
    let orchestrator = WithdrawalOrchestrator::new(Arc::new(ledger.clone()), POLICY);
    let options = ExecuteOptions::with_timeout(Duration::from_secs(40));

    let err = orchestrator.execute(&plan, &options).await.unwrap_err();
    let WithdrawalError::TimedOut {
        pool_index,
        probe,
        progress,
        ..
    } = err
    else {
        panic!("expected a timeout");
    };
    assert_eq!(pool_index, 2);
    assert_eq!(progress.completed, 2);
    assert_eq!(progress.current_index, 2);

    // The withheld settlement did commit; holdings show it
    let outcome = reconcile(&probe, &ledger).await.unwrap();
    assert_eq!(outcome, SettlementOutcome::Committed { current_index: 3 });
    assert!(plan.resume_from(outcome.current_index()).is_none());
    assert_eq!(ledger.pool_balance(&POLICY, 2), Some(8_800));
}

#[tokio::test(start_paused = true)]
async fn test_resume_after_slow_confirmation() {
    let pools = vec![pool(0, 10_000), pool(1, 10_000)];
    let ledger = ledger_with(&pools, LedgerConfig::with_latency(Duration::from_secs(90)));
    ledger.credit(POLICY, 0, 400).unwrap();

    let plan = plan(0, &pools[1], &pools, 400).unwrap();
    let orchestrator = WithdrawalOrchestrator::new(Arc::new(ledger.clone()), POLICY);

    let err = orchestrator
        .execute(&plan, &ExecuteOptions::default())
        .await
        .unwrap_err();
    let WithdrawalError::TimedOut { probe, .. } = err else {
        panic!("expected a timeout");
    };

    // Slow confirmation, but the first settlement went through
    let outcome = reconcile(&probe, &ledger).await.unwrap();
    assert_eq!(outcome.current_index(), 1);

    let rest = plan.resume_from(outcome.current_index()).unwrap();
    assert!(rest.is_direct());

    let long_wait = ExecuteOptions::with_timeout(Duration::from_secs(120));
    let receipt = orchestrator.execute(&rest, &long_wait).await.unwrap();

    assert_eq!(receipt.final_index, 2);
    let holding = ledger.get_holdings(&POLICY).await.unwrap();
    assert_eq!(holding.amount_at(2), 400);
    assert_eq!(ledger.pool_balance(&POLICY, 1), Some(9_600));
}

// ── Scenario 4: concurrent holders ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_holders_never_overdraw() {
    const HOLDERS: u8 = 8;
    let pools = vec![pool(0, 1_000)];
    let ledger = ledger_with(&pools, LedgerConfig::instant());

    let mut handles = Vec::new();
    for seed in 0..HOLDERS {
        let session = ledger.for_holder(holder(10 + seed));
        session.credit(POLICY, 0, 300).unwrap();
        let pools = pools.clone();
        handles.push(tokio::spawn(async move {
            let plan = plan(0, &pools[0], &pools, 300).unwrap();
            WithdrawalOrchestrator::new(Arc::new(session), POLICY)
                .execute(&plan, &ExecuteOptions::default())
                .await
        }));
    }

    let results = futures::future::join_all(handles).await;
    let succeeded = results
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter(|result| result.is_ok())
        .count();

    // 3 × 300 fits in 1 000; a fourth never does
    assert_eq!(succeeded, 3);
    assert_eq!(ledger.pool_balance(&POLICY, 0), Some(100));
}

#[tokio::test]
async fn test_loser_of_race_keeps_tokens() {
    let pools = vec![pool(0, 500)];
    let ledger = ledger_with(&pools, LedgerConfig::instant());
    let alice = ledger.for_holder(holder(2));
    let bob = ledger.for_holder(holder(3));
    alice.credit(POLICY, 0, 500).unwrap();
    bob.credit(POLICY, 0, 500).unwrap();

    let plan = plan(0, &pools[0], &pools, 500).unwrap();
    WithdrawalOrchestrator::new(Arc::new(alice.clone()), POLICY)
        .execute(&plan, &ExecuteOptions::default())
        .await
        .unwrap();

    let err = WithdrawalOrchestrator::new(Arc::new(bob.clone()), POLICY)
        .execute(&plan, &ExecuteOptions::default())
        .await
        .unwrap_err();

    // Alice drained the pool, so Bob sees it completed
    assert!(matches!(
        err,
        WithdrawalError::PartialCascadeFailure {
            source: SettlementError::PoolNotReady { index: 0, .. },
            ..
        }
    ));
    assert_eq!(bob.get_holdings(&POLICY).await.unwrap().amount_at(0), 500);
}

// ── Scenario 5: partial failure ─────────────────────────────────────────────

#[tokio::test]
async fn test_partial_failure_reports_progress() {
    let pools = vec![pool(0, 1_000), pool(1, 1_000), pool(2, 1_000), pool(3, 1_000)];
    let ledger = ledger_with(&pools, LedgerConfig::instant());
    ledger.credit(POLICY, 0, 250).unwrap();
    ledger.reject_next_settlement(POLICY, 2, "pool script failed");

    let plan = plan(0, &pools[3], &pools, 250).unwrap();
    let err = WithdrawalOrchestrator::new(Arc::new(ledger.clone()), POLICY)
        .execute(&plan, &ExecuteOptions::default())
        .await
        .unwrap_err();

    assert!(!err.is_retryable());
    assert_eq!(err.current_index(), Some(2));
    match &err {
        WithdrawalError::PartialCascadeFailure {
            failed_at_index,
            progress,
            ..
        } => {
            assert_eq!(*failed_at_index, 2);
            assert_eq!(progress.settlements.len(), 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // Resuming from where the tokens sit finishes the withdrawal
    let rest = plan.resume_from(2).unwrap();
    let receipt = WithdrawalOrchestrator::new(Arc::new(ledger.clone()), POLICY)
        .execute(&rest, &ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(receipt.final_index, 4);
    assert_eq!(ledger.pool_balance(&POLICY, 3), Some(750));
}

// ── Scenario 6: cancellation ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_cascade() {
    let pools = vec![pool(0, 1_000), pool(1, 1_000), pool(2, 1_000)];
    let ledger = ledger_with(&pools, LedgerConfig::with_latency(Duration::from_secs(1)));
    ledger.credit(POLICY, 0, 100).unwrap();

    let plan = plan(0, &pools[2], &pools, 100).unwrap();
    let options = ExecuteOptions::default();
    let cancel = options.cancel.clone();
    let orchestrator = WithdrawalOrchestrator::new(Arc::new(ledger.clone()), POLICY);

    let canceller = async {
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        cancel.cancel();
    };
    let (result, ()) = tokio::join!(orchestrator.execute(&plan, &options), canceller);

    let err = result.unwrap_err();
    assert!(matches!(err, WithdrawalError::Cancelled { .. }));
    // Second settlement was in flight at cancel time and still confirmed
    assert_eq!(err.current_index(), Some(2));
    assert_eq!(ledger.pool_balance(&POLICY, 2), Some(1_000));
}
