//! Withdrawal orchestration
//!
//! Drives a [`CascadePlan`] against a [`LedgerService`]: one settlement per
//! pool, strictly in order, each confirmed before the next is submitted.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use equitycraft_core::{CascadePlan, OutRef, PolicyId, PoolStatus, SettlementStep};

use crate::{
    CascadeProgress, Confirmation, HoldingProbe, LedgerService, Result, SettlementError,
    SettlementOutcome, SettlementRecord, SettlementRequest, StatusChange, TxReceipt,
    WithdrawalError,
};

/// How long to wait for each settlement to confirm
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(40);

#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Bound on each ledger call of a settlement: the pool reads, the
    /// submission and the confirmation wait
    pub confirmation_timeout: Duration,
    /// Honoured until a settlement is submitted; a submitted settlement is
    /// never abandoned
    pub cancel: CancellationToken,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }
}

impl ExecuteOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            confirmation_timeout: timeout,
            ..Self::default()
        }
    }
}

/// Executes cascades for one holder under one equity policy
pub struct WithdrawalOrchestrator {
    ledger: Arc<dyn LedgerService>,
    policy: PolicyId,
}

impl WithdrawalOrchestrator {
    pub fn new(ledger: Arc<dyn LedgerService>, policy: PolicyId) -> Self {
        Self { ledger, policy }
    }

    pub fn policy(&self) -> &PolicyId {
        &self.policy
    }

    /// Execute every settlement of `plan`.
    ///
    /// Stops at the first failure. Settlements confirmed before it stay
    /// committed and are reported in the error's progress.
    pub async fn execute(
        &self,
        plan: &CascadePlan,
        options: &ExecuteOptions,
    ) -> std::result::Result<TxReceipt, WithdrawalError> {
        let steps = plan.settlement_steps();
        info!(
            "Executing cascade: {} from index {} to pool {} ({} settlement(s))",
            plan.amount,
            plan.source_index,
            plan.target_pool_index,
            steps.len(),
        );

        let mut progress = CascadeProgress {
            completed: 0,
            current_index: plan.source_index,
            settlements: Vec::with_capacity(steps.len()),
        };
        let mut status_changes = Vec::new();

        for step in &steps {
            if options.cancel.is_cancelled() {
                info!("Cascade cancelled before pool {}", step.pool.index);
                return Err(WithdrawalError::Cancelled { progress });
            }

            let prepared = tokio::select! {
                biased;
                _ = options.cancel.cancelled() => {
                    info!("Cascade cancelled while reading pool {}", step.pool.index);
                    return Err(WithdrawalError::Cancelled { progress });
                }
                prepared = tokio::time::timeout(options.confirmation_timeout, self.prepare(step)) => prepared,
            };
            let (probe, live_anchor) = match prepared {
                Ok(Ok(prepared)) => prepared,
                Ok(Err(source)) => return Err(failure(step, progress, source)),
                Err(_) => {
                    let source = SettlementError::Timeout(format!(
                        "pool {} state not read within {:?}",
                        step.pool.index, options.confirmation_timeout
                    ));
                    return Err(failure(step, progress, source));
                }
            };

            // From here on the settlement may reach the ledger, so only the
            // timeout can end the wait
            let request = SettlementRequest::from_step(self.policy, live_anchor, step);
            let submitted = tokio::time::timeout(
                options.confirmation_timeout,
                self.ledger.submit_settlement(request),
            )
            .await;
            let tx = match submitted {
                Ok(Ok(tx)) => tx,
                Ok(Err(source)) => return Err(failure(step, progress, source)),
                Err(_) => {
                    warn!(
                        "Submission on pool {} not acknowledged within {:?}",
                        step.pool.index, options.confirmation_timeout
                    );
                    return Err(WithdrawalError::TimedOut {
                        pool_index: step.pool.index,
                        tx: None,
                        probe,
                        progress,
                    });
                }
            };
            debug!("Submitted settlement on pool {}: {}", step.pool.index, hex::encode(tx));

            let confirmation = tokio::time::timeout(
                options.confirmation_timeout,
                self.ledger.await_confirmation(&tx, options.confirmation_timeout),
            )
            .await
            .unwrap_or(Ok(Confirmation::TimedOut));
            match confirmation {
                Ok(Confirmation::Confirmed) => {}
                Ok(Confirmation::TimedOut) => {
                    warn!(
                        "Settlement on pool {} not confirmed within {:?}",
                        step.pool.index, options.confirmation_timeout
                    );
                    return Err(WithdrawalError::TimedOut {
                        pool_index: step.pool.index,
                        tx: Some(tx),
                        probe,
                        progress,
                    });
                }
                Err(source) => {
                    warn!(
                        "Confirmation of {} on pool {} failed: {}",
                        hex::encode(tx),
                        step.pool.index,
                        source
                    );
                    return Err(failure(step, progress, source));
                }
            }

            progress.settlements.push(SettlementRecord {
                pool_index: step.pool.index,
                tx,
                burn_index: step.burn_index,
                mint_index: step.mint_index,
                amount: step.amount,
                balance_delta: step.balance_delta,
            });
            progress.completed += 1;
            progress.current_index = step.mint_index;

            if !step.is_pass_through() {
                self.observe_completion(step, &mut status_changes).await;
            }
        }

        info!(
            "Cascade complete: {} now at index {}",
            plan.amount, progress.current_index
        );
        Ok(TxReceipt {
            settlements: progress.settlements,
            final_index: plan.final_index(),
            status_changes,
        })
    }

    /// Check the live pool and capture holdings before submitting `step`.
    ///
    /// Returns the probe and the pool's live anchor.
    async fn prepare(&self, step: &SettlementStep) -> Result<(HoldingProbe, OutRef)> {
        let live = self.ledger.get_pool(&self.policy, step.pool.index).await?;
        if !live.is_active() {
            return Err(SettlementError::PoolNotReady {
                index: live.index,
                reason: format!("pool is {}", live.status),
            });
        }
        if live.total_amount < step.balance_delta {
            return Err(SettlementError::InsufficientPoolBalance {
                index: live.index,
                balance: live.total_amount,
                requested: step.balance_delta,
            });
        }

        let holding = self.ledger.get_holdings(&self.policy).await?;
        let probe = HoldingProbe {
            policy: self.policy,
            pool_index: step.pool.index,
            burn_index: step.burn_index,
            mint_index: step.mint_index,
            amount: step.amount,
            burn_before: holding.amount_at(step.burn_index),
            mint_before: holding.amount_at(step.mint_index),
        };
        Ok((probe, live.anchor))
    }

    async fn observe_completion(&self, step: &SettlementStep, changes: &mut Vec<StatusChange>) {
        match self.ledger.get_pool(&self.policy, step.pool.index).await {
            Ok(live) if live.status == PoolStatus::Completed => {
                info!("Pool {} fully drained", live.index);
                changes.push(StatusChange {
                    pool_index: live.index,
                    from: PoolStatus::Active,
                    to: PoolStatus::Completed,
                });
            }
            Ok(_) => {}
            Err(e) => warn!("Could not re-read pool {} after settlement: {}", step.pool.index, e),
        }
    }
}

fn failure(step: &SettlementStep, progress: CascadeProgress, source: SettlementError) -> WithdrawalError {
    warn!("Cascade failed at pool {}: {}", step.pool.index, source);
    WithdrawalError::PartialCascadeFailure {
        failed_at_index: step.pool.index,
        progress,
        source,
    }
}

/// Decide from fresh holdings whether a timed-out settlement committed.
///
/// Committed when the mint index grew by the amount and the burn index
/// shrank by it. Anything else is treated as not committed.
pub async fn reconcile(probe: &HoldingProbe, ledger: &dyn LedgerService) -> Result<SettlementOutcome> {
    let holding = ledger.get_holdings(&probe.policy).await?;
    let mint_now = holding.amount_at(probe.mint_index);
    let burn_now = holding.amount_at(probe.burn_index);

    let minted = mint_now >= probe.mint_before.saturating_add(probe.amount);
    let burned = burn_now.saturating_add(probe.amount) <= probe.burn_before;

    let outcome = if minted && burned {
        SettlementOutcome::Committed {
            current_index: probe.mint_index,
        }
    } else {
        SettlementOutcome::NotCommitted {
            current_index: probe.burn_index,
        }
    };
    info!("Reconciled settlement on pool {}: {:?}", probe.pool_index, outcome);
    Ok(outcome)
}
