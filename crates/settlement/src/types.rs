//! Settlement types for ledger operations

use equitycraft_core::{
    Amount, OutRef, PolicyId, PoolIndex, PoolStatus, SettlementStep, TokenIndex, TxId,
};

/// One burn/mint/debit request against one pool.
///
/// Carries its own precondition: the ledger applies it only if the pool
/// behind `pool_anchor` is active, holds at least `balance_delta`, and the
/// holder has `burn.1` at `burn.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRequest {
    pub policy: PolicyId,
    pub pool_index: PoolIndex,
    pub pool_anchor: OutRef,
    /// (index, amount) burned
    pub burn: (TokenIndex, Amount),
    /// (index, amount) minted
    pub mint: (TokenIndex, Amount),
    /// Amount debited from the pool
    pub balance_delta: Amount,
}

impl SettlementRequest {
    pub fn from_step(policy: PolicyId, pool_anchor: OutRef, step: &SettlementStep) -> Self {
        Self {
            policy,
            pool_index: step.pool.index,
            pool_anchor,
            burn: (step.burn_index, step.amount),
            mint: (step.mint_index, step.amount),
            balance_delta: step.balance_delta,
        }
    }
}

/// Outcome of waiting for a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    /// Not confirmed in time. The transaction may still commit.
    TimedOut,
}

/// A confirmed settlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRecord {
    pub pool_index: PoolIndex,
    pub tx: TxId,
    pub burn_index: TokenIndex,
    pub mint_index: TokenIndex,
    pub amount: Amount,
    pub balance_delta: Amount,
}

/// Pool status change observed while settling, to be persisted by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub pool_index: PoolIndex,
    pub from: PoolStatus,
    pub to: PoolStatus,
}

/// Result of a fully executed cascade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    /// One entry per settlement, in submission order
    pub settlements: Vec<SettlementRecord>,
    /// Index the withdrawn amount ended at (target pool + 1)
    pub final_index: TokenIndex,
    pub status_changes: Vec<StatusChange>,
}

impl TxReceipt {
    pub fn transaction_ids(&self) -> Vec<TxId> {
        self.settlements.iter().map(|s| s.tx).collect()
    }

    /// Total debited across all pools
    pub fn total_debited(&self) -> Amount {
        self.settlements.iter().map(|s| s.balance_delta).sum()
    }
}

/// Holder balances around one settlement, captured right before submission.
///
/// Used after a confirmation timeout to tell from fresh holdings whether the
/// settlement committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldingProbe {
    pub policy: PolicyId,
    pub pool_index: PoolIndex,
    pub burn_index: TokenIndex,
    pub mint_index: TokenIndex,
    pub amount: Amount,
    /// Held at `burn_index` before submission
    pub burn_before: Amount,
    /// Held at `mint_index` before submission
    pub mint_before: Amount,
}

/// What fresh holdings say about an unconfirmed settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// The burn and mint are visible; the amount sits at the mint index
    Committed { current_index: TokenIndex },
    /// Holdings unchanged; the amount is still at the burn index
    NotCommitted { current_index: TokenIndex },
}

impl SettlementOutcome {
    pub fn current_index(&self) -> TokenIndex {
        match self {
            SettlementOutcome::Committed { current_index }
            | SettlementOutcome::NotCommitted { current_index } => *current_index,
        }
    }
}

/// Inputs from which the pool registry derives a new pool's anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorInputs {
    /// Reference script output of the equity minting policy
    pub equity_script: OutRef,
    /// One-shot output consumed to make the pool script unique
    pub seed: OutRef,
}
