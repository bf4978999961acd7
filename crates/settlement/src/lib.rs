//! EquityCraft Settlement
//!
//! Ledger-facing half of the reward pool protocol.
//!
//! ## Withdrawal Flow
//!
//! 1. **Plan**: `equitycraft_core::plan` orders the pools between the
//!    holder's token index and the target pool.
//! 2. **Settle**: [`WithdrawalOrchestrator`] submits one settlement per pool,
//!    in order, each burning the token at index `i` and minting the same
//!    amount at `i + 1`. Intermediate pools are zero-value pass-throughs;
//!    only the target pool is debited.
//! 3. **Confirm**: every settlement is confirmed before the next is
//!    submitted. A rejection stops the chain without rolling back what
//!    already committed; a confirmation timeout leaves the outcome unknown
//!    until the holder's holdings are re-queried ([`reconcile`]).
//!
//! ## Pool Issuance
//!
//! [`create_pool`] validates a new pool against the configured sequence and
//! resolves its anchor through a [`PoolRegistryService`]. Persisting the
//! returned pool is the caller's job.
//!
//! The ledger itself sits behind [`LedgerService`]; [`MemoryLedger`] is an
//! in-process implementation used for development, tests and the CLI.

mod equity;
mod issuance;
mod memory;
mod orchestrator;
mod service;
mod types;

pub use equity::{advance, issue_equity, INITIAL_EQUITY_SUPPLY};
pub use issuance::{create_pool, PoolRequest};
pub use memory::{HolderKey, LedgerConfig, MemoryLedger, MemoryPoolRegistry, MemorySnapshot};
pub use orchestrator::{
    reconcile, ExecuteOptions, WithdrawalOrchestrator, DEFAULT_CONFIRMATION_TIMEOUT,
};
pub use service::{LedgerService, PoolRegistryService};
pub use types::*;

use equitycraft_core::{CoreError, PolicyId, PoolIndex, TokenIndex};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("Settlement rejected: {0}")]
    SettlementRejected(String),

    #[error("Pool {index} not found for policy {policy}")]
    PoolNotFound { policy: PolicyId, index: PoolIndex },

    #[error("Pool {index} not ready: {reason}")]
    PoolNotReady { index: PoolIndex, reason: String },

    #[error("Pool {index} balance {balance} below requested {requested}")]
    InsufficientPoolBalance {
        index: PoolIndex,
        balance: u64,
        requested: u64,
    },

    #[error("Anchor not found: {0}")]
    AnchorNotFound(String),

    #[error("Duplicate pool index {0}")]
    DuplicateIndex(PoolIndex),

    #[error("Pool index {requested} leaves a gap; next index is {expected}")]
    IndexGap {
        expected: PoolIndex,
        requested: PoolIndex,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Ledger did not answer in time: {0}")]
    Timeout(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, SettlementError>;

/// Progress of a cascade at the moment it stopped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeProgress {
    /// Settlements confirmed before the stop
    pub completed: usize,
    /// Index the withdrawn amount sits at now
    pub current_index: TokenIndex,
    /// Confirmed settlements, in order
    pub settlements: Vec<SettlementRecord>,
}

/// Why a cascade did not finish.
///
/// Every variant carries the holder's progress: settlements that committed
/// before the failure are never rolled back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WithdrawalError {
    #[error("Withdrawal plan rejected: {0}")]
    Plan(#[from] CoreError),

    #[error("Cascade cancelled after {} settlement(s)", .progress.completed)]
    Cancelled { progress: CascadeProgress },

    #[error(
        "Cascade failed at pool {failed_at_index} after {} settlement(s): {source}",
        .progress.completed
    )]
    PartialCascadeFailure {
        failed_at_index: PoolIndex,
        progress: CascadeProgress,
        source: SettlementError,
    },

    /// Submitted (or possibly submitted) but never confirmed.
    ///
    /// `tx` is `None` when the submission itself did not return in time.
    #[error("Settlement on pool {pool_index} timed out; outcome unknown")]
    TimedOut {
        pool_index: PoolIndex,
        tx: Option<equitycraft_core::TxId>,
        probe: HoldingProbe,
        progress: CascadeProgress,
    },
}

impl WithdrawalError {
    /// Only a timeout may be retried, and only after [`reconcile`]
    pub fn is_retryable(&self) -> bool {
        matches!(self, WithdrawalError::TimedOut { .. })
    }

    pub fn progress(&self) -> Option<&CascadeProgress> {
        match self {
            WithdrawalError::Plan(_) => None,
            WithdrawalError::Cancelled { progress }
            | WithdrawalError::PartialCascadeFailure { progress, .. }
            | WithdrawalError::TimedOut { progress, .. } => Some(progress),
        }
    }

    /// Index of the withdrawn amount as far as confirmed settlements go.
    ///
    /// For `TimedOut` this excludes the unconfirmed settlement.
    pub fn current_index(&self) -> Option<TokenIndex> {
        self.progress().map(|p| p.current_index)
    }
}
