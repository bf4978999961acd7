//! EquityCraft Core
//!
//! Pure data model and planning logic for index-ratchet reward pools.
//!
//! ## Model
//!
//! Every equity token unit carries a period index (`<policy><index hex>`).
//! A holder can only withdraw from pool `k` with a token at index `k`, so a
//! token at a lower index must first be advanced through every pool between
//! its index and `k`. Each advance is one settlement: burn at `i`, mint the
//! same amount at `i + 1`.
//!
//! Nothing in this crate performs I/O. Live ledger state enters as snapshot
//! values ([`EquityHolding`], [`Pool`]) and leaves as a [`CascadePlan`] that the
//! settlement crate executes.
//!
//! - [`aggregate`] / [`qualifying_indices`]: token-index accounting
//! - [`project`] / [`PoolRegistry`]: per-pool view of what the holder can claim
//! - [`plan`] / [`plan_for_holding`]: the ordered settlement cascade

mod cascade;
mod holding;
mod registry;
mod types;

pub use cascade::{plan, plan_for_holding, CascadePlan, SettlementStep};
pub use holding::{aggregate, qualifying_indices, Aggregation, EquityHolding};
pub use registry::{project, PoolRegistry, PoolView};
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("malformed asset unit {unit}: {reason}")]
    MalformedUnit { unit: String, reason: String },

    #[error("pool {0} is not active")]
    PoolUnavailable(PoolIndex),

    #[error("no pool configured at index {0}")]
    PoolMissing(PoolIndex),

    #[error("duplicate pool index {0}")]
    DuplicateIndex(PoolIndex),

    #[error("token index {from} is above target pool {target}")]
    SourceAboveTarget { from: TokenIndex, target: PoolIndex },

    #[error("withdrawal amount must be non-zero")]
    ZeroAmount,

    #[error("insufficient holding at index {index}: requested {requested}, held {held}")]
    InsufficientHolding {
        index: TokenIndex,
        requested: Amount,
        held: Amount,
    },

    #[error("token index {index} does not qualify for pool {pool}")]
    NotQualifying { index: TokenIndex, pool: PoolIndex },

    #[error("no held token qualifies for pool {0}")]
    NoQualifyingToken(PoolIndex),

    #[error("settlement must mint {expected} at index {next}, got {actual} at index {actual_index}")]
    UnbalancedSettlement {
        expected: Amount,
        next: TokenIndex,
        actual: Amount,
        actual_index: TokenIndex,
    },

    #[error("token index {0} cannot be advanced further")]
    IndexExhausted(TokenIndex),

    #[error("invalid output reference: {0}")]
    InvalidOutRef(String),

    #[error("invalid policy id: {0}")]
    InvalidPolicyId(String),

    #[error("amount overflow")]
    Overflow,
}

pub type Result<T> = std::result::Result<T, CoreError>;
