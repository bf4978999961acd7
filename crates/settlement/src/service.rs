//! Service seams between the core protocol and the outside world.
//!
//! Everything that touches a live ledger or provisions scripts goes
//! through these traits, so the orchestrator can run against a real
//! chain gateway or the in-memory ledger unchanged.

use std::time::Duration;

use async_trait::async_trait;

use equitycraft_core::{Amount, EquityHolding, OutRef, PolicyId, Pool, PoolIndex, TokenIndex, TxId};

use crate::{AnchorInputs, Confirmation, Result, SettlementRequest};

/// Ledger access for one holder session.
///
/// `submit_settlement` is the only write path for pool balances. The
/// precondition (pool active, balance covers the delta, token held at the
/// burn index) and the mutation travel in one request, so the ledger
/// decides conflicts between concurrent holders.
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Holder's equity under `policy`, aggregated by index
    async fn get_holdings(&self, policy: &PolicyId) -> Result<EquityHolding>;

    /// Live pool state; `total_amount` is the remaining balance
    async fn get_pool(&self, policy: &PolicyId, index: PoolIndex) -> Result<Pool>;

    /// Submit one burn/mint/debit settlement.
    ///
    /// Fails with `SettlementRejected` on any precondition mismatch.
    async fn submit_settlement(&self, request: SettlementRequest) -> Result<TxId>;

    /// Wait for a settlement from `submit_settlement` to confirm.
    ///
    /// `TimedOut` means the outcome is unknown. An error means the ledger
    /// could not track `tx` at all.
    async fn await_confirmation(&self, tx: &TxId, timeout: Duration) -> Result<Confirmation>;

    /// Mint fresh equity at index 0
    async fn submit_mint(&self, policy: &PolicyId, amount: Amount) -> Result<TxId>;

    /// Burn at `burn.0`, mint at `mint.0`, no pool involved
    async fn submit_advance(
        &self,
        policy: &PolicyId,
        burn: (TokenIndex, Amount),
        mint: (TokenIndex, Amount),
    ) -> Result<TxId>;
}

/// Resolves the on-ledger anchor of a new pool
#[async_trait]
pub trait PoolRegistryService: Send + Sync {
    /// Fails with `AnchorNotFound` if the inputs do not resolve
    async fn resolve_anchor(&self, inputs: &AnchorInputs) -> Result<OutRef>;
}
