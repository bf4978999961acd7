//! In-memory ledger for development and testing
//!
//! Implements [`LedgerService`] without a chain. All state lives behind one
//! `RwLock`, and every settlement is checked and applied under a single
//! write guard, which is what makes concurrent withdrawals from one pool
//! safe: the second of two conflicting settlements sees the first one's
//! debit and is rejected.
//!
//! Several holders can share one ledger: [`MemoryLedger::for_holder`]
//! returns a session over the same state with a different holder key.
//!
//! Failure injection (`reject_next_settlement`, `withhold_confirmation`)
//! exists so partial-cascade and timeout paths can be exercised.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use equitycraft_core::{
    Amount, AssetUnit, EquityHolding, OutRef, PolicyId, Pool, PoolIndex, PoolStatus, TokenIndex, TxId,
};

use crate::{
    AnchorInputs, Confirmation, LedgerService, PoolRegistryService, Result, SettlementError,
    SettlementRequest,
};

/// 32-byte holder (wallet) key
pub type HolderKey = [u8; 32];

/// In-memory ledger configuration
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Simulated time between submission and confirmation
    pub confirmation_latency: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            confirmation_latency: Duration::from_millis(20),
        }
    }
}

impl LedgerConfig {
    /// Transactions confirm immediately
    pub fn instant() -> Self {
        Self {
            confirmation_latency: Duration::ZERO,
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            confirmation_latency: latency,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    pools: HashMap<(PolicyId, PoolIndex), Pool>,
    holdings: HashMap<(HolderKey, PolicyId), EquityHolding>,
    /// Settlements awaiting confirmation; `true` if it is withheld
    transactions: HashMap<TxId, bool>,
    /// Next settlement against these pools is rejected with the reason
    injected_rejections: HashMap<(PolicyId, PoolIndex), String>,
    /// Next settlement against these pools commits but never confirms
    withheld_confirmations: HashSet<(PolicyId, PoolIndex)>,
    tx_counter: u64,
}

/// Serializable copy of the ledger's pools and holdings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub pools: Vec<(PolicyId, Pool)>,
    pub holdings: Vec<(HolderKey, PolicyId, EquityHolding)>,
    pub tx_counter: u64,
}

/// In-memory [`LedgerService`] bound to one holder
#[derive(Clone)]
pub struct MemoryLedger {
    config: LedgerConfig,
    holder: HolderKey,
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryLedger {
    pub fn new(config: LedgerConfig, holder: HolderKey) -> Self {
        Self {
            config,
            holder,
            state: Arc::new(RwLock::new(MemoryState::default())),
        }
    }

    /// Rebuild a ledger from a snapshot
    pub fn from_snapshot(config: LedgerConfig, holder: HolderKey, snapshot: MemorySnapshot) -> Self {
        let ledger = Self::new(config, holder);
        {
            let mut state = ledger.state.write();
            for (policy, pool) in snapshot.pools {
                state.pools.insert((policy, pool.index), pool);
            }
            for (holder, policy, holding) in snapshot.holdings {
                state.holdings.insert((holder, policy), holding);
            }
            state.tx_counter = snapshot.tx_counter;
        }
        ledger
    }

    /// Session for another holder over the same ledger state
    pub fn for_holder(&self, holder: HolderKey) -> Self {
        Self {
            config: self.config.clone(),
            holder,
            state: Arc::clone(&self.state),
        }
    }

    pub fn holder(&self) -> &HolderKey {
        &self.holder
    }

    pub fn snapshot(&self) -> MemorySnapshot {
        let state = self.state.read();
        let mut pools: Vec<_> = state
            .pools
            .iter()
            .map(|((policy, _), pool)| (*policy, pool.clone()))
            .collect();
        pools.sort_by(|a, b| (a.0, a.1.index).cmp(&(b.0, b.1.index)));

        let mut holdings: Vec<_> = state
            .holdings
            .iter()
            .filter(|(_, holding)| !holding.is_empty())
            .map(|((holder, policy), holding)| (*holder, *policy, holding.clone()))
            .collect();
        holdings.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        MemorySnapshot {
            pools,
            holdings,
            tx_counter: state.tx_counter,
        }
    }

    /// Derive a deterministic transaction id (when already holding the lock)
    fn next_tx_id(state: &mut MemoryState, tag: &[u8]) -> TxId {
        state.tx_counter += 1;
        let mut hasher = Sha256::new();
        hasher.update(b"memtxn!");
        hasher.update(state.tx_counter.to_le_bytes());
        hasher.update(tag);
        hasher.finalize().into()
    }

    // ==================== Mock Helpers ====================

    /// Fund a pool on the ledger
    pub fn add_pool(&self, policy: PolicyId, pool: Pool) -> Result<()> {
        let mut state = self.state.write();
        let key = (policy, pool.index);
        if state.pools.contains_key(&key) {
            return Err(SettlementError::DuplicateIndex(pool.index));
        }
        info!(
            "[MOCK] Pool {} '{}' funded with {} ({})",
            pool.index, pool.name, pool.total_amount, pool.status,
        );
        state.pools.insert(key, pool);
        Ok(())
    }

    /// Administrative status change (e.g. opening a pending pool)
    pub fn set_pool_status(&self, policy: &PolicyId, index: PoolIndex, status: PoolStatus) -> Result<()> {
        let mut state = self.state.write();
        let pool = state
            .pools
            .get_mut(&(*policy, index))
            .ok_or(SettlementError::PoolNotFound { policy: *policy, index })?;
        pool.status = status;
        Ok(())
    }

    /// Credit this holder directly (mock mode only, for testing)
    pub fn credit(&self, policy: PolicyId, index: TokenIndex, amount: Amount) -> Result<()> {
        let mut state = self.state.write();
        state
            .holdings
            .entry((self.holder, policy))
            .or_default()
            .credit(index, amount)?;
        Ok(())
    }

    /// Reject the next settlement against `pool_index`
    pub fn reject_next_settlement(&self, policy: PolicyId, pool_index: PoolIndex, reason: &str) {
        self.state
            .write()
            .injected_rejections
            .insert((policy, pool_index), reason.to_string());
    }

    /// Let the next settlement against `pool_index` commit without ever
    /// confirming
    pub fn withhold_confirmation(&self, policy: PolicyId, pool_index: PoolIndex) {
        self.state
            .write()
            .withheld_confirmations
            .insert((policy, pool_index));
    }

    pub fn pool_balance(&self, policy: &PolicyId, index: PoolIndex) -> Option<Amount> {
        self.state
            .read()
            .pools
            .get(&(*policy, index))
            .map(|pool| pool.total_amount)
    }

    /// Transactions accepted since the ledger was first created
    pub fn transaction_count(&self) -> u64 {
        self.state.read().tx_counter
    }

    /// Settlements submitted but not yet confirmed
    pub fn pending_confirmations(&self) -> usize {
        self.state.read().transactions.len()
    }

    /// Total equity held by all holders under `policy`
    pub fn equity_supply(&self, policy: &PolicyId) -> u128 {
        self.state
            .read()
            .holdings
            .iter()
            .filter(|((_, p), _)| p == policy)
            .map(|(_, holding)| holding.total())
            .sum()
    }
}

#[async_trait]
impl LedgerService for MemoryLedger {
    async fn get_holdings(&self, policy: &PolicyId) -> Result<EquityHolding> {
        debug!("Fetching holdings for {} under {}", hex::encode(&self.holder[..8]), policy);
        let state = self.state.read();
        Ok(state
            .holdings
            .get(&(self.holder, *policy))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_pool(&self, policy: &PolicyId, index: PoolIndex) -> Result<Pool> {
        debug!("Fetching pool {} under {}", index, policy);
        let state = self.state.read();
        state
            .pools
            .get(&(*policy, index))
            .cloned()
            .ok_or(SettlementError::PoolNotFound { policy: *policy, index })
    }

    async fn submit_settlement(&self, request: SettlementRequest) -> Result<TxId> {
        let mut state = self.state.write();
        let key = (request.policy, request.pool_index);
        let reject = |reason: String| {
            warn!("[MOCK] Settlement on pool {} rejected: {}", request.pool_index, reason);
            SettlementError::SettlementRejected(reason)
        };

        if let Some(reason) = state.injected_rejections.remove(&key) {
            return Err(reject(reason));
        }

        let pool = match state.pools.get(&key) {
            Some(pool) => pool.clone(),
            None => return Err(reject(format!("unknown pool {}", request.pool_index))),
        };
        if pool.anchor != request.pool_anchor {
            return Err(reject(format!("anchor mismatch for pool {}", pool.index)));
        }
        if !pool.is_active() {
            return Err(reject(format!("pool {} is {}", pool.index, pool.status)));
        }
        if request.burn.0 != pool.index {
            return Err(reject(format!(
                "token index {} does not match pool input index {}",
                request.burn.0, pool.index
            )));
        }
        if request.balance_delta > request.burn.1 {
            return Err(reject(format!(
                "debit {} exceeds burned amount {}",
                request.balance_delta, request.burn.1
            )));
        }
        if request.balance_delta > pool.total_amount {
            return Err(reject(format!(
                "insufficient pool funds: balance {}, requested {}",
                pool.total_amount, request.balance_delta
            )));
        }

        let holding_key = (self.holder, request.policy);
        let mut holding = state.holdings.get(&holding_key).cloned().unwrap_or_default();
        holding
            .apply_settlement(request.burn, request.mint)
            .map_err(|e| reject(e.to_string()))?;

        // Preconditions hold; commit burn, mint and debit together
        state.holdings.insert(holding_key, holding);
        if let Some(pool) = state.pools.get_mut(&key) {
            pool.total_amount -= request.balance_delta;
            if request.balance_delta > 0 && pool.total_amount == 0 {
                pool.status = PoolStatus::Completed;
                info!("[MOCK] Pool {} drained, now completed", pool.index);
            }
        }

        let withheld = state.withheld_confirmations.remove(&key);
        let tx = Self::next_tx_id(&mut state, &request.pool_index.to_le_bytes());
        state.transactions.insert(tx, withheld);

        info!(
            "[MOCK] Settled pool {}: burn {}@{}, mint {}@{}, debit {} (tx {})",
            request.pool_index,
            request.burn.1,
            request.burn.0,
            request.mint.1,
            request.mint.0,
            request.balance_delta,
            hex::encode(&tx[..8]),
        );
        Ok(tx)
    }

    async fn await_confirmation(&self, tx: &TxId, timeout: Duration) -> Result<Confirmation> {
        let withheld = {
            let state = self.state.read();
            *state
                .transactions
                .get(tx)
                .ok_or_else(|| SettlementError::TransactionNotFound(hex::encode(tx)))?
        };

        let latency = self.config.confirmation_latency;
        let confirmed = async move {
            if withheld {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(latency).await;
        };

        match tokio::time::timeout(timeout, confirmed).await {
            Ok(()) => {
                self.state.write().transactions.remove(tx);
                Ok(Confirmation::Confirmed)
            }
            Err(_) => {
                debug!("[MOCK] Transaction {} not confirmed within {:?}", hex::encode(&tx[..8]), timeout);
                Ok(Confirmation::TimedOut)
            }
        }
    }

    async fn submit_mint(&self, policy: &PolicyId, amount: Amount) -> Result<TxId> {
        if amount == 0 {
            return Err(SettlementError::InvalidAmount("mint amount must be non-zero".to_string()));
        }
        let mut state = self.state.write();
        state
            .holdings
            .entry((self.holder, *policy))
            .or_default()
            .credit(0, amount)?;

        let tx = Self::next_tx_id(&mut state, b"mint");
        info!("[MOCK] Minted {} equity at index 0 under {}", amount, policy);
        Ok(tx)
    }

    async fn submit_advance(
        &self,
        policy: &PolicyId,
        burn: (TokenIndex, Amount),
        mint: (TokenIndex, Amount),
    ) -> Result<TxId> {
        let mut state = self.state.write();
        let holding_key = (self.holder, *policy);
        let mut holding = state.holdings.get(&holding_key).cloned().unwrap_or_default();
        holding
            .apply_settlement(burn, mint)
            .map_err(|e| SettlementError::SettlementRejected(e.to_string()))?;
        state.holdings.insert(holding_key, holding);

        let tx = Self::next_tx_id(&mut state, b"advance");
        info!("[MOCK] Advanced {} equity from index {} to {}", burn.1, burn.0, mint.0);
        Ok(tx)
    }
}

/// In-memory [`PoolRegistryService`].
///
/// Knows which equity script references exist and derives a pool anchor
/// deterministically from the equity script and the seed output.
#[derive(Debug, Default)]
pub struct MemoryPoolRegistry {
    equity_scripts: RwLock<HashMap<OutRef, PolicyId>>,
}

impl MemoryPoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the reference script output of an equity policy
    pub fn register_equity_script(&self, script: OutRef, policy: PolicyId) {
        self.equity_scripts.write().insert(script, policy);
    }

    pub fn policy_for(&self, script: &OutRef) -> Option<PolicyId> {
        self.equity_scripts.read().get(script).copied()
    }

    /// One-of-one marker unit identifying the pool at `anchor` on the ledger.
    ///
    /// The pool policy is the first 28 bytes of SHA256(anchor).
    pub fn pool_unit(anchor: &OutRef, index: PoolIndex) -> AssetUnit {
        let mut hasher = Sha256::new();
        hasher.update(anchor.tx_hash);
        hasher.update(anchor.output_index.to_le_bytes());
        let digest = hasher.finalize();

        let mut policy = [0u8; PolicyId::LEN];
        policy.copy_from_slice(&digest[..PolicyId::LEN]);
        AssetUnit::new(PolicyId(policy), index)
    }

    /// Anchor = SHA256("pool-anchor" || equity script || seed) # 0
    pub fn derive_anchor(inputs: &AnchorInputs) -> OutRef {
        let mut hasher = Sha256::new();
        hasher.update(b"pool-anchor");
        hasher.update(inputs.equity_script.tx_hash);
        hasher.update(inputs.equity_script.output_index.to_le_bytes());
        hasher.update(inputs.seed.tx_hash);
        hasher.update(inputs.seed.output_index.to_le_bytes());
        OutRef::new(hasher.finalize().into(), 0)
    }
}

#[async_trait]
impl PoolRegistryService for MemoryPoolRegistry {
    async fn resolve_anchor(&self, inputs: &AnchorInputs) -> Result<OutRef> {
        if !self.equity_scripts.read().contains_key(&inputs.equity_script) {
            return Err(SettlementError::AnchorNotFound(format!(
                "no equity script at {}",
                inputs.equity_script
            )));
        }
        Ok(Self::derive_anchor(inputs))
    }
}
