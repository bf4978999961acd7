//! Cascade resolver
//!
//! A token at index `i` can only be settled against pool `i`, and each
//! settlement moves it to `i + 1`. Withdrawing from pool `k` with a token
//! at `i < k` therefore needs one settlement per pool in `[i, k)` before the
//! target, strictly ascending. The resolver computes that chain and refuses
//! to build one that would have to skip an unavailable pool.
//!
//! Intermediate settlements are zero-value pass-throughs: they burn and
//! mint the full amount but leave the intermediate pool's balance
//! untouched. Only the target pool is debited.

use std::collections::BTreeMap;

use crate::{
    qualifying_indices, Amount, CoreError, EquityHolding, Pool, PoolIndex, Result, TokenIndex,
};

/// Ordered settlement chain for one withdrawal request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadePlan {
    /// Index of the token being spent
    pub source_index: TokenIndex,
    pub target_pool_index: PoolIndex,
    /// Pools in `[source_index, target_pool_index)`, ascending
    pub intermediate_pools: Vec<Pool>,
    pub target_pool: Pool,
    /// Token amount burned/minted at every step; debited from the target
    pub amount: Amount,
}

/// One settlement of a cascade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementStep {
    pub pool: Pool,
    pub burn_index: TokenIndex,
    pub mint_index: TokenIndex,
    pub amount: Amount,
    /// Amount debited from the pool (zero for pass-throughs)
    pub balance_delta: Amount,
}

impl SettlementStep {
    pub fn is_pass_through(&self) -> bool {
        self.balance_delta == 0
    }
}

impl CascadePlan {
    /// Intermediate pools followed by the target
    pub fn pools(&self) -> impl Iterator<Item = &Pool> {
        self.intermediate_pools
            .iter()
            .chain(std::iter::once(&self.target_pool))
    }

    /// Total number of settlements
    pub fn len(&self) -> usize {
        self.intermediate_pools.len() + 1
    }

    pub fn is_direct(&self) -> bool {
        self.intermediate_pools.is_empty()
    }

    /// Index the withdrawn amount ends at after a full cascade
    pub fn final_index(&self) -> TokenIndex {
        self.target_pool_index + 1
    }

    /// The rest of this cascade once the amount already sits at `index`.
    ///
    /// `None` when the cascade is complete (`index` past the target) or
    /// `index` is below where the plan started.
    pub fn resume_from(&self, index: TokenIndex) -> Option<CascadePlan> {
        if index < self.source_index || index > self.target_pool_index {
            return None;
        }
        Some(CascadePlan {
            source_index: index,
            target_pool_index: self.target_pool_index,
            intermediate_pools: self
                .intermediate_pools
                .iter()
                .filter(|pool| pool.index >= index)
                .cloned()
                .collect(),
            target_pool: self.target_pool.clone(),
            amount: self.amount,
        })
    }

    /// The settlement chain, in submission order
    pub fn settlement_steps(&self) -> Vec<SettlementStep> {
        let target = self.target_pool_index;
        self.pools()
            .map(|pool| SettlementStep {
                pool: pool.clone(),
                burn_index: pool.index,
                mint_index: pool.index + 1,
                amount: self.amount,
                balance_delta: if pool.index == target { self.amount } else { 0 },
            })
            .collect()
    }
}

/// Compute the cascade for spending `amount` of the token at `source_index`
/// on `target_pool`.
///
/// Every pool in `[source_index, target_pool.index)` must be configured and
/// active; the first one that is not aborts the plan.
pub fn plan(
    source_index: TokenIndex,
    target_pool: &Pool,
    all_pools: &[Pool],
    amount: Amount,
) -> Result<CascadePlan> {
    if amount == 0 {
        return Err(CoreError::ZeroAmount);
    }
    if source_index > target_pool.index {
        return Err(CoreError::SourceAboveTarget {
            from: source_index,
            target: target_pool.index,
        });
    }
    if target_pool.index == PoolIndex::MAX {
        return Err(CoreError::IndexExhausted(target_pool.index));
    }

    let mut by_index: BTreeMap<PoolIndex, &Pool> = BTreeMap::new();
    for pool in all_pools {
        if by_index.insert(pool.index, pool).is_some() {
            return Err(CoreError::DuplicateIndex(pool.index));
        }
    }

    if !target_pool.is_active() {
        return Err(CoreError::PoolUnavailable(target_pool.index));
    }

    let mut intermediate_pools = Vec::new();
    for index in source_index..target_pool.index {
        let pool = by_index.get(&index).ok_or(CoreError::PoolMissing(index))?;
        if !pool.is_active() {
            return Err(CoreError::PoolUnavailable(index));
        }
        intermediate_pools.push((*pool).clone());
    }

    Ok(CascadePlan {
        source_index,
        target_pool_index: target_pool.index,
        intermediate_pools,
        target_pool: target_pool.clone(),
        amount,
    })
}

/// Plan a withdrawal from what the holder actually holds.
///
/// With `source` unset the highest qualifying index is used. A manual
/// `source` must be held and must qualify for the target pool.
pub fn plan_for_holding(
    holding: &EquityHolding,
    target_pool: &Pool,
    all_pools: &[Pool],
    amount: Amount,
    source: Option<TokenIndex>,
) -> Result<CascadePlan> {
    let source_index = match source {
        Some(index) => {
            if index > target_pool.index || holding.amount_at(index) == 0 {
                return Err(CoreError::NotQualifying {
                    index,
                    pool: target_pool.index,
                });
            }
            index
        }
        None => qualifying_indices(holding, target_pool.index)
            .first()
            .copied()
            .ok_or(CoreError::NoQualifyingToken(target_pool.index))?,
    };

    let held = holding.amount_at(source_index);
    if amount > held {
        return Err(CoreError::InsufficientHolding {
            index: source_index,
            requested: amount,
            held,
        });
    }

    plan(source_index, target_pool, all_pools, amount)
}
