//! Token-index accounting
//!
//! A holder's equity under one policy is a map of period index → amount.
//! All functions here are pure; ledger snapshots come in, values go out.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Amount, AssetUnit, CoreError, PolicyId, PoolIndex, Result, TokenIndex};

/// Amounts held per token index under a single policy.
///
/// Zero entries are never stored, so an absent index and a zero amount are
/// the same thing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    into = "BTreeMap<TokenIndex, Amount>",
    try_from = "BTreeMap<TokenIndex, Amount>"
)]
pub struct EquityHolding {
    amounts: BTreeMap<TokenIndex, Amount>,
}

impl TryFrom<BTreeMap<TokenIndex, Amount>> for EquityHolding {
    type Error = CoreError;

    fn try_from(amounts: BTreeMap<TokenIndex, Amount>) -> Result<Self> {
        Self::from_entries(amounts)
    }
}

impl From<EquityHolding> for BTreeMap<TokenIndex, Amount> {
    fn from(holding: EquityHolding) -> Self {
        holding.amounts
    }
}

impl EquityHolding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a holding from `(index, amount)` pairs, summing duplicates
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (TokenIndex, Amount)>,
    {
        let mut holding = Self::new();
        for (index, amount) in entries {
            holding.credit(index, amount)?;
        }
        Ok(holding)
    }

    pub fn amount_at(&self, index: TokenIndex) -> Amount {
        self.amounts.get(&index).copied().unwrap_or(0)
    }

    /// Held `(index, amount)` pairs in ascending index order
    pub fn iter(&self) -> impl Iterator<Item = (TokenIndex, Amount)> + '_ {
        self.amounts.iter().map(|(i, a)| (*i, *a))
    }

    pub fn indices(&self) -> impl Iterator<Item = TokenIndex> + '_ {
        self.amounts.keys().copied()
    }

    pub fn highest_index(&self) -> Option<TokenIndex> {
        self.amounts.keys().next_back().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.amounts.is_empty()
    }

    /// Sum across all indices
    pub fn total(&self) -> u128 {
        self.amounts.values().map(|a| *a as u128).sum()
    }

    pub fn credit(&mut self, index: TokenIndex, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let entry = self.amounts.entry(index).or_insert(0);
        *entry = entry.checked_add(amount).ok_or(CoreError::Overflow)?;
        Ok(())
    }

    pub fn debit(&mut self, index: TokenIndex, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let held = self.amount_at(index);
        if held < amount {
            return Err(CoreError::InsufficientHolding {
                index,
                requested: amount,
                held,
            });
        }
        if held == amount {
            self.amounts.remove(&index);
        } else {
            self.amounts.insert(index, held - amount);
        }
        Ok(())
    }

    /// Apply one settlement's burn and mint.
    ///
    /// The mint must be at `burn index + 1` and carry exactly the burned
    /// amount. Nothing is mutated if any check fails.
    pub fn apply_settlement(
        &mut self,
        burn: (TokenIndex, Amount),
        mint: (TokenIndex, Amount),
    ) -> Result<()> {
        let (burn_index, amount) = burn;
        let next = burn_index
            .checked_add(1)
            .ok_or(CoreError::IndexExhausted(burn_index))?;
        if mint != (next, amount) {
            return Err(CoreError::UnbalancedSettlement {
                expected: amount,
                next,
                actual: mint.1,
                actual_index: mint.0,
            });
        }

        let held_next = self.amount_at(next);
        held_next.checked_add(amount).ok_or(CoreError::Overflow)?;

        self.debit(burn_index, amount)?;
        self.credit(next, amount)
    }
}

/// Result of aggregating raw ledger units
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregation {
    pub holding: EquityHolding,
    /// Units under the policy that were rejected (always `MalformedUnit`
    /// or an overflow on the unit's index)
    pub anomalies: Vec<CoreError>,
}

/// Group raw `(asset unit, amount)` pairs under `policy` by index.
///
/// Units of other policies are ignored. A malformed unit under the policy is
/// dropped and reported; aggregation continues with the remaining units.
pub fn aggregate<I, S>(policy: &PolicyId, raw_units: I) -> Aggregation
where
    I: IntoIterator<Item = (S, Amount)>,
    S: AsRef<str>,
{
    let mut result = Aggregation::default();

    for (unit, amount) in raw_units {
        let unit = unit.as_ref();
        let parsed = match AssetUnit::parse_under(policy, unit) {
            None => continue,
            Some(parsed) => parsed,
        };

        match parsed.and_then(|asset| result.holding.credit(asset.index, amount)) {
            Ok(()) => {}
            Err(e) => {
                warn!("Skipping equity unit {}: {}", unit, e);
                result.anomalies.push(e);
            }
        }
    }

    result
}

/// Held indices that qualify for `pool_index` (≤ pool index), highest first
pub fn qualifying_indices(holding: &EquityHolding, pool_index: PoolIndex) -> Vec<TokenIndex> {
    holding
        .amounts
        .range(..=pool_index)
        .rev()
        .map(|(index, _)| *index)
        .collect()
}
