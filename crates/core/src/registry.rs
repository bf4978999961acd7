//! Pool registry view
//!
//! Joins the configured pool list against a holder's equity snapshot so the
//! holder can see, per pool, which of their tokens qualify.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{qualifying_indices, Amount, EquityHolding, PolicyId, Pool, PoolIndex, TokenIndex};

/// One pool joined with the holder's qualifying tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolView {
    pub pool: Pool,
    /// `(index, amount)` of every held token with index ≤ pool index,
    /// highest index first
    pub qualifying: Vec<(TokenIndex, Amount)>,
}

impl PoolView {
    /// The automatic choice: highest qualifying index, fewest pools to cross
    pub fn best_token(&self) -> Option<(TokenIndex, Amount)> {
        self.qualifying.first().copied()
    }

    /// Active pool with at least one qualifying token
    pub fn is_withdrawable(&self) -> bool {
        self.pool.is_active() && self.qualifying.iter().any(|(_, amount)| *amount > 0)
    }

    /// Number of intermediate pools to settle when using `index`
    pub fn pools_to_cross(&self, index: TokenIndex) -> Option<u64> {
        self.pool.index.checked_sub(index)
    }
}

/// Project `pools` against `holding`.
///
/// Output is ordered by pool index. Pools without a qualifying token are
/// kept with an empty list.
pub fn project(pools: &[Pool], holding: &EquityHolding) -> Vec<PoolView> {
    let mut ordered: Vec<&Pool> = pools.iter().collect();
    ordered.sort_by_key(|pool| pool.index);

    ordered
        .into_iter()
        .map(|pool| PoolView {
            pool: pool.clone(),
            qualifying: qualifying_indices(holding, pool.index)
                .into_iter()
                .map(|index| (index, holding.amount_at(index)))
                .collect(),
        })
        .collect()
}

/// Read-only snapshot of configured pools keyed by policy identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolRegistry {
    policies: BTreeMap<PolicyId, Vec<Pool>>,
}

impl PoolRegistry {
    pub fn new(policies: BTreeMap<PolicyId, Vec<Pool>>) -> Self {
        Self { policies }
    }

    /// Pools configured for `policy`, in stored order
    pub fn pools(&self, policy: &PolicyId) -> &[Pool] {
        self.policies.get(policy).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pool(&self, policy: &PolicyId, index: PoolIndex) -> Option<&Pool> {
        self.pools(policy).iter().find(|pool| pool.index == index)
    }

    pub fn policies(&self) -> impl Iterator<Item = &PolicyId> {
        self.policies.keys()
    }

    pub fn into_inner(self) -> BTreeMap<PolicyId, Vec<Pool>> {
        self.policies
    }

    pub fn project(&self, policy: &PolicyId, holding: &EquityHolding) -> Vec<PoolView> {
        project(self.pools(policy), holding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OutRef, PoolStatus};

    fn pool(index: PoolIndex, status: PoolStatus) -> Pool {
        Pool {
            index,
            name: format!("Pool {index}"),
            description: format!("Rewards for period {index}"),
            anchor: OutRef::new([index as u8; 32], 0),
            total_amount: 10_000,
            status,
        }
    }

    #[test]
    fn test_project_lists_every_pool() {
        let pools = vec![pool(0, PoolStatus::Active), pool(1, PoolStatus::Active)];
        let holding = EquityHolding::from_entries(vec![(1, 50)]).unwrap();

        let views = project(&pools, &holding);

        assert_eq!(views.len(), 2);
        assert!(views[0].qualifying.is_empty());
        assert_eq!(views[1].qualifying, vec![(1, 50)]);
    }

    #[test]
    fn test_project_orders_by_pool_index() {
        let pools = vec![
            pool(2, PoolStatus::Active),
            pool(0, PoolStatus::Completed),
            pool(1, PoolStatus::Pending),
        ];
        let views = project(&pools, &EquityHolding::new());

        let order: Vec<_> = views.iter().map(|v| v.pool.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_project_is_idempotent() {
        let pools = vec![
            pool(0, PoolStatus::Active),
            pool(1, PoolStatus::Active),
            pool(2, PoolStatus::Active),
        ];
        let holding = EquityHolding::from_entries(vec![(0, 5_000), (2, 10)]).unwrap();

        assert_eq!(project(&pools, &holding), project(&pools, &holding));
    }

    #[test]
    fn test_best_token_prefers_highest_index() {
        let pools = vec![pool(3, PoolStatus::Active)];
        let holding = EquityHolding::from_entries(vec![(0, 900), (2, 100), (5, 1)]).unwrap();

        let view = &project(&pools, &holding)[0];
        assert_eq!(view.qualifying, vec![(2, 100), (0, 900)]);
        assert_eq!(view.best_token(), Some((2, 100)));
        assert_eq!(view.pools_to_cross(2), Some(1));
        assert!(view.is_withdrawable());
    }

    #[test]
    fn test_completed_pool_not_withdrawable() {
        let pools = vec![pool(0, PoolStatus::Completed)];
        let holding = EquityHolding::from_entries(vec![(0, 1)]).unwrap();

        assert!(!project(&pools, &holding)[0].is_withdrawable());
    }

    #[test]
    fn test_registry_keyed_by_policy() {
        let a = PolicyId([1; 28]);
        let b = PolicyId([2; 28]);
        let mut policies = BTreeMap::new();
        policies.insert(a, vec![pool(0, PoolStatus::Active)]);
        let registry = PoolRegistry::new(policies);

        assert_eq!(registry.pools(&a).len(), 1);
        assert!(registry.pools(&b).is_empty());
        assert!(registry.pool(&a, 0).is_some());
        assert!(registry.pool(&a, 1).is_none());
        assert!(registry.project(&b, &EquityHolding::new()).is_empty());
    }
}
