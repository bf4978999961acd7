//! Pool issuance
//!
//! Validates a new pool against the already configured sequence and
//! resolves its anchor. Nothing is persisted here.

use tracing::info;

use equitycraft_core::{Amount, CoreError, Pool, PoolIndex, PoolStatus};

use crate::{AnchorInputs, PoolRegistryService, Result, SettlementError};

/// Parameters for a new reward pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolRequest {
    pub index: PoolIndex,
    pub name: String,
    pub description: String,
    pub total_amount: Amount,
    pub anchor_inputs: AnchorInputs,
}

/// Build a new active pool from `request`.
///
/// Pool indices stay dense from 0: the request must take the index right
/// after the highest in `existing`. Fails with `DuplicateIndex` if the index
/// is taken, `IndexGap` if it skips ahead, and `AnchorNotFound` if the
/// registry cannot resolve the anchor.
pub async fn create_pool(
    request: PoolRequest,
    existing: &[Pool],
    registry: &dyn PoolRegistryService,
) -> Result<Pool> {
    if existing.iter().any(|pool| pool.index == request.index) {
        return Err(SettlementError::DuplicateIndex(request.index));
    }
    let expected = next_index(existing)?;
    if request.index != expected {
        return Err(SettlementError::IndexGap {
            expected,
            requested: request.index,
        });
    }
    if request.total_amount == 0 {
        return Err(SettlementError::InvalidAmount(
            "pool amount must be non-zero".to_string(),
        ));
    }
    if request.name.trim().is_empty() {
        return Err(SettlementError::InvalidRequest("pool name is empty".to_string()));
    }
    if request.description.trim().is_empty() {
        return Err(SettlementError::InvalidRequest(
            "pool description is empty".to_string(),
        ));
    }

    let anchor = registry.resolve_anchor(&request.anchor_inputs).await?;

    info!(
        "Created pool {} '{}' with {} at {}",
        request.index, request.name, request.total_amount, anchor
    );
    Ok(Pool {
        index: request.index,
        name: request.name,
        description: request.description,
        anchor,
        total_amount: request.total_amount,
        status: PoolStatus::Active,
    })
}

fn next_index(existing: &[Pool]) -> Result<PoolIndex> {
    match existing.iter().map(|pool| pool.index).max() {
        None => Ok(0),
        Some(last) => last
            .checked_add(1)
            .ok_or(SettlementError::Core(CoreError::IndexExhausted(last))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryPoolRegistry;
    use equitycraft_core::{OutRef, PolicyId};

    fn script() -> OutRef {
        OutRef::new([0xaa; 32], 0)
    }

    fn registry() -> MemoryPoolRegistry {
        let registry = MemoryPoolRegistry::new();
        registry.register_equity_script(script(), PolicyId([0x01; 28]));
        registry
    }

    fn request(index: PoolIndex) -> PoolRequest {
        PoolRequest {
            index,
            name: "Q3 rewards".to_string(),
            description: "Quarterly revenue share".to_string(),
            total_amount: 25_000,
            anchor_inputs: AnchorInputs {
                equity_script: script(),
                seed: OutRef::new([index as u8; 32], 0),
            },
        }
    }

    #[tokio::test]
    async fn test_create_pool() {
        let registry = registry();
        let pool = create_pool(request(0), &[], &registry).await.unwrap();

        assert_eq!(pool.index, 0);
        assert_eq!(pool.total_amount, 25_000);
        assert_eq!(pool.status, PoolStatus::Active);
        assert_eq!(
            pool.anchor,
            MemoryPoolRegistry::derive_anchor(&request(0).anchor_inputs)
        );
    }

    #[tokio::test]
    async fn test_duplicate_index_rejected() {
        let registry = registry();
        let first = create_pool(request(0), &[], &registry).await.unwrap();

        let result = create_pool(request(0), &[first], &registry).await;
        assert_eq!(result, Err(SettlementError::DuplicateIndex(0)));
    }

    #[tokio::test]
    async fn test_zero_amount_rejected() {
        let mut req = request(0);
        req.total_amount = 0;
        assert!(matches!(
            create_pool(req, &[], &registry()).await,
            Err(SettlementError::InvalidAmount(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let mut req = request(0);
        req.name = "  ".to_string();
        assert!(matches!(
            create_pool(req, &[], &registry()).await,
            Err(SettlementError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_index_must_follow_last_pool() {
        let registry = registry();
        let first = create_pool(request(0), &[], &registry).await.unwrap();
        let existing = [first];

        let result = create_pool(request(5), &existing, &registry).await;
        assert_eq!(
            result,
            Err(SettlementError::IndexGap {
                expected: 1,
                requested: 5,
            })
        );

        let second = create_pool(request(1), &existing, &registry).await.unwrap();
        assert_eq!(second.index, 1);
    }

    #[tokio::test]
    async fn test_first_pool_starts_at_zero() {
        let result = create_pool(request(2), &[], &registry()).await;
        assert!(matches!(
            result,
            Err(SettlementError::IndexGap { expected: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_unresolvable_anchor() {
        let result = create_pool(request(0), &[], &MemoryPoolRegistry::new()).await;
        assert!(matches!(result, Err(SettlementError::AnchorNotFound(_))));
    }
}
