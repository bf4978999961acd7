//! Equity issuance and pool-free index advancement

use tracing::info;

use equitycraft_core::{Amount, CoreError, PolicyId, TokenIndex, TxId};

use crate::{LedgerService, Result, SettlementError};

/// Supply minted by a fresh issuance when no amount is given
pub const INITIAL_EQUITY_SUPPLY: Amount = 1_000_000_000;

/// Mint `amount` of equity at index 0 for the session's holder
pub async fn issue_equity(
    ledger: &dyn LedgerService,
    policy: &PolicyId,
    amount: Amount,
) -> Result<TxId> {
    if amount == 0 {
        return Err(SettlementError::InvalidAmount(
            "issuance amount must be non-zero".to_string(),
        ));
    }
    let tx = ledger.submit_mint(policy, amount).await?;
    info!("Issued {} equity under {}", amount, policy);
    Ok(tx)
}

/// Move `amount` from `from_index` to `from_index + 1` without touching a
/// pool
pub async fn advance(
    ledger: &dyn LedgerService,
    policy: &PolicyId,
    from_index: TokenIndex,
    amount: Amount,
) -> Result<TxId> {
    if amount == 0 {
        return Err(CoreError::ZeroAmount.into());
    }
    let next = from_index
        .checked_add(1)
        .ok_or(CoreError::IndexExhausted(from_index))?;

    let held = ledger.get_holdings(policy).await?.amount_at(from_index);
    if held < amount {
        return Err(CoreError::InsufficientHolding {
            index: from_index,
            requested: amount,
            held,
        }
        .into());
    }

    let tx = ledger
        .submit_advance(policy, (from_index, amount), (next, amount))
        .await?;
    info!("Advanced {} from index {} to {}", amount, from_index, next);
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LedgerConfig, MemoryLedger};

    fn policy() -> PolicyId {
        PolicyId([0x07; 28])
    }

    fn ledger() -> MemoryLedger {
        MemoryLedger::new(LedgerConfig::instant(), [5u8; 32])
    }

    #[tokio::test]
    async fn test_issue_equity() {
        let ledger = ledger();
        issue_equity(&ledger, &policy(), INITIAL_EQUITY_SUPPLY).await.unwrap();

        let holding = ledger.get_holdings(&policy()).await.unwrap();
        assert_eq!(holding.amount_at(0), INITIAL_EQUITY_SUPPLY);
        assert_eq!(ledger.equity_supply(&policy()), INITIAL_EQUITY_SUPPLY as u128);
    }

    #[tokio::test]
    async fn test_issue_zero_rejected() {
        let result = issue_equity(&ledger(), &policy(), 0).await;
        assert!(matches!(result, Err(SettlementError::InvalidAmount(_))));
    }

    #[tokio::test]
    async fn test_advance() {
        let ledger = ledger();
        ledger.credit(policy(), 2, 400).unwrap();

        advance(&ledger, &policy(), 2, 150).await.unwrap();

        let holding = ledger.get_holdings(&policy()).await.unwrap();
        assert_eq!(holding.amount_at(2), 250);
        assert_eq!(holding.amount_at(3), 150);
    }

    #[tokio::test]
    async fn test_advance_more_than_held() {
        let ledger = ledger();
        ledger.credit(policy(), 0, 10).unwrap();

        let result = advance(&ledger, &policy(), 0, 11).await;
        assert_eq!(
            result,
            Err(SettlementError::Core(CoreError::InsufficientHolding {
                index: 0,
                requested: 11,
                held: 10,
            }))
        );
    }
}
