use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::{AppError, DomainError, Result};
use crate::models::ledger::{CREDIT_PACKS, LedgerEntry, PaymentMethod, TransactionRecord};
use crate::repositories::Repository;
use crate::services::bounded::{detached, with_timeout};

/// Non-negative credit balances with an append-only record of every change.
#[derive(Clone)]
pub struct CreditLedger {
    repo: Arc<dyn Repository>,
    timeout: Duration,
}

impl CreditLedger {
    pub fn new(repo: Arc<dyn Repository>, timeout: Duration) -> Self {
        Self { repo, timeout }
    }

    /// Takes `amount` credits. Returns the new balance.
    pub async fn debit(&self, wallet_id: Uuid, amount: i64, description: &str) -> Result<i64> {
        let entry = LedgerEntry::debit(amount, description)?;
        self.apply(wallet_id, entry).await
    }

    /// Adds `amount` credits. Returns the new balance.
    pub async fn credit(&self, wallet_id: Uuid, amount: i64, description: &str) -> Result<i64> {
        let entry = LedgerEntry::credit(amount, description)?;
        self.apply(wallet_id, entry).await
    }

    async fn apply(&self, wallet_id: Uuid, entry: LedgerEntry) -> Result<i64> {
        let repo = self.repo.clone();
        let direction = entry.direction;
        let amount = entry.amount;

        let balance = detached("ledger entry", self.timeout, async move {
            repo.apply_entry(wallet_id, entry).await
        })
        .await?;

        tracing::info!(
            wallet = %wallet_id,
            ?direction,
            amount,
            balance,
            "💳 Ledger entry applied"
        );
        Ok(balance)
    }

    pub async fn balance(&self, wallet_id: Uuid) -> Result<i64> {
        with_timeout("balance", self.timeout, self.repo.balance(wallet_id))
            .await?
            .ok_or_else(|| DomainError::WalletNotFound.into())
    }

    /// Most recent records first.
    pub async fn transactions(
        &self,
        wallet_id: Uuid,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>> {
        with_timeout(
            "transactions",
            self.timeout,
            self.repo.transactions(wallet_id, limit.clamp(1, 500)),
        )
        .await
    }

    /// Credits a purchased pack once the payment provider has confirmed it.
    pub async fn add_credit_pack(&self, wallet_id: Uuid, pack: i64, method: &str) -> Result<i64> {
        if !CREDIT_PACKS.contains(&pack) {
            return Err(AppError::validation("Invalid credit pack"));
        }
        let method: PaymentMethod = method.parse()?;
        self.credit(
            wallet_id,
            pack,
            &format!("Credit pack ({} credits) via {}", pack, method.as_str()),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ledger::Direction;
    use crate::models::wallet::NewWallet;
    use crate::repositories::memory::MemoryRepository;

    async fn ledger_with_wallet(bonus: i64) -> (CreditLedger, Uuid) {
        let repo = Arc::new(MemoryRepository::new());
        let wallet = repo
            .insert_wallet(
                NewWallet {
                    id: Uuid::new_v4(),
                    phrase_lookup: "lookup".into(),
                    phrase_hash: "hash".into(),
                },
                bonus,
            )
            .await
            .unwrap();
        (CreditLedger::new(repo, Duration::from_secs(1)), wallet.id)
    }

    #[tokio::test]
    async fn debit_beyond_balance_is_refused() {
        let (ledger, wallet) = ledger_with_wallet(1).await;
        let err = ledger.debit(wallet, 2, "too much").await.unwrap_err();
        assert_eq!(
            err.domain(),
            Some(&DomainError::InsufficientCredits { required: 2, available: 1 })
        );
        assert_eq!(ledger.balance(wallet).await.unwrap(), 1);
        assert_eq!(ledger.debit(wallet, 1, "exact").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn credit_packs_are_validated_and_recorded() {
        let (ledger, wallet) = ledger_with_wallet(0).await;
        assert!(ledger.add_credit_pack(wallet, 7, "bitcoin").await.is_err());
        assert!(ledger.add_credit_pack(wallet, 10, "paypal").await.is_err());
        assert_eq!(ledger.add_credit_pack(wallet, 50, "monero").await.unwrap(), 50);

        let history = ledger.transactions(wallet, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].direction, Direction::Credit);
        assert!(history[0].description.contains("monero"));
    }

    #[tokio::test]
    async fn unknown_wallet_has_no_balance() {
        let (ledger, _) = ledger_with_wallet(1).await;
        let err = ledger.balance(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.domain(), Some(&DomainError::WalletNotFound));
    }

    #[tokio::test]
    async fn non_positive_amounts_are_validation_errors() {
        let (ledger, wallet) = ledger_with_wallet(1).await;
        assert!(matches!(
            ledger.credit(wallet, 0, "zero").await.unwrap_err().domain(),
            Some(DomainError::Validation(_))
        ));
    }
}
