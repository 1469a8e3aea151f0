use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::{password, phrase};
use crate::error::{AppError, DomainError, Result};
use crate::models::wallet::{CreatedWallet, NewWallet, Wallet, WalletInfo};
use crate::repositories::Repository;
use crate::services::bounded::{detached, with_timeout};

/// How many ledger records the wallet overview carries.
const RECENT_TRANSACTIONS: i64 = 50;

/// Recovery-phrase wallets.
#[derive(Clone)]
pub struct WalletService {
    repo: Arc<dyn Repository>,
    master_key: Zeroizing<Vec<u8>>,
    welcome_bonus: i64,
    timeout: Duration,
}

impl WalletService {
    pub fn new(
        repo: Arc<dyn Repository>,
        master_key: Zeroizing<Vec<u8>>,
        welcome_bonus: i64,
        timeout: Duration,
    ) -> Self {
        Self {
            repo,
            master_key,
            welcome_bonus,
            timeout,
        }
    }

    /// Creates a wallet and returns its phrase. The phrase is shown once.
    pub async fn create(&self) -> Result<CreatedWallet> {
        let recovery_phrase = phrase::generate();
        let phrase_lookup = phrase::lookup_digest(&self.master_key, &recovery_phrase);
        let phrase_hash = password::hash_secret_blocking(recovery_phrase.to_string()).await?;

        let repo = self.repo.clone();
        let bonus = self.welcome_bonus;
        let wallet = detached("wallet insert", self.timeout, async move {
            repo.insert_wallet(
                NewWallet {
                    id: Uuid::new_v4(),
                    phrase_lookup,
                    phrase_hash,
                },
                bonus,
            )
            .await
        })
        .await?;

        tracing::info!(wallet = %wallet.id, "👛 Wallet created");
        Ok(CreatedWallet {
            wallet_id: wallet.id,
            recovery_phrase,
            balance: bonus.max(0),
        })
    }

    /// Finds the wallet for a phrase and verifies it.
    pub async fn recover(&self, supplied: &str) -> Result<Wallet> {
        let normalized = phrase::normalize(supplied)?;
        let lookup = phrase::lookup_digest(&self.master_key, &normalized);

        let wallet = with_timeout(
            "wallet lookup",
            self.timeout,
            self.repo.find_wallet_by_lookup(&lookup),
        )
        .await?
        .ok_or_else(|| AppError::Authentication("Invalid recovery phrase".to_string()))?;

        let verified =
            password::verify_secret_blocking(normalized.to_string(), wallet.phrase_hash.clone())
                .await?;
        if !verified {
            return Err(AppError::Authentication("Invalid recovery phrase".to_string()));
        }

        with_timeout("wallet touch", self.timeout, self.repo.touch_wallet(wallet.id)).await?;
        tracing::info!(wallet = %wallet.id, "🔓 Wallet recovered");
        Ok(wallet)
    }

    /// Balance and recent history for the owner.
    pub async fn info(&self, wallet_id: Uuid) -> Result<WalletInfo> {
        let wallet = with_timeout("wallet lookup", self.timeout, self.repo.find_wallet(wallet_id))
            .await?
            .ok_or(DomainError::WalletNotFound)?;
        let balance = with_timeout("balance", self.timeout, self.repo.balance(wallet_id))
            .await?
            .ok_or(DomainError::WalletNotFound)?;
        let transactions = with_timeout(
            "transactions",
            self.timeout,
            self.repo.transactions(wallet_id, RECENT_TRANSACTIONS),
        )
        .await?;

        Ok(WalletInfo {
            wallet_id,
            created_at: wallet.created_at,
            last_access_at: wallet.last_access_at,
            balance,
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory::MemoryRepository;

    fn service() -> WalletService {
        WalletService::new(
            Arc::new(MemoryRepository::new()),
            Zeroizing::new(vec![3u8; 32]),
            1,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn created_wallet_recovers_with_its_phrase() {
        let wallets = service();
        let created = wallets.create().await.unwrap();
        assert_eq!(created.balance, 1);

        let shouted = created.recovery_phrase.to_uppercase();
        let recovered = wallets.recover(&shouted).await.unwrap();
        assert_eq!(recovered.id, created.wallet_id);

        let info = wallets.info(created.wallet_id).await.unwrap();
        assert_eq!(info.balance, 1);
        assert_eq!(info.transactions.len(), 1);
    }

    #[tokio::test]
    async fn unknown_phrase_is_an_authentication_failure() {
        let wallets = service();
        let phrase = "amber anchor atlas basalt beacon birch cedar cinder cobalt comet coral cypher";
        assert!(matches!(
            wallets.recover(phrase).await,
            Err(AppError::Authentication(_))
        ));
    }
}
