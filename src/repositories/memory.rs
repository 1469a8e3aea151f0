use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::{AppError, DomainError, Result};
use crate::models::ledger::{Direction, LedgerEntry, TransactionRecord};
use crate::models::link::{LinkRecord, LinkSummary, NewLink};
use crate::models::wallet::{NewWallet, Wallet};
use crate::repositories::{
    AppliedView, ExpiredLink, Repository, WELCOME_BONUS_DESCRIPTION,
};
use crate::services::lifecycle::{self, ViewAttempt};

struct WalletRow {
    wallet: Wallet,
    balance: i64,
}

/// In-process repository. Each wallet and link row has its own lock;
/// the maps are only locked long enough to find or insert a row.
#[derive(Default)]
pub struct MemoryRepository {
    wallets: RwLock<HashMap<Uuid, Arc<Mutex<WalletRow>>>>,
    lookups: RwLock<HashMap<String, Uuid>>,
    ledger: RwLock<Vec<TransactionRecord>>,
    links: RwLock<HashMap<String, Arc<Mutex<LinkRecord>>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn wallet_row(&self, wallet_id: Uuid) -> Option<Arc<Mutex<WalletRow>>> {
        self.wallets.read().await.get(&wallet_id).cloned()
    }

    async fn link_row(&self, link_id: &str) -> Option<Arc<Mutex<LinkRecord>>> {
        self.links.read().await.get(link_id).cloned()
    }

    async fn link_rows(&self) -> Vec<Arc<Mutex<LinkRecord>>> {
        self.links.read().await.values().cloned().collect()
    }

    /// Applies `entry` to a locked wallet row and appends its record.
    async fn apply_locked(&self, row: &mut WalletRow, entry: &LedgerEntry) -> Result<i64> {
        let next = row.balance + entry.delta();
        if next < 0 {
            return Err(DomainError::InsufficientCredits {
                required: entry.amount,
                available: row.balance,
            }
            .into());
        }

        row.balance = next;
        self.ledger.write().await.push(TransactionRecord {
            id: Uuid::new_v4(),
            wallet_id: row.wallet.id,
            direction: entry.direction,
            amount: entry.amount,
            description: entry.description.clone(),
            created_at: Utc::now(),
        });
        Ok(next)
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn insert_wallet(&self, wallet: NewWallet, welcome_bonus: i64) -> Result<Wallet> {
        let mut lookups = self.lookups.write().await;
        if lookups.contains_key(&wallet.phrase_lookup) {
            return Err(AppError::Internal("Wallet lookup collision".to_string()));
        }

        let now = Utc::now();
        let record = Wallet {
            id: wallet.id,
            phrase_lookup: wallet.phrase_lookup,
            phrase_hash: wallet.phrase_hash,
            created_at: now,
            last_access_at: now,
        };

        let mut row = WalletRow {
            wallet: record.clone(),
            balance: 0,
        };
        if welcome_bonus > 0 {
            let entry = LedgerEntry::credit(welcome_bonus, WELCOME_BONUS_DESCRIPTION)?;
            self.apply_locked(&mut row, &entry).await?;
        }

        lookups.insert(record.phrase_lookup.clone(), record.id);
        self.wallets
            .write()
            .await
            .insert(record.id, Arc::new(Mutex::new(row)));
        Ok(record)
    }

    async fn find_wallet_by_lookup(&self, phrase_lookup: &str) -> Result<Option<Wallet>> {
        let id = match self.lookups.read().await.get(phrase_lookup) {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.find_wallet(id).await
    }

    async fn find_wallet(&self, wallet_id: Uuid) -> Result<Option<Wallet>> {
        match self.wallet_row(wallet_id).await {
            Some(row) => Ok(Some(row.lock().await.wallet.clone())),
            None => Ok(None),
        }
    }

    async fn touch_wallet(&self, wallet_id: Uuid) -> Result<()> {
        if let Some(row) = self.wallet_row(wallet_id).await {
            row.lock().await.wallet.last_access_at = Utc::now();
        }
        Ok(())
    }

    async fn balance(&self, wallet_id: Uuid) -> Result<Option<i64>> {
        match self.wallet_row(wallet_id).await {
            Some(row) => Ok(Some(row.lock().await.balance)),
            None => Ok(None),
        }
    }

    async fn apply_entry(&self, wallet_id: Uuid, entry: LedgerEntry) -> Result<i64> {
        let row = self
            .wallet_row(wallet_id)
            .await
            .ok_or(DomainError::WalletNotFound)?;
        let mut row = row.lock().await;
        self.apply_locked(&mut row, &entry).await
    }

    async fn transactions(&self, wallet_id: Uuid, limit: i64) -> Result<Vec<TransactionRecord>> {
        let ledger = self.ledger.read().await;
        Ok(ledger
            .iter()
            .rev()
            .filter(|t| t.wallet_id == wallet_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn insert_link_with_debit(
        &self,
        link: NewLink,
        debit: LedgerEntry,
    ) -> Result<LinkRecord> {
        if debit.direction != Direction::Debit {
            return Err(AppError::Invariant(
                "link creation must be paid with a debit".to_string(),
            ));
        }

        let row = self
            .wallet_row(link.wallet_id)
            .await
            .ok_or(DomainError::WalletNotFound)?;
        let mut row = row.lock().await;

        let mut links = self.links.write().await;
        if links.contains_key(&link.id) {
            return Err(AppError::Invariant(format!("duplicate link id {}", link.id)));
        }

        self.apply_locked(&mut row, &debit).await?;

        let record = link.into_record(Utc::now());
        links.insert(record.id.clone(), Arc::new(Mutex::new(record.clone())));
        Ok(record)
    }

    async fn find_link(&self, link_id: &str) -> Result<Option<LinkRecord>> {
        match self.link_row(link_id).await {
            Some(row) => Ok(Some(row.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn apply_view(
        &self,
        link_id: &str,
        attempt: &ViewAttempt,
    ) -> Result<Option<AppliedView>> {
        let Some(row) = self.link_row(link_id).await else {
            return Ok(None);
        };
        let mut link = row.lock().await;

        let transition = lifecycle::evaluate(&link, attempt);
        lifecycle::apply(&mut link, &transition);

        if link.views > link.max_views {
            return Err(AppError::Invariant(format!(
                "link {} has {} views of {}",
                link.id, link.views, link.max_views
            )));
        }

        Ok(Some(AppliedView {
            link: link.clone(),
            transition,
        }))
    }

    async fn delete_link(&self, wallet_id: Uuid, link_id: &str) -> Result<Option<LinkRecord>> {
        let Some(row) = self.link_row(link_id).await else {
            return Ok(None);
        };
        let mut link = row.lock().await;
        if link.wallet_id != wallet_id {
            return Ok(None);
        }

        // Viewers still holding this row see it inactive once the lock drops.
        link.active = false;
        let removed = self.links.write().await.remove(link_id).is_some();
        Ok(removed.then(|| link.clone()))
    }

    async fn list_links(&self, wallet_id: Uuid, now: DateTime<Utc>) -> Result<Vec<LinkSummary>> {
        let mut owned = Vec::new();
        for row in self.link_rows().await {
            let link = row.lock().await;
            if link.wallet_id == wallet_id {
                owned.push((link.created_at, link.summary(now)));
            }
        }
        owned.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(owned.into_iter().map(|(_, summary)| summary).collect())
    }

    async fn deactivate_expired(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ExpiredLink>> {
        let mut expired = Vec::new();
        for row in self.link_rows().await {
            if expired.len() as i64 >= limit {
                break;
            }
            let mut link = row.lock().await;
            if link.active && link.is_expired_at(now) {
                link.active = false;
                expired.push(ExpiredLink {
                    id: link.id.clone(),
                    blob_key: link.blob_key().map(str::to_string),
                });
            }
        }
        Ok(expired)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::link::{ContentType, StoredPayload};

    fn new_wallet() -> NewWallet {
        NewWallet {
            id: Uuid::new_v4(),
            phrase_lookup: Uuid::new_v4().to_string(),
            phrase_hash: "hash".to_string(),
        }
    }

    fn new_link(wallet_id: Uuid, id: &str) -> NewLink {
        NewLink {
            id: id.to_string(),
            wallet_id,
            content_type: ContentType::Text,
            payload: StoredPayload::Inline(vec![0; 8]),
            checksum: String::new(),
            size_bytes: 8,
            mime_type: None,
            file_name: None,
            max_views: 1,
            expires_at: None,
            password_hash: None,
            allowed_regions: None,
            device_id: None,
            screenshot_block: false,
            camouflage: false,
        }
    }

    #[tokio::test]
    async fn new_wallet_gets_bonus_and_record() {
        let repo = MemoryRepository::new();
        let wallet = repo.insert_wallet(new_wallet(), 1).await.unwrap();
        assert_eq!(repo.balance(wallet.id).await.unwrap(), Some(1));

        let history = repo.transactions(wallet.id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].direction, Direction::Credit);
        assert_eq!(history[0].description, WELCOME_BONUS_DESCRIPTION);
    }

    #[tokio::test]
    async fn failed_debit_leaves_no_link_and_no_record() {
        let repo = MemoryRepository::new();
        let wallet = repo.insert_wallet(new_wallet(), 1).await.unwrap();

        let err = repo
            .insert_link_with_debit(
                new_link(wallet.id, "link-a"),
                LedgerEntry::debit(2, "Link creation").unwrap(),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.domain(),
            Some(&DomainError::InsufficientCredits { required: 2, available: 1 })
        );
        assert!(repo.find_link("link-a").await.unwrap().is_none());
        assert_eq!(repo.balance(wallet.id).await.unwrap(), Some(1));
        assert_eq!(repo.transactions(wallet.id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_is_owner_scoped() {
        let repo = MemoryRepository::new();
        let owner = repo.insert_wallet(new_wallet(), 5).await.unwrap();
        let other = repo.insert_wallet(new_wallet(), 5).await.unwrap();
        repo.insert_link_with_debit(
            new_link(owner.id, "link-b"),
            LedgerEntry::debit(1, "Link creation").unwrap(),
        )
        .await
        .unwrap();

        assert!(repo.delete_link(other.id, "link-b").await.unwrap().is_none());
        assert!(repo.delete_link(owner.id, "link-b").await.unwrap().is_some());
        assert!(repo.delete_link(owner.id, "link-b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_wallet_cannot_be_debited() {
        let repo = MemoryRepository::new();
        let err = repo
            .apply_entry(Uuid::new_v4(), LedgerEntry::debit(1, "x").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.domain(), Some(&DomainError::WalletNotFound));
    }
}
