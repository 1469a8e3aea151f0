use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Pool, Transaction};
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{AppError, DomainError, Result};
use crate::models::ledger::{Direction, LedgerEntry, TransactionRecord};
use crate::models::link::{LinkRecord, LinkSummary, NewLink, StoredPayload};
use crate::models::wallet::{NewWallet, Wallet};
use crate::repositories::{
    AppliedView, ExpiredLink, Repository, WELCOME_BONUS_DESCRIPTION,
};
use crate::services::lifecycle::{self, Transition, ViewAttempt};

const WALLET_COLUMNS: &str = "id, phrase_lookup, phrase_hash, created_at, last_access_at";

const TRANSACTION_COLUMNS: &str = "id, wallet_id, direction, amount, description, created_at";

const LINK_COLUMNS: &str = "id, wallet_id, content_type, inline_payload, blob_key, checksum, \
     size_bytes, mime_type, file_name, views, max_views, expires_at, password_hash, \
     allowed_regions, device_id, screenshot_block, camouflage, active, created_at";

fn row_to_wallet(row: &Row) -> Result<Wallet> {
    Ok(Wallet {
        id: row.try_get("id")?,
        phrase_lookup: row.try_get("phrase_lookup")?,
        phrase_hash: row.try_get("phrase_hash")?,
        created_at: row.try_get("created_at")?,
        last_access_at: row.try_get("last_access_at")?,
    })
}

fn row_to_transaction(row: &Row) -> Result<TransactionRecord> {
    Ok(TransactionRecord {
        id: row.try_get("id")?,
        wallet_id: row.try_get("wallet_id")?,
        direction: row.try_get("direction")?,
        amount: row.try_get("amount")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_link(row: &Row) -> Result<LinkRecord> {
    let id: String = row.try_get("id")?;
    let inline: Option<Vec<u8>> = row.try_get("inline_payload")?;
    let blob_key: Option<String> = row.try_get("blob_key")?;

    let payload = match (inline, blob_key) {
        (Some(bytes), None) => StoredPayload::Inline(bytes),
        (None, Some(key)) => StoredPayload::Blob(key),
        _ => {
            return Err(AppError::Invariant(format!(
                "link {} must have exactly one payload location",
                id
            )));
        }
    };

    Ok(LinkRecord {
        id,
        wallet_id: row.try_get("wallet_id")?,
        content_type: row.try_get("content_type")?,
        payload,
        checksum: row.try_get("checksum")?,
        size_bytes: row.try_get("size_bytes")?,
        mime_type: row.try_get("mime_type")?,
        file_name: row.try_get("file_name")?,
        views: row.try_get("views")?,
        max_views: row.try_get("max_views")?,
        expires_at: row.try_get("expires_at")?,
        password_hash: row.try_get("password_hash")?,
        allowed_regions: row.try_get("allowed_regions")?,
        device_id: row.try_get("device_id")?,
        screenshot_block: row.try_get("screenshot_block")?,
        camouflage: row.try_get("camouflage")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_summary(row: &Row, now: DateTime<Utc>) -> Result<LinkSummary> {
    let views: i32 = row.try_get("views")?;
    let max_views: i32 = row.try_get("max_views")?;
    let expires_at: Option<DateTime<Utc>> = row.try_get("expires_at")?;
    let active: bool = row.try_get("active")?;
    let expired = expires_at.is_some_and(|at| at <= now);

    Ok(LinkSummary {
        id: row.try_get("id")?,
        content_type: row.try_get("content_type")?,
        views,
        max_views,
        expires_at,
        active: active && !expired,
        state: lifecycle::derive_state(active, views, max_views, expires_at, now),
        has_password: row.try_get("has_password")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Locks the wallet's credit row, applies `entry` and appends its record.
async fn apply_entry_in(tx: &Transaction<'_>, wallet_id: Uuid, entry: &LedgerEntry) -> Result<i64> {
    let select = tx
        .prepare_cached("SELECT balance FROM credit_accounts WHERE wallet_id = $1 FOR UPDATE")
        .await?;
    let balance: i64 = match tx.query_opt(&select, &[&wallet_id]).await? {
        Some(row) => row.try_get("balance")?,
        None => return Err(DomainError::WalletNotFound.into()),
    };

    let next = balance + entry.delta();
    if next < 0 {
        return Err(DomainError::InsufficientCredits {
            required: entry.amount,
            available: balance,
        }
        .into());
    }

    let update = tx
        .prepare_cached(
            "UPDATE credit_accounts SET balance = $2, updated_at = NOW() WHERE wallet_id = $1",
        )
        .await?;
    tx.execute(&update, &[&wallet_id, &next]).await?;

    insert_record_in(tx, wallet_id, entry).await?;
    Ok(next)
}

async fn insert_record_in(tx: &Transaction<'_>, wallet_id: Uuid, entry: &LedgerEntry) -> Result<()> {
    let insert = tx
        .prepare_cached(
            "INSERT INTO credit_transactions (id, wallet_id, direction, amount, description) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .await?;
    tx.execute(
        &insert,
        &[
            &Uuid::new_v4(),
            &wallet_id,
            &entry.direction,
            &entry.amount,
            &entry.description,
        ],
    )
    .await?;
    Ok(())
}

/// PostgreSQL repository over a deadpool pool.
#[derive(Clone)]
pub struct PgRepository {
    pool: Pool,
}

impl PgRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn insert_wallet(&self, wallet: NewWallet, welcome_bonus: i64) -> Result<Wallet> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let insert = tx
            .prepare_cached(&format!(
                "INSERT INTO wallets (id, phrase_lookup, phrase_hash) VALUES ($1, $2, $3) \
                 RETURNING {}",
                WALLET_COLUMNS
            ))
            .await?;
        let row = tx
            .query_one(&insert, &[&wallet.id, &wallet.phrase_lookup, &wallet.phrase_hash])
            .await?;
        let created = row_to_wallet(&row)?;

        let account = tx
            .prepare_cached("INSERT INTO credit_accounts (wallet_id, balance) VALUES ($1, $2)")
            .await?;
        tx.execute(&account, &[&created.id, &welcome_bonus.max(0)]).await?;

        if welcome_bonus > 0 {
            let entry = LedgerEntry::credit(welcome_bonus, WELCOME_BONUS_DESCRIPTION)?;
            insert_record_in(&tx, created.id, &entry).await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn find_wallet_by_lookup(&self, phrase_lookup: &str) -> Result<Option<Wallet>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                "SELECT {} FROM wallets WHERE phrase_lookup = $1",
                WALLET_COLUMNS
            ))
            .await?;
        let row = client.query_opt(&stmt, &[&phrase_lookup]).await?;
        row.map(|r| row_to_wallet(&r)).transpose()
    }

    async fn find_wallet(&self, wallet_id: Uuid) -> Result<Option<Wallet>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!("SELECT {} FROM wallets WHERE id = $1", WALLET_COLUMNS))
            .await?;
        let row = client.query_opt(&stmt, &[&wallet_id]).await?;
        row.map(|r| row_to_wallet(&r)).transpose()
    }

    async fn touch_wallet(&self, wallet_id: Uuid) -> Result<()> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached("UPDATE wallets SET last_access_at = NOW() WHERE id = $1")
            .await?;
        client.execute(&stmt, &[&wallet_id]).await?;
        Ok(())
    }

    async fn balance(&self, wallet_id: Uuid) -> Result<Option<i64>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached("SELECT balance FROM credit_accounts WHERE wallet_id = $1")
            .await?;
        let row = client.query_opt(&stmt, &[&wallet_id]).await?;
        row.map(|r| r.try_get("balance").map_err(AppError::from))
            .transpose()
    }

    async fn apply_entry(&self, wallet_id: Uuid, entry: LedgerEntry) -> Result<i64> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let balance = apply_entry_in(&tx, wallet_id, &entry).await?;
        tx.commit().await?;
        Ok(balance)
    }

    async fn transactions(&self, wallet_id: Uuid, limit: i64) -> Result<Vec<TransactionRecord>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                "SELECT {} FROM credit_transactions WHERE wallet_id = $1 \
                 ORDER BY created_at DESC, id LIMIT $2",
                TRANSACTION_COLUMNS
            ))
            .await?;
        let rows = client.query(&stmt, &[&wallet_id, &limit.max(0)]).await?;
        rows.iter().map(row_to_transaction).collect()
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

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        apply_entry_in(&tx, link.wallet_id, &debit).await?;

        let (inline_payload, blob_key) = match &link.payload {
            StoredPayload::Inline(bytes) => (Some(bytes.as_slice()), None),
            StoredPayload::Blob(key) => (None, Some(key.as_str())),
        };

        let insert = tx
            .prepare_cached(&format!(
                "INSERT INTO links (id, wallet_id, content_type, inline_payload, blob_key, \
                 checksum, size_bytes, mime_type, file_name, max_views, expires_at, \
                 password_hash, allowed_regions, device_id, screenshot_block, camouflage) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
                 RETURNING {}",
                LINK_COLUMNS
            ))
            .await?;
        let row = tx
            .query_one(
                &insert,
                &[
                    &link.id,
                    &link.wallet_id,
                    &link.content_type,
                    &inline_payload,
                    &blob_key,
                    &link.checksum,
                    &link.size_bytes,
                    &link.mime_type,
                    &link.file_name,
                    &link.max_views,
                    &link.expires_at,
                    &link.password_hash,
                    &link.allowed_regions,
                    &link.device_id,
                    &link.screenshot_block,
                    &link.camouflage,
                ],
            )
            .await?;
        let record = row_to_link(&row)?;

        tx.commit().await?;
        Ok(record)
    }

    async fn find_link(&self, link_id: &str) -> Result<Option<LinkRecord>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!("SELECT {} FROM links WHERE id = $1", LINK_COLUMNS))
            .await?;
        let row = client.query_opt(&stmt, &[&link_id]).await?;
        row.map(|r| row_to_link(&r)).transpose()
    }

    async fn apply_view(
        &self,
        link_id: &str,
        attempt: &ViewAttempt,
    ) -> Result<Option<AppliedView>> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let select = tx
            .prepare_cached(&format!(
                "SELECT {} FROM links WHERE id = $1 FOR UPDATE",
                LINK_COLUMNS
            ))
            .await?;
        let Some(row) = tx.query_opt(&select, &[&link_id]).await? else {
            return Ok(None);
        };
        let mut link = row_to_link(&row)?;

        let transition = lifecycle::evaluate(&link, attempt);
        match &transition {
            Transition::Reveal { last_view } => {
                let consume = tx
                    .prepare_cached(
                        "UPDATE links SET views = views + 1, active = NOT $2 \
                         WHERE id = $1 AND active AND views < max_views \
                         RETURNING views, max_views, active",
                    )
                    .await?;
                let Some(updated) = tx.query_opt(&consume, &[&link_id, last_view]).await? else {
                    return Err(AppError::Invariant(format!(
                        "link {} passed every gate but could not be consumed",
                        link_id
                    )));
                };

                let views: i32 = updated.try_get("views")?;
                let max_views: i32 = updated.try_get("max_views")?;
                if views > max_views {
                    return Err(AppError::Invariant(format!(
                        "link {} has {} views of {}",
                        link_id, views, max_views
                    )));
                }
                link.views = views;
                link.active = updated.try_get("active")?;
            }
            t if t.deactivates() => {
                let deactivate = tx
                    .prepare_cached("UPDATE links SET active = FALSE WHERE id = $1")
                    .await?;
                tx.execute(&deactivate, &[&link_id]).await?;
                link.active = false;
            }
            _ => {}
        }

        tx.commit().await?;
        Ok(Some(AppliedView { link, transition }))
    }

    async fn delete_link(&self, wallet_id: Uuid, link_id: &str) -> Result<Option<LinkRecord>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                "DELETE FROM links WHERE id = $1 AND wallet_id = $2 RETURNING {}",
                LINK_COLUMNS
            ))
            .await?;
        let row = client.query_opt(&stmt, &[&link_id, &wallet_id]).await?;
        row.map(|r| row_to_link(&r)).transpose()
    }

    async fn list_links(&self, wallet_id: Uuid, now: DateTime<Utc>) -> Result<Vec<LinkSummary>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                "SELECT id, content_type, views, max_views, expires_at, active, created_at, \
                 password_hash IS NOT NULL AS has_password \
                 FROM links WHERE wallet_id = $1 ORDER BY created_at DESC",
            )
            .await?;
        let rows = client.query(&stmt, &[&wallet_id]).await?;
        rows.iter().map(|r| row_to_summary(r, now)).collect()
    }

    async fn deactivate_expired(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ExpiredLink>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                "UPDATE links SET active = FALSE WHERE id IN ( \
                     SELECT id FROM links \
                     WHERE active AND expires_at IS NOT NULL AND expires_at <= $1 \
                     ORDER BY expires_at LIMIT $2 \
                     FOR UPDATE SKIP LOCKED \
                 ) RETURNING id, blob_key",
            )
            .await?;
        let rows = client.query(&stmt, &[&now, &limit]).await?;
        rows.iter()
            .map(|r| -> Result<ExpiredLink> {
                Ok(ExpiredLink {
                    id: r.try_get("id")?,
                    blob_key: r.try_get("blob_key")?,
                })
            })
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client.execute("SELECT 1", &[]).await?;
        Ok(())
    }
}
