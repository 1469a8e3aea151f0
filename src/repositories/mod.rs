//! Durable state: wallets, the credit ledger and link rows.
//!
//! Every method that changes more than one row runs as one atomic unit in
//! the backing store, serialised by a lock on the specific wallet or link
//! row it touches.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::ledger::{LedgerEntry, TransactionRecord};
use crate::models::link::{LinkRecord, LinkSummary, NewLink};
use crate::models::wallet::{NewWallet, Wallet};
use crate::services::lifecycle::{Transition, ViewAttempt};

/// Description of the welcome credit record.
pub const WELCOME_BONUS_DESCRIPTION: &str = "Welcome bonus";

/// Result of running one view attempt against a locked link row.
#[derive(Debug, Clone)]
pub struct AppliedView {
    /// The row as it stands after the transition was applied.
    pub link: LinkRecord,
    pub transition: Transition,
}

/// A link deactivated by the expiry sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredLink {
    pub id: String,
    pub blob_key: Option<String>,
}

#[async_trait]
pub trait Repository: Send + Sync + 'static {
    /// Creates the wallet, its credit account and the welcome credit record.
    async fn insert_wallet(&self, wallet: NewWallet, welcome_bonus: i64) -> Result<Wallet>;

    async fn find_wallet_by_lookup(&self, phrase_lookup: &str) -> Result<Option<Wallet>>;

    async fn find_wallet(&self, wallet_id: Uuid) -> Result<Option<Wallet>>;

    async fn touch_wallet(&self, wallet_id: Uuid) -> Result<()>;

    /// Current balance, `None` when the wallet has no credit account.
    async fn balance(&self, wallet_id: Uuid) -> Result<Option<i64>>;

    /// Applies a credit or debit and appends its record. Returns the new balance.
    ///
    /// Fails with `WalletNotFound` or `InsufficientCredits` without writing.
    async fn apply_entry(&self, wallet_id: Uuid, entry: LedgerEntry) -> Result<i64>;

    /// Ledger records, newest first.
    async fn transactions(&self, wallet_id: Uuid, limit: i64) -> Result<Vec<TransactionRecord>>;

    /// Debits the owner and inserts the link in one atomic unit.
    async fn insert_link_with_debit(&self, link: NewLink, debit: LedgerEntry)
        -> Result<LinkRecord>;

    async fn find_link(&self, link_id: &str) -> Result<Option<LinkRecord>>;

    /// Locks the link row, evaluates the attempt and applies the resulting
    /// mutation. `None` when no such link exists.
    async fn apply_view(&self, link_id: &str, attempt: &ViewAttempt)
        -> Result<Option<AppliedView>>;

    /// Deletes a link owned by `wallet_id`. `None` when missing or foreign.
    async fn delete_link(&self, wallet_id: Uuid, link_id: &str) -> Result<Option<LinkRecord>>;

    /// Summaries of the wallet's links, newest first.
    async fn list_links(&self, wallet_id: Uuid, now: DateTime<Utc>) -> Result<Vec<LinkSummary>>;

    /// Deactivates up to `limit` active links whose timer has passed.
    async fn deactivate_expired(&self, now: DateTime<Utc>, limit: i64)
        -> Result<Vec<ExpiredLink>>;

    async fn ping(&self) -> Result<()>;
}
