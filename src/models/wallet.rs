use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::models::ledger::TransactionRecord;

/// A pseudonymous wallet. The recovery phrase itself is never stored.
#[derive(Clone, Debug)]
pub struct Wallet {
    pub id: Uuid,
    /// Keyed digest of the normalised phrase, used only to find the row.
    pub phrase_lookup: String,
    /// Argon2id PHC string of the normalised phrase.
    pub phrase_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
}

/// A wallet row to insert.
#[derive(Clone, Debug)]
pub struct NewWallet {
    pub id: Uuid,
    pub phrase_lookup: String,
    pub phrase_hash: String,
}

/// Returned once, at creation. The phrase is wiped when this is dropped.
pub struct CreatedWallet {
    pub wallet_id: Uuid,
    pub recovery_phrase: Zeroizing<String>,
    pub balance: i64,
}

impl std::fmt::Debug for CreatedWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreatedWallet")
            .field("wallet_id", &self.wallet_id)
            .field("recovery_phrase", &"[REDACTED]")
            .field("balance", &self.balance)
            .finish()
    }
}

/// Wallet overview shown to its owner.
#[derive(Clone, Debug, Serialize)]
pub struct WalletInfo {
    pub wallet_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
    pub balance: i64,
    pub transactions: Vec<TransactionRecord>,
}
