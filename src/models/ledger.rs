use std::str::FromStr;

use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Credit packs that can be purchased.
pub const CREDIT_PACKS: [i64; 4] = [10, 50, 100, 250];

/// Direction of a ledger movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "ledger_direction")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[postgres(name = "credit")]
    Credit,
    #[postgres(name = "debit")]
    Debit,
}

/// A balance change together with the record that explains it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub direction: Direction,
    pub amount: i64,
    pub description: String,
}

impl LedgerEntry {
    pub fn debit(amount: i64, description: impl Into<String>) -> Result<Self> {
        Self::new(Direction::Debit, amount, description)
    }

    pub fn credit(amount: i64, description: impl Into<String>) -> Result<Self> {
        Self::new(Direction::Credit, amount, description)
    }

    fn new(direction: Direction, amount: i64, description: impl Into<String>) -> Result<Self> {
        if amount <= 0 {
            return Err(AppError::validation("Amount must be positive"));
        }
        Ok(Self {
            direction,
            amount,
            description: description.into(),
        })
    }

    /// The signed change this entry applies to a balance.
    pub fn delta(&self) -> i64 {
        match self.direction {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }
}

/// An append-only ledger record.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub wallet_id: Uuid,
    #[serde(rename = "type")]
    pub direction: Direction,
    pub amount: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Payment rails accepted for credit packs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Bitcoin,
    Ethereum,
    Litecoin,
    Solana,
    Monero,
    Xrp,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Bitcoin => "bitcoin",
            PaymentMethod::Ethereum => "ethereum",
            PaymentMethod::Litecoin => "litecoin",
            PaymentMethod::Solana => "solana",
            PaymentMethod::Monero => "monero",
            PaymentMethod::Xrp => "xrp",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bitcoin" => Ok(PaymentMethod::Bitcoin),
            "ethereum" => Ok(PaymentMethod::Ethereum),
            "litecoin" => Ok(PaymentMethod::Litecoin),
            "solana" => Ok(PaymentMethod::Solana),
            "monero" => Ok(PaymentMethod::Monero),
            "xrp" => Ok(PaymentMethod::Xrp),
            _ => Err(AppError::validation("Invalid payment method")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_reject_non_positive_amounts() {
        assert!(LedgerEntry::debit(0, "x").is_err());
        assert!(LedgerEntry::credit(-5, "x").is_err());
        assert_eq!(LedgerEntry::debit(3, "x").unwrap().delta(), -3);
        assert_eq!(LedgerEntry::credit(3, "x").unwrap().delta(), 3);
    }

    #[test]
    fn payment_methods_parse_case_insensitively() {
        assert_eq!("Monero".parse::<PaymentMethod>().unwrap(), PaymentMethod::Monero);
        assert!("paypal".parse::<PaymentMethod>().is_err());
    }
}
