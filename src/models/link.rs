use chrono::{DateTime, Utc};
use garde::Validate;
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a link carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "link_content_type")]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[postgres(name = "text")]
    Text,
    #[postgres(name = "file")]
    File,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::File => "file",
        }
    }
}

/// Feature options requested for a new link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LinkOptions {
    /// Views allowed before the link self-destructs. Defaults to 1.
    #[garde(range(min = 1))]
    pub max_views: Option<u32>,
    /// Lifetime in milliseconds.
    #[garde(range(min = 1))]
    pub timer_ms: Option<i64>,
    #[garde(length(min = 1, max = 128))]
    pub password: Option<String>,
    #[garde(skip)]
    pub screenshot_block: bool,
    /// Region codes allowed to open the link.
    #[garde(custom(validate_regions))]
    pub allowed_regions: Option<Vec<String>>,
    /// Device the link is locked to.
    #[garde(length(min = 1, max = 256))]
    pub device_id: Option<String>,
    #[garde(skip)]
    pub camouflage: bool,
}

fn validate_regions(value: &Option<Vec<String>>, _ctx: &()) -> garde::Result {
    if let Some(regions) = value {
        if regions.is_empty() || regions.len() > 64 {
            return Err(garde::Error::new("must list between 1 and 64 regions"));
        }
        if regions
            .iter()
            .any(|r| r.len() != 2 || !r.chars().all(|c| c.is_ascii_alphabetic()))
        {
            return Err(garde::Error::new("regions must be two-letter codes"));
        }
    }
    Ok(())
}

impl LinkOptions {
    pub fn effective_max_views(&self) -> u32 {
        self.max_views.unwrap_or(1)
    }

    pub fn has_region_lock(&self) -> bool {
        self.allowed_regions.is_some()
    }

    pub fn has_device_lock(&self) -> bool {
        self.device_id.is_some()
    }
}

/// Where the sealed payload of a link lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredPayload {
    /// Sealed bytes kept in the link row.
    Inline(Vec<u8>),
    /// Sealed bytes kept in blob storage under this key.
    Blob(String),
}

/// A durable link row.
#[derive(Debug, Clone)]
pub struct LinkRecord {
    pub id: String,
    pub wallet_id: Uuid,
    pub content_type: ContentType,
    pub payload: StoredPayload,
    /// BLAKE3 of the sealed payload, hex.
    pub checksum: String,
    pub size_bytes: i64,
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
    pub views: i32,
    pub max_views: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub password_hash: Option<String>,
    pub allowed_regions: Option<Vec<String>>,
    pub device_id: Option<String>,
    pub screenshot_block: bool,
    pub camouflage: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl LinkRecord {
    pub fn blob_key(&self) -> Option<&str> {
        match &self.payload {
            StoredPayload::Blob(key) => Some(key),
            StoredPayload::Inline(_) => None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn summary(&self, now: DateTime<Utc>) -> LinkSummary {
        LinkSummary {
            id: self.id.clone(),
            content_type: self.content_type,
            views: self.views,
            max_views: self.max_views,
            expires_at: self.expires_at,
            active: self.active && !self.is_expired_at(now),
            state: crate::services::lifecycle::state_of(self, now),
            has_password: self.password_hash.is_some(),
            created_at: self.created_at,
        }
    }
}

/// A row to insert.
#[derive(Debug, Clone)]
pub struct NewLink {
    pub id: String,
    pub wallet_id: Uuid,
    pub content_type: ContentType,
    pub payload: StoredPayload,
    pub checksum: String,
    pub size_bytes: i64,
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
    pub max_views: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub password_hash: Option<String>,
    pub allowed_regions: Option<Vec<String>>,
    pub device_id: Option<String>,
    pub screenshot_block: bool,
    pub camouflage: bool,
}

impl NewLink {
    pub fn into_record(self, created_at: DateTime<Utc>) -> LinkRecord {
        LinkRecord {
            id: self.id,
            wallet_id: self.wallet_id,
            content_type: self.content_type,
            payload: self.payload,
            checksum: self.checksum,
            size_bytes: self.size_bytes,
            mime_type: self.mime_type,
            file_name: self.file_name,
            views: 0,
            max_views: self.max_views,
            expires_at: self.expires_at,
            password_hash: self.password_hash,
            allowed_regions: self.allowed_regions,
            device_id: self.device_id,
            screenshot_block: self.screenshot_block,
            camouflage: self.camouflage,
            active: true,
            created_at,
        }
    }
}

/// Lifecycle state of a link as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Active,
    Consumed,
    Expired,
    Destroyed,
}

/// What the owner sees when listing links.
#[derive(Debug, Clone, Serialize)]
pub struct LinkSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub views: i32,
    pub max_views: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub state: LinkState,
    pub has_password: bool,
    pub created_at: DateTime<Utc>,
}

/// Request-side facts used by the region and device gates.
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    /// Two-letter region code resolved at the edge.
    pub region: Option<String>,
    pub device_id: Option<String>,
}

/// Result of a successful creation.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedLink {
    pub link_id: String,
    pub url: String,
    pub credit_cost: i64,
}

/// Decrypted content handed to a viewer.
#[derive(Debug, Clone)]
pub struct RevealedContent {
    pub content: Vec<u8>,
    pub content_type: ContentType,
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
    pub is_last_view: bool,
    pub screenshot_block: bool,
    pub camouflage: bool,
}

/// Non-error results of a view attempt.
#[derive(Debug, Clone)]
pub enum ViewOutcome {
    /// The link is password protected and no password was given.
    PasswordRequired,
    Revealed(RevealedContent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default_to_single_view() {
        let options: LinkOptions = sonic_rs::from_str("{}").unwrap();
        assert_eq!(options.effective_max_views(), 1);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn zero_views_and_bad_regions_fail_validation() {
        let zero: LinkOptions = sonic_rs::from_str(r#"{"max_views":0}"#).unwrap();
        assert!(zero.validate().is_err());

        let empty: LinkOptions = sonic_rs::from_str(r#"{"allowed_regions":[]}"#).unwrap();
        assert!(empty.validate().is_err());

        let long: LinkOptions = sonic_rs::from_str(r#"{"allowed_regions":["USA"]}"#).unwrap();
        assert!(long.validate().is_err());

        let ok: LinkOptions = sonic_rs::from_str(r#"{"allowed_regions":["US","de"]}"#).unwrap();
        assert!(ok.validate().is_ok());
    }
}
