//! Link creation, consumption, deletion and the expiry sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use garde::Validate;
use subtle::ConstantTimeEq;
use uuid::Uuid;
use zeroize::Zeroize;

use crate::config::{LinkPolicy, PricingConfig};
use crate::crypto::{aes, ids, password};
use crate::crypto::aes::SecureKey;
use crate::error::{AppError, DomainError, Result};
use crate::models::ledger::LedgerEntry;
use crate::models::link::{
    ClientContext, ContentType, CreatedLink, LinkOptions, LinkRecord, LinkSummary, NewLink,
    RevealedContent, StoredPayload, ViewOutcome,
};
use crate::repositories::{AppliedView, Repository};
use crate::services::bounded::{detached, with_timeout};
use crate::services::key_vault::KeyVault;
use crate::services::lifecycle::{PasswordCheck, Transition, ViewAttempt};
use crate::services::pricing;
use crate::storage::blob::{blob_key_for, BlobStore};

/// Longest accepted file name.
const MAX_FILE_NAME: usize = 255;

/// A link creation request after transport decoding.
#[derive(Debug, Clone)]
pub struct NewLinkRequest {
    pub content: Vec<u8>,
    pub content_type: ContentType,
    pub file_name: Option<String>,
    pub options: LinkOptions,
}

/// Keeps the final path component and drops control characters.
fn clean_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_FILE_NAME)
        .collect();
    let cleaned = cleaned.trim().to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

fn checksum(sealed: &[u8]) -> String {
    blake3::hash(sealed).to_hex().to_string()
}

/// Verifies the stored checksum and decrypts.
fn open_sealed(link: &LinkRecord, key: &SecureKey, sealed: &[u8]) -> Result<Vec<u8>> {
    let actual = checksum(sealed);
    if !bool::from(actual.as_bytes().ct_eq(link.checksum.as_bytes())) {
        return Err(AppError::Encryption(format!(
            "checksum mismatch for link {}",
            link.id
        )));
    }

    aes::open(key.as_bytes(), sealed)
}

/// Rounds of store I/O a spawned view, delete or sweep unit may spend:
/// the row change, the vault eviction and the blob work.
const SETTLE_ROUNDS: u32 = 3;

/// The vault and blob side of links. Cloned into spawned units so that a
/// destroyed link loses its key in the same unit that deactivated it.
#[derive(Clone)]
struct Custody {
    vault: KeyVault,
    blobs: Arc<dyn BlobStore>,
    timeout: Duration,
}

impl Custody {
    async fn remove_blob(&self, link_id: &str, key: &str) {
        match with_timeout("blob delete", self.timeout, self.blobs.delete(key)).await {
            Ok(_) => {}
            Err(e) => tracing::warn!(link = %link_id, "Orphan blob {} left behind: {}", key, e),
        }
    }

    async fn load_sealed(&self, link: &LinkRecord) -> Result<Vec<u8>> {
        match &link.payload {
            StoredPayload::Inline(bytes) => Ok(bytes.clone()),
            StoredPayload::Blob(blob_key) => {
                with_timeout("blob get", self.timeout, self.blobs.get(blob_key))
                    .await?
                    .ok_or_else(|| {
                        AppError::Invariant(format!("blob for link {} is missing", link.id))
                    })
            }
        }
    }

    /// Destroys the key and blob of a link whose row is already inactive.
    async fn destroy(&self, link_id: &str, blob_key: Option<&str>) -> Result<()> {
        self.vault.evict(link_id).await?;
        if let Some(blob) = blob_key {
            self.remove_blob(link_id, blob).await;
        }
        Ok(())
    }

    /// Vault and blob work that follows an applied view.
    ///
    /// Returns the sealed payload when the view reveals content. On the
    /// terminal view the payload is read before the blob is removed.
    async fn settle_view(&self, applied: &AppliedView) -> Result<Option<Vec<u8>>> {
        let link = &applied.link;
        match &applied.transition {
            Transition::Reveal { last_view } => {
                let sealed = self.load_sealed(link).await;
                if *last_view {
                    if let Err(e) = self.vault.evict(&link.id).await {
                        tracing::error!(
                            alarm = true,
                            link = %link.id,
                            "Vault eviction failed after final view: {}",
                            e
                        );
                    }
                    if let Some(blob) = link.blob_key() {
                        self.remove_blob(&link.id, blob).await;
                    }
                }
                sealed.map(Some)
            }
            Transition::Reject { deactivate: true, .. } => {
                self.destroy(&link.id, link.blob_key()).await?;
                Ok(None)
            }
            _ => Ok(None),
        }
    }
}

/// Owns every transition of a link and of its vault entry.
pub struct LinkEngine {
    repo: Arc<dyn Repository>,
    custody: Custody,
    pricing: PricingConfig,
    policy: LinkPolicy,
    base_url: String,
    timeout: Duration,
}

impl LinkEngine {
    pub fn new(
        repo: Arc<dyn Repository>,
        vault: KeyVault,
        blobs: Arc<dyn BlobStore>,
        pricing: PricingConfig,
        policy: LinkPolicy,
        base_url: String,
        timeout: Duration,
    ) -> Self {
        Self {
            repo,
            custody: Custody {
                vault,
                blobs,
                timeout,
            },
            pricing,
            policy,
            base_url,
            timeout,
        }
    }

    pub fn vault(&self) -> &KeyVault {
        &self.custody.vault
    }

    fn settle_limit(&self) -> Duration {
        self.timeout * SETTLE_ROUNDS
    }

    /// Checks a request against the link policy and returns its price.
    pub fn quote(&self, request: &NewLinkRequest) -> Result<i64> {
        if request.content.is_empty() {
            return Err(AppError::validation("Content must not be empty"));
        }
        if request.content.len() > self.policy.max_content_bytes {
            return Err(AppError::validation(format!(
                "Content exceeds {} bytes",
                self.policy.max_content_bytes
            )));
        }

        let options = &request.options;
        options.validate()?;

        if options.effective_max_views() > self.policy.max_views {
            return Err(AppError::validation(format!(
                "max_views must not exceed {}",
                self.policy.max_views
            )));
        }
        if let Some(timer) = options.timer_ms {
            if timer as u128 > self.policy.max_timer.as_millis() {
                return Err(AppError::validation("Timer exceeds the maximum lifetime"));
            }
        }

        let size = request.content.len() as u64;
        Ok(pricing::cost(
            &self.pricing,
            request.content_type,
            Some(size),
            options,
        )?)
    }

    /// Creates a link, paying for it from `wallet_id`.
    ///
    /// Either the debit, the link row, the vault entry and the blob all exist
    /// afterwards, or none of them do. A timed-out insert is the exception:
    /// its outcome is unknown, so nothing is cleaned up.
    pub async fn create_link(&self, wallet_id: Uuid, request: NewLinkRequest) -> Result<CreatedLink> {
        let credit_cost = self.quote(&request)?;

        let NewLinkRequest {
            mut content,
            content_type,
            file_name,
            options,
        } = request;

        let size_bytes = content.len() as i64;
        let mime_type = match content_type {
            ContentType::Text => Some("text/plain; charset=utf-8".to_string()),
            ContentType::File => Some(
                infer::get(&content)
                    .map(|kind| kind.mime_type().to_string())
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
            ),
        };
        let file_name = match content_type {
            ContentType::File => file_name.as_deref().and_then(clean_file_name),
            ContentType::Text => None,
        };

        let key = aes::generate_key();
        let sealed = aes::seal(key.as_bytes(), &content);
        content.zeroize();
        let sealed = sealed?;
        let checksum = checksum(&sealed);

        let link_id = ids::new_link_id();

        let payload = if sealed.len() > self.policy.inline_limit {
            let blob_key = blob_key_for(&link_id);
            with_timeout("blob put", self.timeout, self.custody.blobs.put(&blob_key, &sealed))
                .await?;
            StoredPayload::Blob(blob_key)
        } else {
            StoredPayload::Inline(sealed)
        };
        let blob_key = match &payload {
            StoredPayload::Blob(key) => Some(key.clone()),
            StoredPayload::Inline(_) => None,
        };

        let password_hash = match &options.password {
            Some(pw) => match password::hash_secret_blocking(pw.clone()).await {
                Ok(hash) => Some(hash),
                Err(e) => {
                    self.discard(&link_id, blob_key.as_deref(), false).await;
                    return Err(e);
                }
            },
            None => None,
        };

        // Timed keys are bound to the link's own expiry instant, so the vault
        // can only ever lose a key before the link expires.
        let expires_at = options
            .timer_ms
            .map(|ms| Utc::now() + chrono::Duration::milliseconds(ms));
        let stored = match expires_at {
            Some(deadline) => self.custody.vault.put_until(&link_id, &key, deadline).await,
            None => {
                self.custody
                    .vault
                    .put(&link_id, &key, self.policy.default_key_ttl)
                    .await
            }
        };

        if let Err(e) = stored {
            // A timed-out put may still land.
            let evict = matches!(e, AppError::Timeout(_));
            self.discard(&link_id, blob_key.as_deref(), evict).await;
            return Err(e);
        }

        let new_link = NewLink {
            id: link_id.clone(),
            wallet_id,
            content_type,
            payload,
            checksum,
            size_bytes,
            mime_type,
            file_name,
            max_views: options.effective_max_views() as i32,
            expires_at,
            password_hash,
            allowed_regions: options
                .allowed_regions
                .map(|r| r.into_iter().map(|c| c.to_ascii_uppercase()).collect()),
            device_id: options.device_id,
            screenshot_block: options.screenshot_block,
            camouflage: options.camouflage,
        };
        let debit = LedgerEntry::debit(credit_cost, format!("Link created ({})", content_type.as_str()))?;

        let repo = self.repo.clone();
        let inserted = detached("link insert", self.timeout, async move {
            repo.insert_link_with_debit(new_link, debit).await
        })
        .await;

        match inserted {
            Ok(record) => {
                tracing::info!(
                    link = %record.id,
                    wallet = %wallet_id,
                    credit_cost,
                    content_type = content_type.as_str(),
                    "🔗 Link created"
                );
                Ok(CreatedLink {
                    url: format!("{}{}", self.base_url, record.id),
                    link_id: record.id,
                    credit_cost,
                })
            }
            Err(AppError::Timeout(op)) => {
                tracing::warn!(link = %link_id, "Link insert outcome unknown after timeout");
                Err(AppError::Timeout(op))
            }
            Err(e) => {
                self.discard(&link_id, blob_key.as_deref(), true).await;
                Err(e)
            }
        }
    }

    /// Best-effort removal of state written before a failed create.
    async fn discard(&self, link_id: &str, blob_key: Option<&str>, evict: bool) {
        if evict {
            if let Err(e) = self.custody.vault.evict(link_id).await {
                tracing::warn!(link = %link_id, "Orphan vault entry left behind: {}", e);
            }
        }
        if let Some(key) = blob_key {
            self.custody.remove_blob(link_id, key).await;
        }
    }

    /// Runs one view attempt.
    pub async fn view_link(
        &self,
        link_id: &str,
        supplied_password: Option<String>,
        client: ClientContext,
    ) -> Result<ViewOutcome> {
        if !ids::is_well_formed(link_id) {
            return Err(DomainError::LinkNotFound.into());
        }

        let snapshot = with_timeout("link lookup", self.timeout, self.repo.find_link(link_id))
            .await?
            .ok_or(DomainError::LinkNotFound)?;

        // The hash is immutable, so checking it outside the row lock is safe.
        let password_check = match (&snapshot.password_hash, supplied_password) {
            (None, _) => PasswordCheck::NotRequired,
            (Some(_), _) if !snapshot.active => PasswordCheck::NotSupplied,
            (Some(_), None) => PasswordCheck::NotSupplied,
            (Some(hash), Some(pw)) => {
                if password::verify_secret_blocking(pw, hash.clone()).await? {
                    PasswordCheck::Matched
                } else {
                    PasswordCheck::Mismatched
                }
            }
        };

        let key = if snapshot.active {
            self.custody.vault.get(link_id).await?
        } else {
            None
        };

        let attempt = ViewAttempt {
            password: password_check,
            client,
            key_available: key.is_some(),
            now: Utc::now(),
        };

        // The row change and the vault/blob teardown it implies run as one
        // spawned unit; a dropped caller cannot leave a key behind.
        let repo = self.repo.clone();
        let custody = self.custody.clone();
        let id = link_id.to_string();
        let (applied, sealed) = detached("link view", self.settle_limit(), async move {
            let Some(applied) = repo.apply_view(&id, &attempt).await? else {
                return Ok(None);
            };
            let sealed = custody.settle_view(&applied).await?;
            Ok(Some((applied, sealed)))
        })
        .await?
        .ok_or(DomainError::LinkNotFound)?;

        match applied.transition {
            Transition::Reject { reason, deactivate } => {
                if deactivate {
                    tracing::info!(link = %link_id, "💥 Link destroyed: {}", reason);
                }
                Err(reason.into())
            }
            Transition::PasswordRequired => Ok(ViewOutcome::PasswordRequired),
            Transition::Reveal { last_view } => {
                let (Some(key), Some(sealed)) = (key, sealed) else {
                    return Err(AppError::Invariant(format!(
                        "link {} revealed without a key or payload",
                        link_id
                    )));
                };
                let content = open_sealed(&applied.link, &key, &sealed)?;
                tracing::info!(
                    link = %link_id,
                    views = applied.link.views,
                    max_views = applied.link.max_views,
                    last_view,
                    "👁️ Link viewed"
                );

                Ok(ViewOutcome::Revealed(RevealedContent {
                    content,
                    content_type: applied.link.content_type,
                    mime_type: applied.link.mime_type.clone(),
                    file_name: applied.link.file_name.clone(),
                    is_last_view: last_view,
                    screenshot_block: applied.link.screenshot_block,
                    camouflage: applied.link.camouflage,
                }))
            }
        }
    }

    /// Deletes a link owned by `wallet_id`, its key and its blob.
    pub async fn delete_link(&self, wallet_id: Uuid, link_id: &str) -> Result<()> {
        if !ids::is_well_formed(link_id) {
            return Err(DomainError::LinkNotFound.into());
        }

        let repo = self.repo.clone();
        let custody = self.custody.clone();
        let id = link_id.to_string();
        detached("link delete", self.settle_limit(), async move {
            let Some(removed) = repo.delete_link(wallet_id, &id).await? else {
                return Ok(None);
            };
            custody.destroy(&id, removed.blob_key()).await?;
            Ok(Some(removed))
        })
        .await?
        .ok_or(DomainError::LinkNotFound)?;

        tracing::info!(link = %link_id, wallet = %wallet_id, "🗑️ Link deleted");
        Ok(())
    }

    /// The wallet's links, newest first.
    pub async fn list_links(&self, wallet_id: Uuid) -> Result<Vec<LinkSummary>> {
        with_timeout(
            "link list",
            self.timeout,
            self.repo.list_links(wallet_id, Utc::now()),
        )
        .await
    }

    /// Deactivates links whose timer passed and destroys their keys and blobs.
    /// Returns how many links were swept.
    pub async fn sweep_expired(&self, batch: i64) -> Result<usize> {
        let repo = self.repo.clone();
        let custody = self.custody.clone();
        let now = Utc::now();
        let expired = detached("expiry sweep", self.settle_limit(), async move {
            let expired = repo.deactivate_expired(now, batch).await?;
            for link in &expired {
                if let Err(e) = custody.destroy(&link.id, link.blob_key.as_deref()).await {
                    tracing::error!(link = %link.id, "Sweep could not evict key: {}", e);
                }
            }
            Ok(expired)
        })
        .await?;

        if !expired.is_empty() {
            tracing::info!("🧹 Swept {} expired links", expired.len());
        }
        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_lose_their_directories() {
        assert_eq!(clean_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(clean_file_name("C:\\docs\\report.pdf").as_deref(), Some("report.pdf"));
        assert_eq!(clean_file_name("dir/"), None);
        assert_eq!(clean_file_name("a\u{0}b.txt").as_deref(), Some("ab.txt"));
    }
}
