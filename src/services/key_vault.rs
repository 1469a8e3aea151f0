use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::crypto::aes::SecureKey;
use crate::crypto::kek::Kek;
use crate::error::{AppError, Result};
use crate::services::bounded::with_timeout;
use crate::storage::ephemeral::EphemeralStore;

/// Content keys, held apart from the ciphertext, each with its own TTL.
///
/// Keys are wrapped with the vault KEK before they reach the store.
#[derive(Clone)]
pub struct KeyVault {
    store: Arc<dyn EphemeralStore>,
    kek: Kek,
    timeout: Duration,
}

fn vault_key(link_id: &str) -> String {
    format!("link:{}:key", link_id)
}

impl KeyVault {
    pub fn new(store: Arc<dyn EphemeralStore>, kek: Kek, timeout: Duration) -> Self {
        Self { store, kek, timeout }
    }

    /// Stores the key for a new link. A second put for the same id is refused.
    pub async fn put(&self, link_id: &str, key: &SecureKey, ttl: Duration) -> Result<()> {
        let wrapped = self.kek.wrap(key)?;
        let written = with_timeout(
            "vault put",
            self.timeout,
            self.store.set_nx_ex(&vault_key(link_id), &wrapped, ttl),
        )
        .await?;
        self.check_written(link_id, written)?;
        tracing::debug!("🔑 Vault key stored for link {} (ttl {:?})", link_id, ttl);
        Ok(())
    }

    /// Stores the key for a timed link so that it is gone by `deadline`,
    /// the link's own expiry.
    pub async fn put_until(
        &self,
        link_id: &str,
        key: &SecureKey,
        deadline: DateTime<Utc>,
    ) -> Result<()> {
        if deadline <= Utc::now() {
            return Err(AppError::validation("Timer elapsed before the link was stored"));
        }

        let wrapped = self.kek.wrap(key)?;
        let written = with_timeout(
            "vault put",
            self.timeout,
            self.store.set_nx_until(&vault_key(link_id), &wrapped, deadline),
        )
        .await?;
        self.check_written(link_id, written)?;
        tracing::debug!("🔑 Vault key stored for link {} (until {})", link_id, deadline);
        Ok(())
    }

    fn check_written(&self, link_id: &str, written: bool) -> Result<()> {
        if written {
            Ok(())
        } else {
            Err(AppError::Invariant(format!(
                "vault already holds a key for link {}",
                link_id
            )))
        }
    }

    /// The key, or `None` once expired or evicted.
    pub async fn get(&self, link_id: &str) -> Result<Option<SecureKey>> {
        let wrapped = with_timeout("vault get", self.timeout, self.store.get(&vault_key(link_id)))
            .await?;
        wrapped.map(|w| self.kek.unwrap_key(&w)).transpose()
    }

    /// Removes the key. Idempotent; retried once on infrastructure failure.
    pub async fn evict(&self, link_id: &str) -> Result<bool> {
        let key = vault_key(link_id);
        let first = with_timeout("vault evict", self.timeout, self.store.del(&key)).await;
        let result = match first {
            Err(e) if e.is_retryable() => {
                tracing::warn!("Vault evict for {} failed, retrying: {}", link_id, e);
                with_timeout("vault evict", self.timeout, self.store.del(&key)).await
            }
            other => other,
        };
        if let Ok(true) = result {
            tracing::debug!("🗑️ Vault key evicted for link {}", link_id);
        }
        result
    }

    /// Remaining lifetime of the key.
    pub async fn ttl(&self, link_id: &str) -> Result<Option<Duration>> {
        with_timeout("vault ttl", self.timeout, self.store.ttl(&vault_key(link_id))).await
    }
}
