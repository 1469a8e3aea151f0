use std::sync::Arc;

use crate::config::{Config, StorageBackend};
use crate::crypto::kek::Kek;
use crate::error::Result;
use crate::repositories::memory::MemoryRepository;
use crate::repositories::postgres::PgRepository;
use crate::repositories::Repository;
use crate::services::key_vault::KeyVault;
use crate::services::ledger::CreditLedger;
use crate::services::links::LinkEngine;
use crate::services::sessions::SessionService;
use crate::services::wallets::WalletService;
use crate::storage::blob::{BlobStore, FsBlobStore, MemoryBlobStore};
use crate::storage::ephemeral::{EphemeralStore, MemoryEphemeral, RedisStore};

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Arc<Config>,
    /// The link lifecycle engine.
    pub links: Arc<LinkEngine>,
    pub ledger: Arc<CreditLedger>,
    pub wallets: Arc<WalletService>,
    pub sessions: Arc<SessionService>,
    /// Rate-limit counters live here too.
    pub ephemeral: Arc<dyn EphemeralStore>,
    pub repo: Arc<dyn Repository>,
}

impl AppState {
    /// Connects the configured backends and builds the services.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        match &config.storage {
            StorageBackend::Postgres {
                database_url,
                redis_url,
            } => {
                let pool = crate::db::create_pool(database_url, config.io_timeout)?;
                crate::db::run_migrations(&pool).await?;
                tracing::info!("✅ PostgreSQL pool initialized");

                let redis = RedisStore::connect(redis_url).await?;
                tracing::info!("✅ Redis connection manager initialized");

                let blobs = FsBlobStore::new(&config.blob_dir).await?;
                tracing::info!("✅ Blob storage at {}", config.blob_dir);

                Ok(Self::from_backends(
                    config.clone(),
                    Arc::new(PgRepository::new(pool)),
                    Arc::new(redis),
                    Arc::new(blobs),
                ))
            }
            StorageBackend::Memory => {
                tracing::warn!("⚠️ Using in-memory storage; nothing survives a restart");
                Ok(Self::in_memory(config.clone()))
            }
        }
    }

    /// All-in-memory state.
    pub fn in_memory(config: Config) -> Self {
        Self::from_backends(
            config,
            Arc::new(MemoryRepository::new()),
            Arc::new(MemoryEphemeral::new()),
            Arc::new(MemoryBlobStore::new()),
        )
    }

    /// Wires the services over explicit backends.
    pub fn from_backends(
        config: Config,
        repo: Arc<dyn Repository>,
        ephemeral: Arc<dyn EphemeralStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let kek = Kek::from_master(&config.master_key);
        let vault = KeyVault::new(ephemeral.clone(), kek, config.io_timeout);

        let links = LinkEngine::new(
            repo.clone(),
            vault,
            blobs,
            config.pricing.clone(),
            config.links.clone(),
            config.link_base_url.clone(),
            config.io_timeout,
        );
        let ledger = CreditLedger::new(repo.clone(), config.io_timeout);
        let wallets = WalletService::new(
            repo.clone(),
            config.master_key.clone(),
            config.welcome_bonus,
            config.io_timeout,
        );
        let sessions = SessionService::new(
            ephemeral.clone(),
            config.session_duration_days,
            config.io_timeout,
        );

        Self {
            config: Arc::new(config),
            links: Arc::new(links),
            ledger: Arc::new(ledger),
            wallets: Arc::new(wallets),
            sessions: Arc::new(sessions),
            ephemeral,
            repo,
        }
    }
}
