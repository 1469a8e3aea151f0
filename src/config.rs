use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use zeroize::{Zeroize, Zeroizing};

const DAY_SECS: u64 = 86_400;

/// Where durable and ephemeral state lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    /// PostgreSQL for wallets, ledger and links; Redis for keys and sessions.
    Postgres {
        database_url: String,
        redis_url: String,
    },
    /// Everything in process memory. Local development and tests only.
    Memory,
}

/// How the region and device lock surcharges combine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockSurcharge {
    /// One surcharge when either lock is set.
    Combined,
    /// One surcharge per lock.
    Additive,
}

impl FromStr for LockSurcharge {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "combined" => Ok(LockSurcharge::Combined),
            "additive" => Ok(LockSurcharge::Additive),
            other => anyhow::bail!("unknown lock surcharge policy: {other}"),
        }
    }
}

/// Credit prices for link features.
#[derive(Clone, Debug)]
pub struct PricingConfig {
    pub text_cost: i64,
    pub file_small_cost: i64,
    pub file_large_cost: i64,
    /// Files strictly larger than this many bytes are charged `file_large_cost`.
    pub file_large_threshold: u64,
    pub password_cost: i64,
    pub screenshot_block_cost: i64,
    pub lock_cost: i64,
    pub camouflage_cost: i64,
    pub lock_surcharge: LockSurcharge,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            text_cost: 1,
            file_small_cost: 3,
            file_large_cost: 5,
            file_large_threshold: 5 * 1024 * 1024,
            password_cost: 1,
            screenshot_block_cost: 2,
            lock_cost: 2,
            camouflage_cost: 3,
            lock_surcharge: LockSurcharge::Combined,
        }
    }
}

/// Limits applied to link creation.
#[derive(Clone, Debug)]
pub struct LinkPolicy {
    /// Vault TTL for links without a timer.
    pub default_key_ttl: Duration,
    /// Longest timer a link may carry.
    pub max_timer: Duration,
    /// Highest accepted `max_views`.
    pub max_views: u32,
    /// Largest accepted plaintext, in bytes.
    pub max_content_bytes: usize,
    /// Sealed payloads above this size go to blob storage.
    pub inline_limit: usize,
}

impl Default for LinkPolicy {
    fn default() -> Self {
        Self {
            default_key_ttl: Duration::from_secs(7 * DAY_SECS),
            max_timer: Duration::from_secs(30 * DAY_SECS),
            max_views: 100,
            max_content_bytes: 25 * 1024 * 1024,
            inline_limit: 1024 * 1024,
        }
    }
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// Backing stores.
    pub storage: StorageBackend,
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Prefix of shareable link URLs; the link id is appended.
    pub link_base_url: String,
    /// Directory for blob-backed payloads.
    pub blob_dir: String,
    /// Upper bound for every store and vault call.
    pub io_timeout: Duration,
    /// Interval of the background expiry sweep.
    pub sweep_interval: Duration,
    /// The duration of a session in days.
    pub session_duration_days: i64,
    /// Credits granted to a new wallet.
    pub welcome_bonus: i64,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
    /// Whether cookies are marked `Secure`.
    pub is_production: bool,
    pub pricing: PricingConfig,
    pub links: LinkPolicy,
    /// The master key used to derive the vault wrapping key and lookup pepper.
    pub master_key: Zeroizing<Vec<u8>>,
}

impl Config {
    /// A configuration with defaults everywhere and in-memory storage.
    pub fn with_defaults(master_key: [u8; 32]) -> Self {
        Self {
            storage: StorageBackend::Memory,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            link_base_url: "http://localhost:3000/v/".to_string(),
            blob_dir: "uploads/links".to_string(),
            io_timeout: Duration::from_secs(3),
            sweep_interval: Duration::from_secs(300),
            session_duration_days: 7,
            welcome_bonus: 1,
            cors_origins: vec!["http://localhost:3000".to_string()],
            is_production: false,
            pricing: PricingConfig::default(),
            links: LinkPolicy::default(),
            master_key: Zeroizing::new(master_key.to_vec()),
        }
    }

    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let mut master_key_hex = env::var("MASTER_KEY")
            .context("MASTER_KEY must be set (generate with: openssl rand -hex 32)")?;

        let master_key_bytes = hex::decode(&master_key_hex)
            .context("MASTER_KEY must be valid hexadecimal")?;

        master_key_hex.zeroize();

        let master_key: [u8; 32] = master_key_bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("MASTER_KEY must be exactly 32 bytes (64 hex characters)"))?;

        let mut config = Self::with_defaults(master_key);

        config.storage = match env_or("STORAGE_BACKEND", "postgres".to_string())?.as_str() {
            "memory" => StorageBackend::Memory,
            "postgres" => StorageBackend::Postgres {
                database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
                redis_url: env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            },
            other => anyhow::bail!("STORAGE_BACKEND must be 'postgres' or 'memory', got '{other}'"),
        };

        config.bind_addr = env_or("BIND_ADDR", config.bind_addr)?;
        config.link_base_url = env_or("LINK_BASE_URL", config.link_base_url)?;
        config.blob_dir = env_or("BLOB_DIR", config.blob_dir)?;
        config.io_timeout = Duration::from_millis(env_or("STORE_TIMEOUT_MS", 3_000u64)?);
        config.sweep_interval = Duration::from_secs(env_or("SWEEP_INTERVAL_SECS", 300u64)?);
        config.session_duration_days = env_or("SESSION_DURATION_DAYS", config.session_duration_days)?;
        config.welcome_bonus = env_or("CREDITS_FREE_TRIAL", config.welcome_bonus)?;
        config.is_production = env_or("APP_ENV", "development".to_string())? == "production";

        if let Ok(origins) = env::var("CORS_ORIGINS") {
            config.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }

        let pricing = &mut config.pricing;
        pricing.text_cost = env_or("CREDITS_TEXT_COST", pricing.text_cost)?;
        pricing.file_small_cost = env_or("CREDITS_FILE_SMALL_COST", pricing.file_small_cost)?;
        pricing.file_large_cost = env_or("CREDITS_FILE_LARGE_COST", pricing.file_large_cost)?;
        pricing.file_large_threshold =
            env_or("CREDITS_FILE_LARGE_THRESHOLD", pricing.file_large_threshold)?;
        pricing.password_cost = env_or("CREDITS_PASSWORD_COST", pricing.password_cost)?;
        pricing.screenshot_block_cost =
            env_or("CREDITS_SCREENSHOT_BLOCK_COST", pricing.screenshot_block_cost)?;
        pricing.lock_cost = env_or("CREDITS_REGION_DEVICE_COST", pricing.lock_cost)?;
        pricing.camouflage_cost = env_or("CREDITS_CAMOUFLAGE_COST", pricing.camouflage_cost)?;
        pricing.lock_surcharge = env_or("CREDITS_LOCK_SURCHARGE", pricing.lock_surcharge)?;

        let links = &mut config.links;
        links.default_key_ttl =
            Duration::from_secs(env_or("LINK_DEFAULT_KEY_TTL_SECS", 7 * DAY_SECS)?);
        links.max_timer = Duration::from_secs(env_or("LINK_MAX_TIMER_DAYS", 30u64)? * DAY_SECS);
        links.max_views = env_or("LINK_MAX_VIEWS", links.max_views)?;
        links.max_content_bytes = env_or("LINK_MAX_FILE_SIZE", links.max_content_bytes)?;
        links.inline_limit = env_or("LINK_INLINE_LIMIT", links.inline_limit)?;

        if links.default_key_ttl > links.max_timer {
            anyhow::bail!("LINK_DEFAULT_KEY_TTL_SECS must not exceed LINK_MAX_TIMER_DAYS");
        }

        Ok(config)
    }
}

/// Reads and parses an environment variable, falling back to `default` when unset.
fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {name}: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_surcharge_parses_both_policies() {
        assert_eq!("combined".parse::<LockSurcharge>().unwrap(), LockSurcharge::Combined);
        assert_eq!(" Additive ".parse::<LockSurcharge>().unwrap(), LockSurcharge::Additive);
        assert!("both".parse::<LockSurcharge>().is_err());
    }

    #[test]
    fn defaults_keep_vault_ttl_inside_timer_limit() {
        let config = Config::with_defaults([7u8; 32]);
        assert!(config.links.default_key_ttl <= config.links.max_timer);
        assert_eq!(config.links.default_key_ttl, Duration::from_secs(7 * DAY_SECS));
        assert_eq!(config.storage, StorageBackend::Memory);
    }
}
