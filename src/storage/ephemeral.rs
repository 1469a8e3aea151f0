//! Short-lived key/value state: vault entries, sessions, CSRF tokens and
//! rate-limit counters.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::Result;

/// A TTL-aware key/value store kept apart from the durable database.
#[async_trait]
pub trait EphemeralStore: Send + Sync + 'static {
    /// Writes `value`, replacing any previous one.
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Writes `value` only if `key` is absent. Returns whether it was written.
    async fn set_nx_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool>;

    /// Like `set_nx_ex`, but the entry expires at the wall-clock `deadline`
    /// however long the write takes to land.
    async fn set_nx_until(&self, key: &str, value: &[u8], deadline: DateTime<Utc>)
        -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Removes `key`. Returns whether it existed.
    async fn del(&self, key: &str) -> Result<bool>;

    /// Increments a counter, starting its TTL on first use.
    async fn incr_ex(&self, key: &str, ttl: Duration) -> Result<i64>;

    /// Remaining lifetime of `key`, `None` when absent.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    async fn ping(&self) -> Result<()>;
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

/// Redis-backed store.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl EphemeralStore for RedisStore {
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .arg("NX")
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(reply.is_some())
    }

    async fn set_nx_until(
        &self,
        key: &str,
        value: &[u8],
        deadline: DateTime<Utc>,
    ) -> Result<bool> {
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PXAT")
            .arg(deadline.timestamp_millis().max(1))
            .arg("NX")
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(value)
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(removed > 0)
    }

    async fn incr_ex(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut conn = self.conn.clone();
        let count: i64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;
        if count == 1 {
            let _: i64 = redis::cmd("PEXPIRE")
                .arg(key)
                .arg(ttl_millis(ttl))
                .query_async(&mut conn)
                .await?;
        }
        Ok(count)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let millis: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut self.conn.clone())
            .await?;
        // -2: no such key, -1: no expiry
        Ok(match millis {
            -2 => None,
            -1 => Some(Duration::MAX),
            ms => Some(Duration::from_millis(ms.max(0) as u64)),
        })
    }

    async fn ping(&self) -> Result<()> {
        let _: String = redis::cmd("PING")
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(())
    }
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-process store with the same expiry semantics as Redis.
#[derive(Default)]
pub struct MemoryEphemeral {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryEphemeral {
    pub fn new() -> Self {
        Self::default()
    }

    fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| e.expires_at <= now) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }
}

#[async_trait]
impl EphemeralStore for MemoryEphemeral {
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        if Self::live(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn set_nx_until(
        &self,
        key: &str,
        value: &[u8],
        deadline: DateTime<Utc>,
    ) -> Result<bool> {
        // A deadline already in the past stores an entry that is gone at once.
        let remaining = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        self.set_nx_ex(key, value, remaining).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.lock().await;
        Ok(Self::live(&mut entries, key).map(|e| e.value.clone()))
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        let existed = Self::live(&mut entries, key).is_some();
        entries.remove(key);
        Ok(existed)
    }

    async fn incr_ex(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut entries = self.entries.lock().await;
        let current = Self::live(&mut entries, key)
            .and_then(|e| std::str::from_utf8(&e.value).ok()?.parse::<i64>().ok());

        match current {
            Some(count) => {
                let next = count + 1;
                if let Some(entry) = entries.get_mut(key) {
                    entry.value = next.to_string().into_bytes();
                }
                Ok(next)
            }
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: b"1".to_vec(),
                        expires_at: Instant::now() + ttl,
                    },
                );
                Ok(1)
            }
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut entries = self.entries.lock().await;
        Ok(Self::live(&mut entries, key)
            .map(|e| e.expires_at.saturating_duration_since(Instant::now())))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_nx_refuses_existing_key() {
        let store = MemoryEphemeral::new();
        assert!(store.set_nx_ex("k", b"a", Duration::from_secs(60)).await.unwrap());
        assert!(!store.set_nx_ex("k", b"b", Duration::from_secs(60)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some(&b"a"[..]));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_vanish_after_ttl() {
        let store = MemoryEphemeral::new();
        store.set_ex("k", b"v", Duration::from_millis(50)).await.unwrap();
        assert!(store.ttl("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.ttl("k").await.unwrap().is_none());
        assert!(store.set_nx_ex("k", b"w", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn set_nx_until_expires_at_the_deadline() {
        let store = MemoryEphemeral::new();
        let deadline = Utc::now() + chrono::Duration::milliseconds(40);
        assert!(store.set_nx_until("k", b"v", deadline).await.unwrap());
        assert!(!store.set_nx_until("k", b"w", deadline).await.unwrap());
        assert!(store.ttl("k").await.unwrap().unwrap() <= Duration::from_millis(40));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.get("k").await.unwrap().is_none());

        let past = Utc::now() - chrono::Duration::seconds(1);
        assert!(store.set_nx_until("gone", b"v", past).await.unwrap());
        assert!(store.get("gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn del_is_idempotent() {
        let store = MemoryEphemeral::new();
        store.set_ex("k", b"v", Duration::from_secs(60)).await.unwrap();
        assert!(store.del("k").await.unwrap());
        assert!(!store.del("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn counters_keep_their_first_ttl() {
        let store = MemoryEphemeral::new();
        assert_eq!(store.incr_ex("c", Duration::from_secs(10)).await.unwrap(), 1);
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.incr_ex("c", Duration::from_secs(10)).await.unwrap(), 2);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.incr_ex("c", Duration::from_secs(10)).await.unwrap(), 1);
    }
}
