use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::crypto::csrf;
use crate::error::{AppError, Result};
use crate::models::session::Session;
use crate::services::bounded::with_timeout;
use crate::storage::ephemeral::EphemeralStore;

fn session_key(id: Uuid) -> String {
    format!("session:{}", id)
}

fn csrf_key(token: &str) -> String {
    format!("csrf:{}", token)
}

/// A freshly issued session and its CSRF token.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session: Session,
    pub csrf_token: String,
}

/// Wallet sessions and their CSRF tokens in the ephemeral store.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn EphemeralStore>,
    duration_days: i64,
    timeout: Duration,
}

impl SessionService {
    pub fn new(store: Arc<dyn EphemeralStore>, duration_days: i64, timeout: Duration) -> Self {
        Self {
            store,
            duration_days,
            timeout,
        }
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.duration_days.max(1) as u64 * 86_400)
    }

    pub async fn issue(&self, wallet_id: Uuid) -> Result<IssuedSession> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            wallet_id,
            created_at: now,
            expires_at: now + chrono::Duration::days(self.duration_days.max(1)),
        };

        let session_json = sonic_rs::to_string(&session)
            .map_err(|e| AppError::Internal(format!("Session serialization failed: {}", e)))?;

        with_timeout(
            "session write",
            self.timeout,
            self.store
                .set_ex(&session_key(session.id), session_json.as_bytes(), self.ttl()),
        )
        .await?;

        let csrf_token = csrf::generate_csrf_token();
        with_timeout(
            "csrf write",
            self.timeout,
            self.store.set_ex(
                &csrf_key(&csrf_token),
                session.id.to_string().as_bytes(),
                self.ttl(),
            ),
        )
        .await?;

        tracing::debug!("✅ Session issued for wallet {}", wallet_id);
        Ok(IssuedSession {
            session,
            csrf_token,
        })
    }

    /// The live session for `id`, if any.
    pub async fn get(&self, id: Uuid) -> Result<Option<Session>> {
        let raw = with_timeout("session read", self.timeout, self.store.get(&session_key(id)))
            .await?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let session: Session = match sonic_rs::from_slice(&raw) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("❌ Invalid session JSON: {}", e);
                return Ok(None);
            }
        };

        if session.is_expired() {
            self.store.del(&session_key(id)).await?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Whether `token` was issued for `session_id` and is still live.
    pub async fn csrf_valid(&self, token: &str, session_id: Uuid) -> Result<bool> {
        let bound = with_timeout("csrf read", self.timeout, self.store.get(&csrf_key(token)))
            .await?;
        Ok(bound.is_some_and(|b| b == session_id.to_string().as_bytes()))
    }

    pub async fn revoke(&self, session_id: Uuid, csrf_token: Option<&str>) -> Result<()> {
        with_timeout(
            "session delete",
            self.timeout,
            self.store.del(&session_key(session_id)),
        )
        .await?;
        if let Some(token) = csrf_token {
            with_timeout("csrf delete", self.timeout, self.store.del(&csrf_key(token))).await?;
        }
        Ok(())
    }
}
