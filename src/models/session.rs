use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A wallet session stored in the ephemeral store under `session:{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// The session id carried by the `session_id` cookie.
    pub id: Uuid,
    /// The wallet this session belongs to.
    pub wallet_id: Uuid,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}
