use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Expected outcomes of a valid request against current state.
///
/// These are never logged as errors; each one maps to its own status code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The wallet cannot pay for the requested operation.
    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: i64, available: i64 },

    /// No credit account exists for the wallet.
    #[error("Wallet not found")]
    WalletNotFound,

    /// No link with this id (or not owned by the caller).
    #[error("Link not found")]
    LinkNotFound,

    /// The link was already deactivated.
    #[error("Link has been destroyed")]
    LinkDestroyed,

    /// The link's timer elapsed.
    #[error("Link has expired")]
    LinkExpired,

    /// The link reached its maximum number of views.
    #[error("Link has reached maximum views")]
    LinkConsumed,

    /// The decryption key is gone from the vault.
    #[error("Link key has expired")]
    KeyExpired,

    /// The supplied password does not match.
    #[error("Invalid password")]
    InvalidPassword,

    /// The client's region is not in the link's allow-list.
    #[error("Region not allowed")]
    RegionBlocked,

    /// The client's device does not match the locked device.
    #[error("Device not allowed")]
    DeviceMismatch,

    /// The request itself is malformed.
    #[error("Validation error: {0}")]
    Validation(String),
}

impl DomainError {
    /// The HTTP status reported for this outcome.
    pub fn status(&self) -> StatusCode {
        match self {
            DomainError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
            DomainError::WalletNotFound
            | DomainError::LinkNotFound
            | DomainError::LinkDestroyed
            | DomainError::LinkExpired
            | DomainError::LinkConsumed => StatusCode::NOT_FOUND,
            DomainError::KeyExpired => StatusCode::GONE,
            DomainError::InvalidPassword => StatusCode::UNAUTHORIZED,
            DomainError::RegionBlocked | DomainError::DeviceMismatch => StatusCode::FORBIDDEN,
            DomainError::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// The message shown to the client.
    pub fn client_message(&self) -> String {
        match self {
            DomainError::InsufficientCredits { .. } => "Insufficient credits".to_string(),
            DomainError::Validation(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// The application's error type.
///
/// Domain outcomes, infrastructure failures and invariant violations are
/// kept in separate variants so a wrong password can never be mistaken for
/// an unreachable database.
#[derive(Error, Debug)]
pub enum AppError {
    /// An expected domain outcome.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A connection pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// A pool construction error.
    #[error("Pool creation error: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// An I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A store or vault call exceeded its time budget.
    #[error("Timed out during {0}")]
    Timeout(&'static str),

    /// An encryption error.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// A broken atomicity contract. Always a bug.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// An authentication error.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// An authorization error.
    #[error("Authorization failed")]
    Unauthorized,

    /// A rate limit exceeded error.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Shorthand for a domain validation failure.
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Domain(DomainError::Validation(msg.into()))
    }

    /// Returns the domain outcome, if this is one.
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            AppError::Domain(e) => Some(e),
            _ => None,
        }
    }

    /// True for failures of the store, vault or pool rather than the request.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Pool(_)
                | AppError::CreatePool(_)
                | AppError::Redis(_)
                | AppError::Io(_)
                | AppError::Timeout(_)
                | AppError::Encryption(_)
                | AppError::Internal(_)
        )
    }

    /// Infrastructure failures a caller may retry once.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Timeout(_) | AppError::Pool(_) | AppError::Redis(_)
        )
    }
}

impl From<garde::Report> for AppError {
    fn from(report: garde::Report) -> Self {
        AppError::validation(report.to_string().trim().to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut required: Option<i64> = None;

        let (status, message) = match self {
            AppError::Domain(ref e) => {
                tracing::debug!("Domain outcome: {}", e);
                if let DomainError::InsufficientCredits { required: cost, .. } = e {
                    required = Some(*cost);
                }
                (e.status(), e.client_message())
            }

            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Pool(ref e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable".to_string())
            }

            AppError::CreatePool(ref e) => {
                tracing::error!("Pool creation error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable".to_string())
            }

            AppError::Io(ref e) => {
                tracing::error!("IO error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "File system error".to_string())
            }

            AppError::Timeout(op) => {
                tracing::error!("Timed out during {}", op);
                (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable".to_string())
            }

            AppError::Encryption(ref msg) => {
                tracing::error!("Encryption error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Encryption error".to_string())
            }

            AppError::Invariant(ref msg) => {
                tracing::error!(alarm = true, "🚨 Invariant violated: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }

            AppError::Authentication(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                (StatusCode::UNAUTHORIZED, msg.clone())
            }

            AppError::Unauthorized => {
                tracing::warn!("Authorization failed");
                (StatusCode::FORBIDDEN, "Forbidden".to_string())
            }

            AppError::RateLimitExceeded(ref msg) => {
                tracing::warn!("Rate limit exceeded: {}", msg);
                (StatusCode::TOO_MANY_REQUESTS, msg.clone())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = match required {
            Some(cost) => sonic_rs::to_string(&sonic_rs::json!({
                "error": message,
                "required": cost
            })),
            None => sonic_rs::to_string(&sonic_rs::json!({
                "error": message
            })),
        }
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn domain_outcomes_map_to_distinct_statuses() {
        assert_eq!(
            DomainError::InsufficientCredits { required: 3, available: 1 }.status(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(DomainError::LinkConsumed.status(), StatusCode::NOT_FOUND);
        assert_eq!(DomainError::LinkExpired.status(), StatusCode::NOT_FOUND);
        assert_eq!(DomainError::InvalidPassword.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(DomainError::RegionBlocked.status(), StatusCode::FORBIDDEN);
        assert_eq!(DomainError::DeviceMismatch.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            DomainError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn infrastructure_is_not_a_domain_outcome() {
        let timeout = AppError::Timeout("vault get");
        assert!(timeout.domain().is_none());
        assert!(timeout.is_infrastructure());
        assert!(timeout.is_retryable());

        let wrong_password = AppError::from(DomainError::InvalidPassword);
        assert_eq!(wrong_password.domain(), Some(&DomainError::InvalidPassword));
        assert!(!wrong_password.is_infrastructure());
        assert!(!wrong_password.is_retryable());
    }

    #[tokio::test]
    async fn insufficient_credits_body_carries_required_amount() {
        let response = AppError::from(DomainError::InsufficientCredits {
            required: 7,
            available: 1,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Insufficient credits");
        assert_eq!(body["required"], 7);
    }
}
