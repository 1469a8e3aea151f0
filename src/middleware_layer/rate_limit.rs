use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{error::AppError, state::AppState};

/// Wallets one address may create per window.
const WALLET_CREATE_LIMIT: i64 = 5;
const WALLET_CREATE_WINDOW: Duration = Duration::from_secs(12 * 3600);

/// Failed recoveries one address may make per window.
const RECOVER_FAILURE_LIMIT: i64 = 10;
const RECOVER_FAILURE_WINDOW: Duration = Duration::from_secs(3600);

/// Wrong link passwords one address may submit per window.
const VIEW_PASSWORD_FAILURE_LIMIT: i64 = 20;
const VIEW_PASSWORD_FAILURE_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Extracts the real IP address from the request extensions.
///
/// # Arguments
///
/// * `req` - The incoming request.
///
/// # Returns
///
/// The IP address as a string, or "unknown" if not found.
fn extract_real_ip(req: &Request<Body>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Current count under `key`. Store errors read as zero.
async fn current_count(state: &AppState, key: &str) -> i64 {
    match state.ephemeral.get(key).await {
        Ok(Some(raw)) => std::str::from_utf8(&raw)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        Ok(None) => 0,
        Err(e) => {
            tracing::warn!("Rate limit read failed for {}: {}", key, e);
            0
        }
    }
}

async fn record(state: &AppState, key: &str, window: Duration) {
    if let Err(e) = state.ephemeral.incr_ex(key, window).await {
        tracing::warn!("Rate limit write failed for {}: {}", key, e);
    }
}

async fn rejection(state: &AppState, key: &str, what: &str) -> Response {
    let minutes = match state.ephemeral.ttl(key).await {
        Ok(Some(ttl)) => ttl.as_secs().div_ceil(60),
        _ => 0,
    };
    AppError::RateLimitExceeded(format!(
        "{} limit exceeded. Try again in {} minutes",
        what, minutes
    ))
    .into_response()
}

/// A middleware that rate limits wallet creation per address.
pub async fn rate_limit_wallet_create(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = extract_real_ip(&req);
    let key = format!("rate_limit:wallet_create:{}", ip);

    if current_count(&state, &key).await >= WALLET_CREATE_LIMIT {
        return rejection(&state, &key, "Wallet creation").await;
    }

    let response = next.run(req).await;
    if response.status().is_success() {
        record(&state, &key, WALLET_CREATE_WINDOW).await;
    }
    response
}

/// A middleware that rate limits failed wallet recoveries per address.
pub async fn rate_limit_recover(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = extract_real_ip(&req);
    let key = format!("rate_limit:recover:{}", ip);

    if current_count(&state, &key).await >= RECOVER_FAILURE_LIMIT {
        return rejection(&state, &key, "Recovery").await;
    }

    let response = next.run(req).await;
    if response.status().is_client_error() {
        record(&state, &key, RECOVER_FAILURE_WINDOW).await;
    } else if response.status().is_success() {
        if let Err(e) = state.ephemeral.del(&key).await {
            tracing::warn!("Rate limit reset failed for {}: {}", key, e);
        }
    }
    response
}

/// A middleware that throttles callers guessing link passwords.
///
/// Only the caller is throttled; the link itself is never locked.
pub async fn throttle_view_passwords(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = extract_real_ip(&req);
    let key = format!("rate_limit:view_password:{}", ip);

    if current_count(&state, &key).await >= VIEW_PASSWORD_FAILURE_LIMIT {
        return rejection(&state, &key, "Password attempt").await;
    }

    let response = next.run(req).await;
    if response.status() == StatusCode::UNAUTHORIZED {
        record(&state, &key, VIEW_PASSWORD_FAILURE_WINDOW).await;
    }
    response
}
