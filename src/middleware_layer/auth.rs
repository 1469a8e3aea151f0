use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "session_id";

/// Extracts the session token from the request cookies.
///
/// # Arguments
///
/// * `cookies` - The request cookies.
///
/// # Returns
///
/// An `Option` containing the session ID if found.
pub fn extract_session_token(cookies: &Cookies) -> Option<Uuid> {
    cookies
        .get(SESSION_COOKIE)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}

/// A middleware that requires a valid wallet session.
///
/// On success the `Session` is inserted into the request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(session_id) = extract_session_token(&cookies) else {
        tracing::debug!("❌ No session_id cookie found");
        return AppError::Unauthorized.into_response();
    };

    let session = match state.sessions.get(session_id).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            tracing::debug!("❌ Session {} not found or expired", session_id);
            return AppError::Unauthorized.into_response();
        }
        Err(e) => return e.into_response(),
    };

    tracing::debug!("✅ Wallet authenticated: {}", session.wallet_id);
    request.extensions_mut().insert(session);

    next.run(request).await
}
