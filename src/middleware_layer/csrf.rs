use axum::{
    body::Body,
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::Cookies;

use crate::{crypto::csrf::tokens_match, error::AppError, models::session::Session, state::AppState};

/// Name of the CSRF cookie (readable by scripts, unlike the session cookie).
pub const CSRF_COOKIE: &str = "csrf_token";
/// Header that must echo the cookie.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// A middleware that verifies the double-submitted CSRF token.
///
/// Runs after `require_auth`; the token must belong to the caller's session.
pub async fn verify_csrf(
    State(state): State<AppState>,
    cookies: Cookies,
    req: Request<Body>,
    next: Next,
) -> Response {
    if req.method() == Method::GET
        || req.method() == Method::HEAD
        || req.method() == Method::OPTIONS
    {
        return next.run(req).await;
    }

    let Some(csrf_token_cookie) = cookies.get(CSRF_COOKIE).map(|c| c.value().to_string()) else {
        tracing::warn!("❌ CSRF: cookie missing");
        return AppError::Authentication("Missing CSRF token cookie".to_string()).into_response();
    };

    let csrf_token_header = match req.headers().get(CSRF_HEADER).map(|v| v.to_str()) {
        Some(Ok(t)) => t.to_string(),
        Some(Err(_)) => {
            return AppError::Authentication("Invalid CSRF token format".to_string())
                .into_response();
        }
        None => {
            tracing::warn!("❌ CSRF: header missing");
            return AppError::Authentication("Missing CSRF token header".to_string())
                .into_response();
        }
    };

    if !tokens_match(&csrf_token_cookie, &csrf_token_header) {
        tracing::warn!("❌ CSRF: tokens do not match");
        return AppError::Authentication("CSRF token mismatch".to_string()).into_response();
    }

    let Some(session) = req.extensions().get::<Session>().cloned() else {
        return AppError::Unauthorized.into_response();
    };

    match state.sessions.csrf_valid(&csrf_token_cookie, session.id).await {
        Ok(true) => next.run(req).await,
        Ok(false) => {
            tracing::warn!("❌ CSRF: token expired or bound to another session");
            AppError::Authentication("CSRF token expired or invalid".to_string()).into_response()
        }
        Err(e) => e.into_response(),
    }
}
