use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use http::{header, HeaderName, HeaderValue, Method};
use tower_cookies::CookieManagerLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{
    handlers,
    middleware_layer::{self, csrf::CSRF_HEADER},
    state::AppState,
};

/// JSON and base64 overhead allowed on top of the largest payload.
const BODY_OVERHEAD: usize = 64 * 1024;

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS origin {}", o))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let csrf_header = HeaderName::from_static(CSRF_HEADER);

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::COOKIE,
            csrf_header.clone(),
            HeaderName::from_static(handlers::links::DEVICE_HEADER),
        ])
        .allow_credentials(true)
        .expose_headers([csrf_header])
        .max_age(Duration::from_secs(86400)))
}

/// Builds the application router.
///
/// Callers must serve it with `ConnectInfo<SocketAddr>`; rate limiting keys
/// on the peer address.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(100)
            .burst_size(100)
            .use_headers()
            .finish()
            .context("invalid governor configuration")?,
    );

    let wallet_create_routes = Router::new()
        .route("/api/wallet/create", post(handlers::wallet::create_wallet))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_wallet_create,
        ))
        .with_state(state.clone());

    let recover_routes = Router::new()
        .route("/api/wallet/recover", post(handlers::wallet::recover_wallet))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_recover,
        ))
        .with_state(state.clone());

    let view_routes = Router::new()
        .route("/api/links/{id}/view", post(handlers::links::view_link))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::throttle_view_passwords,
        ))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/wallet", get(handlers::wallet::wallet_info))
        .route("/api/wallet/logout", post(handlers::wallet::logout))
        .route("/api/credits/balance", get(handlers::credits::balance))
        .route(
            "/api/credits/transactions",
            get(handlers::credits::transactions),
        )
        .route("/api/credits/add", post(handlers::credits::add_credits))
        .route(
            "/api/links",
            post(handlers::links::create_link).get(handlers::links::list_links),
        )
        .route("/api/links/{id}", delete(handlers::links::delete_link))
        .layer(tower_governor::GovernorLayer::new(governor_conf))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::csrf::verify_csrf,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state.clone());

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .with_state(state.clone());

    let body_limit = state.config.links.max_content_bytes / 3 * 4 + BODY_OVERHEAD;

    Ok(Router::new()
        .merge(wallet_create_routes)
        .merge(recover_routes)
        .merge(view_routes)
        .merge(protected_routes)
        .merge(public_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer(&state.config.cors_origins)?))
}
