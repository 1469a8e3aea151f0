use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tower_cookies::cookie::time::Duration;
use tower_cookies::{Cookie, Cookies};
use uuid::Uuid;
use zeroize::Zeroize;

use crate::{
    error::Result,
    middleware_layer::{auth::SESSION_COOKIE, csrf::CSRF_COOKIE},
    models::{session::Session, wallet::WalletInfo},
    state::AppState,
    validation::links::validate_phrase_input,
};

/// The request payload for wallet recovery.
#[derive(Deserialize)]
pub struct RecoverRequest {
    pub recovery_phrase: String,
}

/// Returned once at creation; the phrase is never shown again.
#[derive(Serialize)]
pub struct CreateWalletResponse {
    pub wallet_id: Uuid,
    pub recovery_phrase: String,
    pub balance: i64,
}

#[derive(Serialize)]
pub struct RecoverResponse {
    pub wallet_id: Uuid,
    pub balance: i64,
}

#[derive(Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

/// Creates a cookie with the given name, value and max age.
fn create_secure_cookie(
    name: &'static str,
    value: String,
    max_age_days: i64,
    is_production: bool,
) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);

    if name != CSRF_COOKIE {
        cookie.set_http_only(true);
    }

    if is_production {
        cookie.set_secure(true);
    }

    cookie.set_same_site(tower_cookies::cookie::SameSite::Lax);
    cookie.set_max_age(Duration::seconds(max_age_days.max(1) * 86400));
    cookie.set_path("/");

    cookie
}

/// Issues a session for `wallet_id` and sets both cookies.
async fn start_session(state: &AppState, cookies: &Cookies, wallet_id: Uuid) -> Result<()> {
    let issued = state.sessions.issue(wallet_id).await?;
    let days = state.config.session_duration_days;
    let production = state.config.is_production;

    cookies.add(create_secure_cookie(
        SESSION_COOKIE,
        issued.session.id.to_string(),
        days,
        production,
    ));
    cookies.add(create_secure_cookie(
        CSRF_COOKIE,
        issued.csrf_token,
        days,
        production,
    ));
    Ok(())
}

/// Creates a wallet and signs it in.
#[axum::debug_handler]
pub async fn create_wallet(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Response> {
    let created = state.wallets.create().await?;
    start_session(&state, &cookies, created.wallet_id).await?;

    let response = CreateWalletResponse {
        wallet_id: created.wallet_id,
        recovery_phrase: created.recovery_phrase.to_string(),
        balance: created.balance,
    };

    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Signs in with a recovery phrase.
#[axum::debug_handler]
pub async fn recover_wallet(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(mut payload): Json<RecoverRequest>,
) -> Result<Response> {
    validate_phrase_input(&payload.recovery_phrase)?;

    let recovered = state.wallets.recover(&payload.recovery_phrase).await;
    payload.recovery_phrase.zeroize();
    let wallet = recovered?;

    start_session(&state, &cookies, wallet.id).await?;
    let balance = state.ledger.balance(wallet.id).await?;

    Ok(Json(RecoverResponse {
        wallet_id: wallet.id,
        balance,
    })
    .into_response())
}

/// Balance and recent transactions of the signed-in wallet.
#[axum::debug_handler]
pub async fn wallet_info(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<WalletInfo>> {
    Ok(Json(state.wallets.info(session.wallet_id).await?))
}

/// Ends the current session.
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    cookies: Cookies,
    Extension(session): Extension<Session>,
) -> Result<Json<LogoutResponse>> {
    let csrf_token = cookies.get(CSRF_COOKIE).map(|c| c.value().to_string());
    state
        .sessions
        .revoke(session.id, csrf_token.as_deref())
        .await?;

    cookies.remove(Cookie::build(SESSION_COOKIE).path("/").build());
    cookies.remove(Cookie::build(CSRF_COOKIE).path("/").build());

    tracing::info!("👋 Wallet {} signed out", session.wallet_id);
    Ok(Json(LogoutResponse { success: true }))
}
