use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    models::{ledger::TransactionRecord, session::Session},
    state::AppState,
};

const DEFAULT_HISTORY: i64 = 50;

#[derive(Serialize)]
pub struct BalanceResponse {
    pub balance: i64,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub transactions: Vec<TransactionRecord>,
}

/// A confirmed credit-pack purchase.
#[derive(Deserialize)]
pub struct AddCreditsRequest {
    pub pack: i64,
    pub method: String,
}

#[axum::debug_handler]
pub async fn balance(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<BalanceResponse>> {
    let balance = state.ledger.balance(session.wallet_id).await?;
    Ok(Json(BalanceResponse { balance }))
}

#[axum::debug_handler]
pub async fn transactions(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>> {
    let transactions = state
        .ledger
        .transactions(session.wallet_id, query.limit.unwrap_or(DEFAULT_HISTORY))
        .await?;
    Ok(Json(HistoryResponse { transactions }))
}

#[axum::debug_handler]
pub async fn add_credits(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(payload): Json<AddCreditsRequest>,
) -> Result<Json<BalanceResponse>> {
    let balance = state
        .ledger
        .add_credit_pack(session.wallet_id, payload.pack, &payload.method)
        .await?;
    Ok(Json(BalanceResponse { balance }))
}
