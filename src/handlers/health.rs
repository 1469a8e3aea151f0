use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::{services::bounded::with_timeout, state::AppState};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: bool,
    ephemeral: bool,
}

/// Reports whether both backing stores answer.
pub async fn health(State(state): State<AppState>) -> Response {
    let limit = state.config.io_timeout;
    let (database, ephemeral) = tokio::join!(
        with_timeout("database ping", limit, state.repo.ping()),
        with_timeout("ephemeral ping", limit, state.ephemeral.ping()),
    );

    if let Err(e) = &database {
        tracing::warn!("Health check: database unavailable: {}", e);
    }
    if let Err(e) = &ephemeral {
        tracing::warn!("Health check: ephemeral store unavailable: {}", e);
    }

    let body = HealthResponse {
        status: if database.is_ok() && ephemeral.is_ok() { "ok" } else { "degraded" },
        database: database.is_ok(),
        ephemeral: ephemeral.is_ok(),
    };
    let status = if body.status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(body)).into_response()
}
