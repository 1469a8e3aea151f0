use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use exitlink::{config::{Config, StorageBackend}, router::build_router, state::AppState};

/// Links deactivated per sweep round.
const SWEEP_BATCH: i64 = 500;

fn spawn_sweeper(state: AppState, shutdown: CancellationToken) {
    let interval = state.config.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tracing::debug!("🧹 Running expiry sweep...");
            loop {
                match state.links.sweep_expired(SWEEP_BATCH).await {
                    Ok(n) if n as i64 == SWEEP_BATCH => continue,
                    Ok(_) => break,
                    Err(e) => {
                        tracing::error!("❌ Expiry sweep failed: {}", e);
                        break;
                    }
                }
            }
        }
        tracing::info!("Expiry sweeper stopped");
    });
}

async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("🛑 Shutting down");
    token.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config).await?;
    let backend = match config.storage {
        StorageBackend::Postgres { .. } => "postgres",
        StorageBackend::Memory => "memory",
    };
    tracing::info!("✅ AppState initialized ({} backend)", backend);

    let app = build_router(state.clone())?;

    let shutdown = CancellationToken::new();
    spawn_sweeper(state, shutdown.clone());

    let addr = config.bind_addr;
    tracing::info!("🚀 Server listening on http://{}", addr);
    tracing::info!("✅ Expiry sweep runs every {:?}", config.sweep_interval);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await?;

    Ok(())
}
