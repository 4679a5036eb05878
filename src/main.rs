use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use kennel_api::api;
use kennel_api::auth::TokenService;
use kennel_api::config;
use kennel_api::database::{postgres, DatabaseManager, Store};
use kennel_api::state::AppState;
use kennel_api::storage::DiskStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// Process-local maps, lost on exit
    Memory,
    /// PostgreSQL at DATABASE_URL
    Postgres,
}

#[derive(Parser)]
#[command(name = "kennel-api")]
#[command(about = "Kennel API - breeders, dogs and litters over HTTP")]
#[command(version)]
struct Cli {
    #[arg(long, value_enum, default_value = "postgres", help = "Persistence backend")]
    store: StoreKind,

    #[arg(long, help = "Listen port, overrides KENNEL_API_PORT / PORT")]
    port: Option<u16>,

    #[arg(long, help = "Create tables and indexes before serving")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("kennel_api=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = config::config();
    config.validate()?;
    tracing::info!("Starting Kennel API in {:?} mode", config.environment);

    let (store, pool) = match cli.store {
        StoreKind::Memory => {
            tracing::warn!("Using the in-memory store, nothing will be persisted");
            (Store::memory(), None)
        }
        StoreKind::Postgres => {
            let pool = DatabaseManager::connect(&config.database)
                .await
                .context("failed to connect to the database")?;
            if cli.migrate {
                postgres::ensure_schema(&pool).await?;
            }
            (Store::postgres(pool.clone()), Some(pool))
        }
    };

    let tokens = TokenService::from_config(&config.security)?;
    let storage = Arc::new(DiskStorage::new(&config.storage.uploads_dir));
    let state = AppState::new(store, storage, tokens);
    let app = api::router(state, config);

    let port = cli.port.unwrap_or(config.server.port);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Kennel API listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(pool) = pool {
        DatabaseManager::close(pool).await;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
