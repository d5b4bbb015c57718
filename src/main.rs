use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inkscore::config::Config;
use inkscore::core::spawn_sweeper;
use inkscore::database::{InMemoryStore, PgStore, PriceHistoryStore};
use inkscore::handlers::{router, AppState};
use inkscore::util::{CoingeckoSource, DexScreenerClient, PriceOracle, RoutescanClient, TokenPricer};

fn init_tracing(log_dir: &str) -> Result<()> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "inkscore.log");
    let (non_blocking_file, _guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .compact();

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .json()
        .with_current_span(false)
        .with_span_list(true);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Keep the writer alive for the life of the process
    std::mem::forget(_guard);

    Ok(())
}

fn load_config() -> Result<Config> {
    let path = std::env::var("INKSCORE_CONFIG").unwrap_or_else(|_| "inkscore.toml".to_string());
    let mut config = if Path::new(&path).exists() {
        Config::load_from_file(&path)?
    } else {
        Config::from_toml("")?
    };
    config.apply_env_overrides();
    Ok(config)
}

fn build_pricer(config: &Config, history: Option<Arc<dyn PriceHistoryStore>>) -> Result<Arc<TokenPricer>> {
    let source = CoingeckoSource::from_config(&config.apis).context("price client")?;
    let mut oracle = PriceOracle::new(Arc::new(source), &config.prices);
    if let Some(history) = history {
        oracle = oracle.with_history(history);
    }
    let dex = DexScreenerClient::from_config(&config.apis, &config.cache).context("dex client")?;
    Ok(Arc::new(TokenPricer::new(Arc::new(oracle), Arc::new(dex), &config.tokens)))
}

async fn build_state(config: &Config) -> Result<AppState> {
    let explorer = Arc::new(RoutescanClient::from_config(&config.apis).context("explorer client")?);

    match &config.database.url {
        Some(url) => {
            let store = Arc::new(
                PgStore::connect(url, config.database.max_connections)
                    .await
                    .context("database connection")?,
            );
            store.ensure_schema().await.context("database schema")?;
            info!("🗄️ Connected to Postgres");
            let pricer = build_pricer(config, Some(store.clone()))?;
            Ok(AppState::assemble(config, store, explorer, pricer))
        }
        None => {
            warn!("⚠️ No database configured, serving from an empty in-memory store");
            let store = Arc::new(InMemoryStore::new());
            let pricer = build_pricer(config, Some(store.clone()))?;
            Ok(AppState::assemble(config, store, explorer, pricer))
        }
    }
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("🛑 Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    init_tracing(&config.server.log_dir)?;

    info!("🦑 INKSCORE - wallet scoring service");

    let state = build_state(&config).await?;
    let sweeper = spawn_sweeper(
        state.caches(),
        Duration::from_secs(config.cache.sweep_interval_secs),
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("bind {}", config.server.bind))?;
    info!("🌐 Listening on {}", config.server.bind);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("👋 INKSCORE shutdown complete");
    Ok(())
}
