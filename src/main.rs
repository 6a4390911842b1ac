mod api;
mod config;
mod error;
mod ledger;
mod poller;
mod pricing;
mod provider;
mod registry;
mod settlement;
mod store;
mod types;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::error::Result;
use crate::ledger::WagerLedger;
use crate::poller::MatchPoller;
use crate::provider::{ContestProvider, RiotProvider};
use crate::registry::MatchRegistry;
use crate::settlement::SettlementEngine;
use crate::store::MarketLocks;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = store::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Core components, sharing one per-market lock registry ---
    let locks = MarketLocks::new();
    let provider: Arc<dyn ContestProvider> = Arc::new(RiotProvider::new(&cfg)?);

    let registry = Arc::new(MatchRegistry::new(pool.clone(), Arc::clone(&locks)));
    let ledger = Arc::new(WagerLedger::new(pool.clone(), Arc::clone(&locks)));
    let settlement = Arc::new(SettlementEngine::new(
        pool.clone(),
        Arc::clone(&locks),
        Arc::clone(&provider),
    ));

    // --- Discovery poller (background, non-overlapping cycles) ---
    let poller = MatchPoller::new(
        cfg.clone(),
        Arc::clone(&registry),
        settlement,
        Arc::clone(&provider),
    );
    tokio::spawn(async move { poller.run().await });
    info!(
        "Discovery poller started (period {}s, finish grace {}s)",
        cfg.poll_interval_secs, cfg.finish_grace_secs,
    );

    if cfg.admin_token.is_empty() {
        info!("ADMIN_TOKEN not set: the market close endpoint is disabled");
    }

    // --- HTTP API server ---
    let api_state = ApiState {
        pool: pool.clone(),
        registry,
        ledger,
        provider,
        admin_token: cfg.admin_token.clone(),
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
