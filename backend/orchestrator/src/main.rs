//! OpenBudget Orchestrator — entry point.
//!
//! Coordinates a dual-write pipeline between the authoritative ledger
//! program and a relational cache: drafts live only in the cache, publish
//! and allocation write the ledger first and mirror into the cache, and
//! the release path self-heals from ledger history when the two disagree.
//! Exposes an Axum REST API for frontend / admin consumption.

mod allocate;
mod api;
mod config;
mod db;
mod errors;
mod ledger;
mod models;
mod publish;
mod reconcile;
mod release;
mod retry;
mod state;

#[cfg(test)]
mod testutil;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use openbudget_ledger::address::program_id;
use openbudget_ledger::tx::{sign_transaction, Instruction};
use openbudget_ledger::{Bank, LedgerError, Pubkey};

use config::Config;
use ledger::InProcessLedger;
use release::ReleaseLocks;
use retry::RetryPolicy;
use state::CoreState;

/// How far back the recovery paths scan an address's transaction history
/// when looking for a creation or release log marker.
pub const MAX_HISTORY_SCAN: usize = 50;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // ─── Ledger ───────────────────────────────────────────
    let pid = program_id(&config.program_name);
    let authority = Pubkey::from_seed(&config.authority_seed);

    let mut bank = Bank::new(pid);
    let bootstrap = sign_transaction(Instruction::InitializePlatform, authority, 0);
    match bank.execute(&bootstrap) {
        Ok(receipt) => info!("platform initialized ({})", receipt.signature),
        Err(LedgerError::AlreadyInitialized | LedgerError::AlreadyProcessed(_)) => {}
        Err(e) => return Err(anyhow::anyhow!("platform bootstrap failed: {e}")),
    }
    let ledger = Arc::new(InProcessLedger::new(bank));

    // ─── REST API ─────────────────────────────────────────
    let core = Arc::new(CoreState {
        pool,
        ledger,
        program_id: pid,
        authority,
        retry: RetryPolicy::default(),
        release_locks: ReleaseLocks::new(),
    });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/projects", post(api::create_project))
        .route("/projects/:id", get(api::get_project))
        .route("/projects/:id/publish", post(api::publish_project))
        .route("/projects/:id/milestones", post(api::add_milestone))
        .route("/milestones/:id/release", post(api::release_milestone))
        .route("/milestones/:id/verify", get(api::verify_milestone))
        .route("/milestones/:id/sync", post(api::sync_milestone))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(core);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
