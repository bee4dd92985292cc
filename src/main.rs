//! TxGuard Server
//!
//! Transaction risk service: classifies a payment, optionally writes it to
//! an on-chain ledger, and keeps an immutable per-user history.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TXGUARD                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌───────────┐  ┌─────────────────────────┐ │
//! │  │  API      │  │  Auth     │  │  Risk Classifier        │ │
//! │  │  (Axum)   │  │  (JWT)    │  │  scorer -> fallback     │ │
//! │  └─────┬─────┘  └─────┬─────┘  └────────────┬────────────┘ │
//! │        └──────────────┼──────────────────────┘              │
//! │              ┌────────┴────────┐                            │
//! │              ▼                 ▼                            │
//! │     ┌─────────────────┐  ┌─────────────┐                   │
//! │     │ Store (Postgres │  │ Ledger      │                   │
//! │     │   or memory)    │  │ (JSON-RPC)  │                   │
//! │     └─────────────────┘  └─────────────┘                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod db;
mod models;
mod handlers;
mod middleware;
mod error;
mod risk;
mod store;
mod ledger;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
    middleware as axum_middleware,
};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{Config, LogFormat, ScorerMode, StoreBackend};
use ledger::{EthersContract, LedgerContract, LedgerRecorder, LedgerSigner};
use risk::scorer::{HttpScorer, RiskScorer, SubprocessScorer};
use risk::RiskClassifier;
use store::{MemoryStore, PgStore, Store};

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Invalid configuration")?;

    init_tracing(config.log_format);

    tracing::info!("TxGuard server starting ({})...", config.environment);
    if !config.is_production() && std::env::var("JWT_SECRET").is_err() {
        tracing::warn!("JWT_SECRET not set; using the development secret");
    }

    let state = build_state(config.clone()).await?;
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "txguard=debug,tower_http=debug".into());

    let (pretty, json) = match format {
        LogFormat::Pretty => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .init();
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub classifier: Arc<RiskClassifier>,
    pub ledger: Arc<LedgerRecorder>,
    pub signer: Option<Arc<LedgerSigner>>,
    pub config: Config,
}

/// Wire store, scorer and ledger from configuration
async fn build_state(config: Config) -> anyhow::Result<AppState> {
    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Postgres => {
            tracing::info!("Database: {}", config.database_url.split('@').last().unwrap_or("***"));
            let pool = db::create_pool(&config.database_url)
                .await
                .context("Failed to create database pool")?;

            tracing::info!("Running database migrations...");
            db::run_migrations(&pool).await.context("Failed to run migrations")?;
            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; records are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let scorer: Option<Arc<dyn RiskScorer>> = match config.scorer_mode {
        ScorerMode::Http => Some(Arc::new(HttpScorer::new(&config.scorer_url, config.scorer_timeout)?)),
        ScorerMode::Subprocess => Some(Arc::new(SubprocessScorer::from_command_line(&config.scorer_command)?)),
        ScorerMode::None => None,
    };
    let classifier = RiskClassifier::new(scorer, config.scorer_timeout, store.clone());
    tracing::info!("Risk scorer: {}", classifier.scorer_name());

    let contract: Option<Arc<dyn LedgerContract>> =
        match (&config.ledger_rpc_url, &config.ledger_contract_address) {
            (Some(rpc_url), Some(address)) => {
                let contract = EthersContract::connect(rpc_url, address, config.ledger_chain_id)?;
                tracing::info!("Ledger contract {} via {}", address, rpc_url);
                Some(Arc::new(contract))
            }
            _ => {
                tracing::info!("Ledger disabled (LEDGER_RPC_URL / LEDGER_CONTRACT_ADDRESS unset)");
                None
            }
        };
    let ledger = LedgerRecorder::new(contract, config.ledger_timeout);

    let signer = config
        .ledger_signing_key
        .as_deref()
        .map(LedgerSigner::from_hex)
        .transpose()?
        .map(Arc::new);
    if let Some(signer) = &signer {
        tracing::info!("Ledger writes signed by {:?}", signer);
    }

    Ok(AppState {
        store,
        classifier: Arc::new(classifier),
        ledger: Arc::new(ledger),
        signer,
        config,
    })
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health::check))
        .route("/api/v1/auth/login", post(handlers::auth::login))
        .route("/api/v1/auth/register", post(handlers::auth::register))
        .route("/api/v1/predict", post(handlers::transactions::predict))
        .route("/api/v1/ledger/history/:address", get(handlers::ledger::history));

    // User routes (JWT auth)
    let user_routes = Router::new()
        .route("/api/v1/transactions", post(handlers::transactions::submit))
        .route("/api/v1/transactions/history", get(handlers::transactions::history))
        .route("/api/v1/transactions/all", get(handlers::transactions::all))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_user_auth
        ));

    Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
