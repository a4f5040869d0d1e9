//! Coral Club Backend
//!
//! Serves the shared reservation document of the tent booking widget: a KV
//! proxy, merge-on-write document endpoints and a background expiry sweep.

mod api;
mod auth;
mod booking;
mod config;
mod db;
mod errors;
mod kv;
mod merge;
mod models;
mod store;
mod sync;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use clap::{Parser, Subcommand};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;
use kv::{KvStore, MemoryKv, RestKv};
use merge::MergePolicy;
use store::DocumentStore;
use sync::{Sweeper, SyncClient};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: DocumentStore,
    pub config: Arc<Config>,
}

#[derive(Debug, Parser)]
#[command(name = "coral-club-backend", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Follow a running server: poll for changes and expire stale holds
    Agent {
        /// Base URL of the server, e.g. http://127.0.0.1:8080
        #[arg(long)]
        server: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging before configuration so its warnings are kept
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::log_level()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Agent { server } => agent(config, &server).await,
    }
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Starting Coral Club Backend");
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::debug!("Log level: {}", config.log_level);

    let kv: Arc<dyn KvStore> = match &config.upstream {
        Some(upstream) => {
            tracing::info!("Proxying to upstream KV store at {}", upstream.url);
            Arc::new(RestKv::from_upstream(upstream)?)
        }
        None if config.in_memory() => {
            tracing::warn!("No persistent store configured, document lives in memory only");
            Arc::new(MemoryKv::new())
        }
        None => {
            tracing::info!("Database path: {:?}", config.db_path);
            let pool = db::init_database(&config.db_path).await?;
            Arc::new(Repository::new(pool))
        }
    };

    let mut store = DocumentStore::new(kv, config.keys.clone());
    if config.merge_arrays_by_id {
        store = store.with_policy(MergePolicy::upsert_arrays());
    }
    let outcome = store.boot(false, config.tent_count).await?;
    tracing::info!(
        "Document ready at revision {} (seeded: {})",
        outcome.rev,
        outcome.seeded
    );

    // Server-side sweep so holds expire even with no client connected
    let sweeper = Arc::new(Sweeper::new(store.clone()));
    let _sweep = sweeper.spawn(config.sweep_interval);

    let bind_addr = config.bind_addr;
    let state = AppState {
        store,
        config: Arc::new(config),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn agent(config: Config, server: &str) -> Result<(), Box<dyn std::error::Error>> {
    let base = format!("{}/api/kv", server.trim_end_matches('/'));
    tracing::info!("Following {}", base);

    let kv: Arc<dyn KvStore> = Arc::new(RestKv::new(&base, None, None)?);
    let client = Arc::new(SyncClient::new(DocumentStore::new(kv, config.keys.clone())));
    if !client.bootstrap().await {
        tracing::warn!("Initial load failed, waiting for the first poll");
    }

    let handles = client.spawn(config.poll_interval, config.sweep_interval);
    tokio::signal::ctrl_c().await?;
    handles.abort();

    tracing::info!("Agent stopped at revision {}", client.snapshot().await.rev);
    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PIN for the auth layer
    let pin = state.config.admin_pin.clone();

    // Admin routes
    let admin_routes = Router::new()
        .route("/kv/del/{*key}", post(api::kv_del))
        .route("/reservations/release", post(api::release_reservation))
        .route("/reservations/confirm", post(api::confirm_reservation))
        .route("/reservations/cancel", post(api::cancel_reservation))
        .route("/tents/update", post(api::update_tent))
        .route("/tents/sync", post(api::sync_tents))
        .route("/tents/regrid", post(api::regrid_tents))
        .layer(middleware::from_fn(move |req, next| {
            auth::admin_pin_layer(pin.clone(), req, next)
        }));

    // Customer-facing routes
    let public_routes = Router::new()
        // KV proxy
        .route("/kv/get/{*key}", get(api::kv_get))
        .route("/kv/set/{*key}", post(api::kv_set))
        .route("/kv/incr/{*key}", post(api::kv_incr))
        // Document
        .route("/boot", get(api::boot).post(api::boot))
        .route("/state", get(api::get_state))
        .route("/revision", get(api::get_revision))
        .route("/merge", post(api::merge_state))
        // Booking
        .route("/reservations/hold", post(api::hold_reservation))
        // Admin login
        .route("/admin/login", post(api::admin_login));

    // Health check
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", public_routes.merge(admin_routes))
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
