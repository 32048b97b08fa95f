//! osmate - chat assistant for OpenStreetMap contributors
//!
//! A Rust backend running one conversation state machine per chat user:
//! browse Osmose quality issues, edit element tags or node locations, and
//! upload GPS traces.

mod api;
mod client;
mod config;
mod db;
mod geo;
mod pager;
mod runtime;
mod session;

use api::{create_router, AppState};
use client::{LoggingGeoDataService, LoggingIssueService, OsmApiClient, OsmoseClient};
use config::Config;
use db::Database;
use runtime::{DatabaseAccounts, Services, SessionStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "osmate=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path, "Opening database");
    let db = Database::open(&config.db_path)?;

    let osmose = OsmoseClient::new(
        &config.osmose_url,
        &config.osmose_lang,
        config.result_limit,
        config.http_timeout,
    )?;
    let osm_api = OsmApiClient::new(&config.osm_api_url, config.http_timeout)?;
    tracing::info!(
        osmose = %config.osmose_url,
        osm_api = %config.osm_api_url,
        page_size = config.page_size.get(),
        "Remote services configured"
    );

    let services = Services {
        issues: Arc::new(LoggingIssueService::new(Arc::new(osmose))),
        geodata: Arc::new(LoggingGeoDataService::new(Arc::new(osm_api))),
        accounts: Arc::new(DatabaseAccounts::new(db.clone())),
    };
    let sessions = SessionStore::new(services, config.session_settings());
    let state = AppState::new(sessions, db);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("osmate listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
