// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use axum::{
    Router,
    routing::{get, post},
};
use std::{net::SocketAddr, path::Path, sync::Arc};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use crate::application::extraction_service::ExtractionService;
use crate::application::region::LatitudeBandClassifier;
use crate::infrastructure::config::{load_app_config, load_app_config_from};
use crate::infrastructure::grid_archive::JsonArchiveProvider;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{extract_timeseries, health_check};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration, from an explicit file when one is given
    let config = match std::env::args().nth(1) {
        Some(path) => load_app_config_from(Path::new(&path))?,
        None => load_app_config()?,
    };
    let config = Arc::new(config);
    for region in &config.regions {
        tracing::info!(
            "Region {} ({}) covers latitude {}..{} from {}",
            region.name,
            region.crs,
            region.lat_min,
            region.lat_max,
            region.path.display()
        );
    }

    // Archives are opened lazily on first request (infrastructure layer)
    let provider = Arc::new(JsonArchiveProvider::new());
    let classifier = Arc::new(LatitudeBandClassifier::from_regions(&config.regions));

    // Create services (application layer)
    let extraction_service = ExtractionService::new(config.clone(), provider, classifier);

    // Create application state
    let state = Arc::new(AppState {
        extraction_service,
        defaults: config.defaults.clone(),
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/health", get(health_check))
        .route("/api/timeseries/json", post(extract_timeseries))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config.server.bind.parse()?;
    tracing::info!("Starting glacier-velocity service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
