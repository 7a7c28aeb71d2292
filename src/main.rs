use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use csv_insights::{config, logging, routes, AppState};

/// Headroom for the multipart envelope around the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::load_config()?;

    // Initialize logging
    logging::init_logging(&config.log_level)?;

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    let addr = config.bind_address();
    let body_limit = config.max_file_size + MULTIPART_OVERHEAD;

    // Build our application state
    let state = Arc::new(AppState::new(config)?);

    let app = routes::router(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
