use std::sync::Arc;

use anyhow::{Context, Result};
use api::audit::ProcessingLog;
use api::catalog::JsonCatalog;
use api::config::AppConfig;
use api::metrics::Metrics;
use api::{AppState, router};
use extract::AnthropicClient;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::load().context("Failed to load configuration")?;
    info!(?config, "Configuration loaded");
    if config.model.api_key.is_none() {
        warn!("ANTHROPIC_API_KEY is not set; model calls will fail until it is configured");
    }

    // One client for the whole process
    let model = AnthropicClient::new(config.model.clone())?;

    let catalog = match &config.catalog.path {
        Some(path) => JsonCatalog::from_file(path)?,
        None => {
            warn!("CATALOG_PATH is not set; every matching request will find no products");
            JsonCatalog::default()
        }
    };

    let bind_addr = config.server.bind_addr.clone();
    let state = Arc::new(AppState {
        model: Arc::new(model),
        catalog: Arc::new(catalog),
        log: Arc::new(ProcessingLog::new()),
        metrics: Metrics::new(),
        config: Arc::new(config),
    });

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;

    info!("Server listening on http://{bind_addr}");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

/// `RUST_LOG` picks the filter (default `info`); `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
