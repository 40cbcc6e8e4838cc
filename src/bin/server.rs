//! deckhand HTTP server binary.
//!
//! Loads the backend catalog and capability definitions, wires the dispatch
//! core and serves it over axum.
//!
//! # Environment Variables
//!
//! - `PORT` - HTTP port (default: 8080)
//! - `DECKHAND_CATALOG` - Backend catalog file or directory (default: `catalog`)
//! - `DECKHAND_CAPABILITIES` - Extra capability YAML file or directory
//! - `DECKHAND_DEFAULT_TIMEOUT_MS` - Backend timeout when not declared (default: 30000)
//! - `DECKHAND_MAX_RETRIES` - Transport retries on timeout, 429 and 5xx (default: 0)
//! - `DECKHAND_BACKEND_<NAME>_URL` - Per-backend base URL override
//! - `RUST_LOG` - Tracing filter (default: "info,deckhand=debug")
//!
//! # Usage
//!
//! ```bash
//! DECKHAND_CATALOG=catalog cargo run --bin server
//! ```

use std::sync::Arc;

use deckhand::capabilities::CapabilityCatalog;
use deckhand::catalog::BackendCatalog;
use deckhand::config::Settings;
use deckhand::interfaces::{HttpTransport, ReqwestTransport, RetryingTransport};
use deckhand::server::{app_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,deckhand=debug".into()),
        )
        .init();

    let settings = Settings::from_env()?;

    let mut backends = BackendCatalog::new();
    let loaded = backends.load_path(&settings.catalog_path)?;
    backends.apply_default_timeout(settings.default_timeout_ms);
    let overrides = settings.backend_url_overrides(backends.backends().map(|b| b.name.as_str()));
    backends.apply_url_overrides(&overrides);
    tracing::info!(
        "Loaded {} backends from {}",
        loaded,
        settings.catalog_path.display()
    );

    let mut capabilities = CapabilityCatalog::new();
    if let Some(path) = &settings.capabilities_path {
        let loaded = if path.is_dir() {
            capabilities.load_directory(path)
        } else {
            capabilities.register_from_file(path)
        };
        let count = loaded
            .map_err(|e| anyhow::anyhow!("loading capabilities from {}: {}", path.display(), e))?;
        tracing::info!("Loaded {} capability definitions from {}", count, path.display());
    }

    let reqwest = ReqwestTransport::new()?;
    let transport: Arc<dyn HttpTransport> = if settings.max_retries > 0 {
        Arc::new(RetryingTransport::new(reqwest, settings.max_retries))
    } else {
        Arc::new(reqwest)
    };

    let state = AppState::from_catalogs(&backends, capabilities, transport)?;
    let app = app_router(state);

    let bind_addr = settings.bind_addr();
    tracing::info!("deckhand server starting on {}", bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health               - liveness probe");
    tracing::info!("  GET  /capabilities         - capability listing");
    tracing::info!("  POST /capabilities/execute - single invocation");
    tracing::info!("  POST /capabilities/batch   - batch invocation");
    tracing::info!("  POST /classify             - slide classification");
    tracing::info!("  POST /generate             - direct variant dispatch");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
