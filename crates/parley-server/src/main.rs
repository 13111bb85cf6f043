use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use parley_server::{api, AppState, ServerConfig};
use parley_shared::constants::APP_NAME;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_server=debug")),
        )
        .init();

    info!("Starting {} relay v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    let http_addr = config.http_addr;

    // -----------------------------------------------------------------------
    // 3. Shared state: one store and one registry for the whole process
    // -----------------------------------------------------------------------
    let state = AppState::new(config);

    // Evict rate limit buckets idle >10 min, every 5 minutes
    let _purge = state
        .rate_limiter
        .spawn_purge_task(Duration::from_secs(300), Duration::from_secs(600));

    // -----------------------------------------------------------------------
    // 4. Serve until the listener fails or Ctrl+C arrives
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
