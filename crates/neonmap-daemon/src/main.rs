//! neonmap-daemon: the NeonMap canvas server.
//!
//! Single OS process running a Tokio async runtime. Clients read chunks and
//! place pixels over HTTP and follow the canvas over a WebSocket.

use std::sync::Arc;

use neonmap_canvas::{SqliteStore, SystemClock};
use neonmap_daemon::config::DaemonConfig;
use neonmap_daemon::{build_verifier, create_app, AppState};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("neonmap={}", config.advanced.log_level).parse()?),
        )
        .init();

    info!("NeonMap canvas server starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 2. Open database
    let db_path = data_dir.join("neonmap.db");
    let store = Arc::new(SqliteStore::open(&db_path)?);
    info!("Database opened at {:?}", db_path);

    // 3. Payment verifier
    let verifier = build_verifier(&config.payment)?;

    // 4. Build server state and provision the chunk grid
    let listen_addr = config.server.listen_addr.clone();
    let state = AppState::new(config, store, verifier, Arc::new(SystemClock))?;
    let created = state.engine.provision().await?;
    let geometry = state.engine.settings().geometry;
    info!(
        width = geometry.width,
        height = geometry.height,
        chunk_size = geometry.chunk_size,
        created,
        "Canvas ready"
    );

    // 5. Serve until Ctrl-C
    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Starting HTTP server on {}", listen_addr);
    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, shutting down");
            }
        })
        .await?;

    info!("Server stopped");
    Ok(())
}
