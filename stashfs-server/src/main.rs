mod auth;
mod config;
mod handlers;
mod routes;
mod state;

use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::ServerConfig;
use stashfs_vfs::TreeManager;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    info!("stashfs-server starting");

    let config_path = ServerConfig::resolve_path();
    let config = ServerConfig::load(&config_path)?;
    info!(config = %config_path.display(), "Configuration loaded");

    let store = stashfs_store::from_config(&config.store)?;
    info!("Object store ready");

    let tree = TreeManager::new(store, config.tree_options());
    let state = Arc::new(AppState::new(tree, config.max_upload_bytes));

    // Build router
    let app = routes::build_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening on http://{}", config.listen_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
