use std::sync::Arc;

use mcp_session_router::{
    backend::{BackendFactory, McpBackend},
    build_app,
    config::Config,
    http::banner::log_startup_banner,
    logging,
    transport::stdio::serve_stdio,
    AppState,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let backend: Arc<dyn BackendFactory> = Arc::new(McpBackend::new());
    let shutdown = CancellationToken::new();
    spawn_shutdown_listener(shutdown.clone());

    let Some(bind_socket) = config.bind_socket()? else {
        info!("BIND_PORT not set, serving over stdio");
        serve_stdio(backend.as_ref(), &shutdown).await?;
        return Ok(());
    };

    let state = AppState::new(&config, backend, shutdown.clone());
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;
    log_startup_banner(listener.local_addr()?);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("server stopped");
    Ok(())
}

fn spawn_shutdown_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for shutdown signal");
            return;
        }
        info!("shutdown requested");
        shutdown.cancel();
    });
}
