use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{middleware, Router};
use tokio_util::sync::CancellationToken;

pub mod auth;
pub mod backend;
pub mod config;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod session;
pub mod transport;

use backend::BackendFactory;
use config::Config;
use session::Sessions;

/// Everything a request handler needs, scoped to one listener.
#[derive(Clone)]
pub struct AppState {
    pub api_token: Option<Arc<str>>,
    pub sessions: Arc<Sessions>,
    pub backend: Arc<dyn BackendFactory>,
    pub sse_keep_alive: Duration,
    pub started_at: Instant,
    /// Parent of every session's close signal.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: &Config,
        backend: Arc<dyn BackendFactory>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            api_token: config.api_token.as_deref().map(Arc::<str>::from),
            sessions: Arc::new(Sessions::default()),
            backend,
            sse_keep_alive: config.sse_keep_alive,
            started_at: Instant::now(),
            shutdown,
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .fallback(http::dispatch)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer_token,
        ))
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
