//! HTTP entry point for the Model Context Protocol
//!
//! Every request on the listener goes through [`dispatch`], which picks the health
//! endpoint, the legacy SSE transport or the streamable transport from the path alone.

pub mod banner;
pub mod handlers;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
};

use crate::{
    transport::{sse, streamable},
    AppState,
};

pub const HEALTH_PATH: &str = "/health";
pub const SSE_PATH_PREFIX: &str = "/sse";
pub const DEFAULT_MCP_PATH: &str = "/mcp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Health,
    Sse,
    Streamable,
}

/// Everything that is neither the health endpoint nor under `/sse` is streamable.
pub fn classify(path: &str) -> Route {
    if path == HEALTH_PATH {
        Route::Health
    } else if path.starts_with(SSE_PATH_PREFIX) {
        Route::Sse
    } else {
        Route::Streamable
    }
}

pub async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let result = match classify(request.uri().path()) {
        Route::Health => handlers::health(&state, request.method()).await,
        Route::Sse => sse::handle(&state, request).await,
        Route::Streamable => streamable::handle(&state, request).await,
    };

    match result {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}
