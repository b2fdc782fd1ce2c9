use std::time::Instant;

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::{http::classify, transport::streamable::MCP_SESSION_ID};

/// Logs go to stderr; stdout carries protocol traffic in stdio mode.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// One summary line per request, tagged with the transport it was routed to.
///
/// For SSE streams `duration_ms` covers the time until the stream was opened, not its
/// whole lifetime.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let route = classify(&path);
    let started_at = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let session_id = response
        .headers()
        .get(&MCP_SESSION_ID)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-");

    info!(
        method = %method,
        path = %path,
        route = ?route,
        session_id,
        status = status.as_u16(),
        duration_ms = started_at.elapsed().as_millis(),
        "request summary"
    );

    if status == StatusCode::UNAUTHORIZED {
        warn!(method = %method, path = %path, "authentication failure");
    }

    response
}
