//! Transport adapters binding client connections to per-session protocol engines
//!
//! `sse` and `streamable` are the two HTTP styles served side by side on one listener;
//! `stdio` replaces both when no port is configured.

pub mod sse;
pub mod stdio;
pub mod streamable;

use axum::{
    body::{to_bytes, Body, Bytes},
    http::Request,
    response::sse::Event,
};
use serde_json::Value;

use crate::errors::{AppError, TransportError};

const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

pub(crate) async fn read_body(request: Request<Body>) -> Result<Bytes, AppError> {
    to_bytes(request.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|_| AppError::bad_request("invalid_body", "Invalid request body"))
}

/// Engine output as an SSE `message` event.
pub(crate) fn message_event(message: Value) -> Result<Event, axum::Error> {
    Event::default().event("message").json_data(message)
}

/// A failed engine connect fails the establishing request, even for a closed transport.
pub(crate) fn connect_failed(err: TransportError) -> AppError {
    AppError::internal(err.to_string())
}
