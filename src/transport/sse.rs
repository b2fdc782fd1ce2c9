//! Legacy HTTP+SSE transport
//!
//! A GET opens a long-lived event stream that is the session: its first event names the
//! URL to POST client messages to, and engine output follows as `message` events. The
//! session ends when the stream is dropped.

use axum::{
    body::Body,
    extract::Query,
    http::{Method, Request, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::{future, stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{connect_failed, message_event, read_body};
use crate::{
    errors::AppError,
    session::{random_session_id, Session, StreamRelease, TransportKind},
    AppState,
};

const ALLOWED_METHODS: &str = "GET, POST";

#[derive(Debug, Deserialize)]
pub struct PostMessageQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

pub async fn handle(state: &AppState, request: Request<Body>) -> Result<Response, AppError> {
    match *request.method() {
        Method::GET => establish(state, request.uri().path()).await,
        Method::POST => post_message(state, request).await,
        _ => Err(AppError::method_not_allowed(Some(ALLOWED_METHODS))),
    }
}

/// Opens a new session and returns its event stream.
pub async fn establish(state: &AppState, path: &str) -> Result<Response, AppError> {
    let session_id = random_session_id();
    let (session, transport) =
        Session::open(session_id.clone(), TransportKind::Sse, &state.shutdown);
    let outbound = session
        .take_stream(StreamRelease::CloseSession)
        .ok_or_else(|| AppError::internal("new sse session has no outbound stream"))?;

    if state.sessions.sse.register(session.clone()).await.is_err() {
        return Err(AppError::internal(format!(
            "sse session id {session_id} already registered"
        )));
    }

    if let Err(err) = state.backend.connect(transport, false).await {
        state.sessions.sse.remove(&session).await;
        session.close();
        return Err(connect_failed(err));
    }

    info!(session_id = %session_id, "sse session established");

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("{path}?sessionId={session_id}"));
    let events = stream::once(future::ready(Ok(endpoint))).chain(outbound.map(message_event));

    Ok(Sse::new(events)
        .keep_alive(KeepAlive::new().interval(state.sse_keep_alive))
        .into_response())
}

async fn post_message(state: &AppState, request: Request<Body>) -> Result<Response, AppError> {
    let session_id = Query::<PostMessageQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(query)| query.session_id)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::bad_request("missing_session_id", "Missing sessionId"))?;

    let Some(session) = state.sessions.sse.get(&session_id).await else {
        warn!(session_id = %session_id, "message for unknown sse session");
        return Err(AppError::not_found("session_not_found", "Session not found"));
    };

    let body = read_body(request).await?;
    handle_post_message(&session, &body).await
}

/// Message entry point of an established session.
pub async fn handle_post_message(session: &Session, body: &[u8]) -> Result<Response, AppError> {
    let Ok(payload) = serde_json::from_slice::<Value>(body) else {
        debug!(session_id = %session.id(), "unparsable sse message");
        return Ok((StatusCode::BAD_REQUEST, "Invalid message").into_response());
    };

    session.deliver(payload).await?;
    Ok((StatusCode::ACCEPTED, "Accepted").into_response())
}
