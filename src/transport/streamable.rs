//! Streamable HTTP transport
//!
//! The session id travels in the `mcp-session-id` header. A POST without it must carry
//! the `initialize` request and gets a freshly generated id back. A request naming an id
//! we do not know yet resumes it: the session is created under that id on the spot, as
//! if the handshake had already happened, and the request is served right away.

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
    response::{
        sse::{KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info};

use super::{connect_failed, message_event, read_body};
use crate::{
    errors::AppError,
    mcp::rpc::{is_initialize_request, json_rpc_error, parse_error, SERVER_NOT_INITIALIZED},
    session::{Session, SessionId, SessionIdGenerator, StreamRelease, TransportKind},
    AppState,
};

pub const MCP_SESSION_ID: HeaderName = HeaderName::from_static("mcp-session-id");

const ALLOWED_METHODS: &str = "GET, POST, DELETE";

pub async fn handle(state: &AppState, request: Request<Body>) -> Result<Response, AppError> {
    let method = request.method().clone();

    match session_id_header(request.headers())? {
        Some(_) if !matches!(method, Method::GET | Method::POST | Method::DELETE) => {
            Err(AppError::method_not_allowed(Some(ALLOWED_METHODS)))
        }
        Some(session_id) => {
            let session = match state.sessions.streamable.get(&session_id).await {
                Some(session) => session,
                None => resume(state, session_id.into()).await?,
            };
            forward(state, &session, request).await
        }
        None if method == Method::POST => initialize(state, request).await,
        None => Err(AppError::bad_request("invalid_request", "Invalid request")),
    }
}

fn session_id_header(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    let Some(value) = headers.get(&MCP_SESSION_ID) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| Some(id.to_string()))
        .ok_or_else(|| AppError::bad_request("invalid_session_id", "Invalid mcp-session-id header"))
}

/// Runs the handshake path: the first POST of a client must be `initialize`.
async fn initialize(state: &AppState, request: Request<Body>) -> Result<Response, AppError> {
    let body = read_body(request).await?;
    let payload = match parse_payload(&body) {
        Ok(payload) => payload,
        Err(response) => return Ok(response),
    };

    if !is_initialize_request(&payload) {
        let error = json_rpc_error(
            payload.get("id").cloned(),
            SERVER_NOT_INITIALIZED,
            "Bad Request: Server not initialized",
        );
        return Ok((StatusCode::BAD_REQUEST, Json(error)).into_response());
    }

    let session = complete_init(state, SessionIdGenerator::Random).await?;
    exchange(&session, payload).await
}

/// Adopts a client-supplied id we have no session for.
async fn resume(state: &AppState, session_id: SessionId) -> Result<Session, AppError> {
    info!(session_id = %session_id, "resuming unknown streamable session id");
    complete_init(state, SessionIdGenerator::Fixed(session_id)).await
}

/// Connects an engine to a new session and registers it.
///
/// The session only becomes visible to lookups after the engine is connected and the
/// session is marked initialized. If a concurrent request registered the same id first,
/// that session wins and ours is closed.
pub async fn complete_init(
    state: &AppState,
    generator: SessionIdGenerator,
) -> Result<Session, AppError> {
    let session_id = generator.generate();
    let (session, transport) =
        Session::open(session_id.clone(), TransportKind::Streamable, &state.shutdown);

    state
        .backend
        .connect(transport, true)
        .await
        .map_err(connect_failed)?;
    session.mark_initialized();

    match state.sessions.streamable.register(session.clone()).await {
        Ok(()) => {
            info!(session_id = %session_id, "streamable session initialized");
            Ok(session)
        }
        Err(existing) => {
            debug!(session_id = %session_id, "session id registered concurrently");
            session.close();
            Ok(existing)
        }
    }
}

async fn forward(
    state: &AppState,
    session: &Session,
    request: Request<Body>,
) -> Result<Response, AppError> {
    match *request.method() {
        Method::POST => {
            let body = read_body(request).await?;
            match parse_payload(&body) {
                Ok(payload) => exchange(session, payload).await,
                Err(response) => Ok(with_session_header(response, session.id())),
            }
        }
        Method::GET => open_stream(state, session),
        Method::DELETE => terminate(state, session).await,
        _ => Err(AppError::method_not_allowed(Some(ALLOWED_METHODS))),
    }
}

async fn exchange(session: &Session, payload: Value) -> Result<Response, AppError> {
    let response = match session.dispatch(payload).await? {
        Some(reply) => (StatusCode::OK, Json(reply)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    };
    Ok(with_session_header(response, session.id()))
}

/// Server-initiated messages between requests. One stream per session at a time.
fn open_stream(state: &AppState, session: &Session) -> Result<Response, AppError> {
    let outbound = session.take_stream(StreamRelease::Return).ok_or_else(|| {
        AppError::conflict(
            "stream_conflict",
            "Conflict: Only one SSE stream is allowed per session",
        )
    })?;
    debug!(session_id = %session.id(), "standalone stream attached");

    let response = Sse::new(outbound.map(message_event))
        .keep_alive(KeepAlive::new().interval(state.sse_keep_alive))
        .into_response();
    Ok(with_session_header(response, session.id()))
}

async fn terminate(state: &AppState, session: &Session) -> Result<Response, AppError> {
    session.close();
    state.sessions.streamable.remove(session).await;
    info!(session_id = %session.id(), "streamable session terminated by client");
    Ok(StatusCode::OK.into_response())
}

fn parse_payload(body: &[u8]) -> Result<Value, Response> {
    serde_json::from_slice(body)
        .map_err(|_| (StatusCode::BAD_REQUEST, Json(parse_error())).into_response())
}

fn with_session_header(mut response: Response, session_id: &SessionId) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(MCP_SESSION_ID, value);
    }
    response
}
