use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use tracing::debug;

use crate::{
    errors::AppError,
    http::{classify, Route},
    AppState,
};

/// Guards both transports when an API token is configured. Health stays public for
/// uptime checks without credentials.
pub async fn require_bearer_token(
    State(state): State<AppState>,
    auth_header: Option<TypedHeader<Authorization<Bearer>>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let route = classify(request.uri().path());
    let Some(expected) = state.api_token.as_deref().filter(|_| route != Route::Health) else {
        return Ok(next.run(request).await);
    };

    match auth_header {
        Some(TypedHeader(auth)) if auth.token() == expected => Ok(next.run(request).await),
        Some(_) => {
            debug!(route = ?route, "rejecting request with wrong bearer token");
            Err(AppError::unauthorized("invalid_token", "Invalid bearer token"))
        }
        None => {
            debug!(route = ?route, "rejecting request without bearer token");
            Err(AppError::unauthorized("missing_token", "Missing authorization header"))
        }
    }
}
