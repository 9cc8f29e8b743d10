use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use super::error::ApiError;
use super::state::ApiState;

/// Rejects requests without the configured bearer secret. A no-op when no secret is set.
pub async fn api_auth(State(state): State<ApiState>, request: Request<Body>, next: Next) -> Response {
    let Some(secret) = state.secret.as_deref() else {
        return next.run(request).await;
    };

    let authorized = extract_token(request.headers().get(header::AUTHORIZATION))
        .is_some_and(|token| bool::from(token.as_bytes().ct_eq(secret.as_bytes())));

    if !authorized {
        return ApiError::unauthorized().into_response();
    }

    next.run(request).await
}

fn extract_token(header: Option<&HeaderValue>) -> Option<&str> {
    let raw = header?.to_str().ok()?;
    raw.strip_prefix("Bearer ").map(str::trim)
}
