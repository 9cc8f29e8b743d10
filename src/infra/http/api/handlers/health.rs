use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::application::error::ErrorReport;
use crate::infra::http::api::models::HealthResponse;
use crate::infra::http::api::state::ApiState;

/// Pool snapshot; 503 once no slot can serve a render any more.
pub async fn health(State(state): State<ApiState>) -> Response {
    let pool = state.pool.stats();
    let healthy = pool.has_capacity() && !state.pool.is_closed();
    let (status, label) = if healthy {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };

    let mut response = (
        status,
        Json(HealthResponse {
            status: label,
            pool,
            registered_bundles: state.bundles.registered(),
            store_configured: state.bundles.has_store(),
        }),
    )
        .into_response();

    if !healthy {
        ErrorReport::from_message(
            "infra::http::health",
            status,
            "no renderer worker can accept jobs",
        )
        .attach(&mut response);
    }
    response
}
