pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod multipart;
pub mod state;

pub use state::ApiState;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::catch_panic::CatchPanicLayer;

use crate::infra::http::middleware::{log_responses, panic_response, set_request_context};

/// Public router: `/api/*` behind the optional bearer secret, `/health` open.
pub fn build_api_router(state: ApiState) -> Router {
    let auth_state = state.clone();
    let body_limit = state.max_body_bytes;

    let api = Router::new()
        .route(
            "/api/html-bundle",
            get(handlers::list_bundles).post(handlers::save_bundle),
        )
        .route(
            "/api/html-bundle/{name}",
            get(handlers::get_bundle).delete(handlers::delete_bundle),
        )
        .route(
            "/api/pdf/from/html-bundle/render",
            post(handlers::render_bundle),
        )
        .route(
            "/api/pdf/from/html-bundle/{name}",
            post(handlers::render_stored),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            middleware::api_auth,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(api)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
