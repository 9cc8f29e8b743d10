//! Loopback-only bridge the browser workers load pages from.
//!
//! Routes:
//! - `GET /html-bundle/{id}/{*path}` serves a file of an ephemerally registered bundle.
//! - `GET /assets/{key}` serves a preloaded stylesheet.
//!
//! Everything answers `Cache-Control: no-store`; unknown ids, paths and keys are 404.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use url::Url;
use uuid::Uuid;

use crate::application::{assets::AssetsProvider, bundles::BundleProvider, error::ErrorReport};
use crate::domain::bundle::{BundleError, INDEX_FILE};

use super::middleware::log_responses;

const SOURCE: &str = "infra::http::loopback";
const NO_STORE: &str = "no-store";

#[derive(Clone)]
pub struct LoopbackState {
    pub bundles: Arc<BundleProvider>,
    pub assets: Arc<AssetsProvider>,
}

pub fn build_loopback_router(state: LoopbackState) -> Router {
    Router::new()
        .route("/html-bundle/{id}/{*path}", get(serve_bundle_file))
        .route("/assets/{key}", get(serve_asset))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
}

/// Builds the URLs workers are pointed at.
#[derive(Debug, Clone)]
pub struct LoopbackUrls {
    base: Url,
}

impl LoopbackUrls {
    pub fn new(addr: SocketAddr) -> Result<Self, url::ParseError> {
        let base = Url::parse(&format!("http://{addr}/"))?;
        Ok(Self { base })
    }

    pub fn bundle_index(&self, id: Uuid) -> String {
        self.bundle_file(id, INDEX_FILE)
    }

    pub fn bundle_file(&self, id: Uuid, path: &str) -> String {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.clear().push("html-bundle").push(&id.to_string());
            segments.extend(path.split('/').filter(|segment| !segment.is_empty()));
        }
        url.into()
    }
}

async fn serve_bundle_file(
    State(state): State<LoopbackState>,
    Path((id, path)): Path<(String, String)>,
) -> Response {
    let Ok(id) = Uuid::parse_str(&id) else {
        return not_found(format!("`{id}` is not a bundle id"));
    };
    let Some(bundle) = state.bundles.get_by_id(&id) else {
        return not_found(format!("bundle {id} is not registered"));
    };

    let requested = path.clone();
    let resolved = tokio::task::spawn_blocking(move || bundle.resolve(&requested)).await;
    match resolved {
        Ok(Ok(data)) => file_response(&path, data),
        Ok(Err(err @ (BundleError::NotFound { .. } | BundleError::InvalidPath { .. }))) => {
            let mut response = no_store(StatusCode::NOT_FOUND.into_response());
            ErrorReport::from_error(SOURCE, StatusCode::NOT_FOUND, &err).attach(&mut response);
            response
        }
        Ok(Err(err)) => {
            let mut response = no_store(StatusCode::INTERNAL_SERVER_ERROR.into_response());
            ErrorReport::from_error(SOURCE, StatusCode::INTERNAL_SERVER_ERROR, &err)
                .attach(&mut response);
            response
        }
        Err(err) => {
            let mut response = no_store(StatusCode::INTERNAL_SERVER_ERROR.into_response());
            ErrorReport::from_error(SOURCE, StatusCode::INTERNAL_SERVER_ERROR, &err)
                .attach(&mut response);
            response
        }
    }
}

async fn serve_asset(State(state): State<LoopbackState>, Path(key): Path<String>) -> Response {
    match state.assets.css_by_key(&key) {
        Some(css) => no_store(
            (
                [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
                css.to_string(),
            )
                .into_response(),
        ),
        None => not_found(format!("asset `{key}` is not loaded")),
    }
}

fn file_response(path: &str, data: Bytes) -> Response {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let content_type = if mime.type_() == mime_guess::mime::TEXT {
        format!("{mime}; charset=utf-8")
    } else {
        mime.to_string()
    };
    no_store(([(header::CONTENT_TYPE, content_type)], data).into_response())
}

fn not_found(detail: String) -> Response {
    let mut response = no_store(StatusCode::NOT_FOUND.into_response());
    ErrorReport::from_message(SOURCE, StatusCode::NOT_FOUND, detail).attach(&mut response);
    response
}

fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
    response
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::application::assets::{BUILTIN_STYLESHEET_KEY, CssAsset};
    use crate::domain::bundle::Bundle;

    fn state() -> LoopbackState {
        LoopbackState {
            bundles: Arc::new(BundleProvider::new(None)),
            assets: Arc::new(AssetsProvider::with_assets(vec![CssAsset::new(
                "brand",
                "h1{color:red}",
            )])),
        }
    }

    async fn get(router: Router, uri: &str) -> Response {
        router
            .oneshot(Request::get(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response")
    }

    #[test]
    fn urls_point_at_loopback_routes() {
        let urls = LoopbackUrls::new(SocketAddr::from(([127, 0, 0, 1], 8001))).expect("urls");
        let id = Uuid::nil();
        assert_eq!(
            urls.bundle_index(id),
            format!("http://127.0.0.1:8001/html-bundle/{id}/index.html")
        );
        assert_eq!(
            urls.bundle_file(id, "img/logo one.png"),
            format!("http://127.0.0.1:8001/html-bundle/{id}/img/logo%20one.png")
        );
    }

    #[tokio::test]
    async fn registered_bundle_files_are_served_until_released() {
        let state = state();
        let mut bundle = Bundle::new();
        bundle
            .add_file("index.html", Bytes::from_static(b"<h1>hi</h1>"))
            .expect("add index");
        bundle
            .add_file("css/site.css", Bytes::from_static(b"p{}"))
            .expect("add css");
        let registration = state.bundles.provide(bundle);
        let id = registration.id();
        let router = build_loopback_router(state.clone());

        let response = get(router.clone(), &format!("/html-bundle/{id}/index.html")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            HeaderValue::from_static("no-store")
        );
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            HeaderValue::from_static("text/html; charset=utf-8")
        );
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(&body[..], b"<h1>hi</h1>");

        let response = get(router.clone(), &format!("/html-bundle/{id}/css/site.css")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = get(router.clone(), &format!("/html-bundle/{id}/missing.png")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        drop(registration);
        let response = get(router, &format!("/html-bundle/{id}/index.html")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_ids_are_not_found() {
        let response = get(build_loopback_router(state()), "/html-bundle/nope/index.html").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn assets_are_served_by_key() {
        let router = build_loopback_router(state());

        let response = get(router.clone(), "/assets/brand").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(&body[..], b"h1{color:red}");

        let response = get(router.clone(), &format!("/assets/{BUILTIN_STYLESHEET_KEY}")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = get(router, "/assets/unknown").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
