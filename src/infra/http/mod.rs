pub mod api;
pub mod loopback;
mod middleware;

pub use api::{ApiState, build_api_router};
pub use loopback::{LoopbackState, LoopbackUrls, build_loopback_router};
pub use middleware::{REQUEST_ID_HEADER, RequestContext};

use std::{future::Future, net::SocketAddr};

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::infra::error::InfraError;

/// Bind a listener, surfacing the address in the error.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, InfraError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| InfraError::bind(addr, source))
}

/// Serve `router` on `listener` until `shutdown` resolves.
pub async fn serve(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), InfraError> {
    let addr = listener.local_addr()?;
    info!(
        target = "pressroom::http",
        listener = name,
        addr = %addr,
        "listening"
    );
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
