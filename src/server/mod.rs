//! HTTP surface: routes, error mapping and the serve loop.

pub mod error;
pub mod routes;

pub use error::ApiError;
pub use routes::{router, AppState, CACHE_HEADER};

use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Serve `router` on `addr` until ctrl-c.
pub async fn serve(addr: SocketAddr, router: Router) -> std::io::Result<()> {
  let listener = TcpListener::bind(addr).await?;
  tracing::info!(addr = %listener.local_addr()?, "listening");

  axum::serve(listener, router)
    .with_graceful_shutdown(shutdown_signal())
    .await
}

async fn shutdown_signal() {
  if tokio::signal::ctrl_c().await.is_ok() {
    tracing::info!("shutdown requested");
  }
}
