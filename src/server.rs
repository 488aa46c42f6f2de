//! HTTP server bootstrap.

use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{RatekeeperError, Result};
use crate::http::Router;

/// HTTP server serving a [`Router`].
///
/// Connections are served with their peer address attached to each request,
/// so identity resolution can fall back to it.
pub struct HttpServer {
    /// Bound listener
    listener: TcpListener,
    /// Routes to serve
    router: axum::Router,
}

impl HttpServer {
    /// Bind `addr` for serving `router`.
    pub async fn bind(addr: SocketAddr, router: Router) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            router: router.into_axum(),
        })
    }

    /// The address actually bound (useful when binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the process is stopped.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `signal` resolves, then drain in-flight requests.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        info!(addr = %addr, "Starting HTTP server");

        axum::serve(
            self.listener,
            self.router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            RatekeeperError::Server(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = HttpServer::bind(addr, Router::new()).await.unwrap();

        let bound = server.local_addr().unwrap();
        assert_eq!(bound.ip(), addr.ip());
        assert_ne!(bound.port(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_server() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = HttpServer::bind(addr, Router::new()).await.unwrap();

        let result = server.serve_with_shutdown(async {}).await;
        assert!(result.is_ok());
    }
}
