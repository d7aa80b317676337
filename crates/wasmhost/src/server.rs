//! HTTP server.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use http::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn, Instrument};

use crate::body::HttpResponse;
use crate::config::HostConfig;
use crate::error::{HostError, HostResult};
use crate::router::Router;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// The web server: a listener feeding one [`Router`].
pub struct HostServer {
    config: Arc<HostConfig>,
    router: Arc<Router>,
}

impl HostServer {
    /// Create a new server.
    pub fn new(config: HostConfig) -> HostResult<Self> {
        let config = Arc::new(config);
        let router = Arc::new(Router::new(Arc::clone(&config))?);

        Ok(Self { config, router })
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> HostResult<TcpListener> {
        let addr = self.config.socket_addr()?;
        TcpListener::bind(addr)
            .await
            .map_err(|e| HostError::server(format!("failed to bind {addr}: {e}")))
    }

    /// Run until SIGINT or SIGTERM.
    pub async fn run(self) -> HostResult<()> {
        let listener = self.bind().await?;
        self.serve(listener, ShutdownSignal::with_os_signals()).await
    }

    /// Run until `shutdown` is triggered.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> HostResult<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from an already-bound listener until `shutdown`
    /// is triggered, then wait for open connections to finish.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> HostResult<()> {
        let local_addr = listener.local_addr()?;
        info!(
            addr = %local_addr,
            "Web server serving directory {} at {}",
            self.config.server.static_root.display(),
            startup_url(local_addr),
        );

        let tracker = ConnectionTracker::new();
        let access_log = self.config.telemetry.access_log;

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let router = Arc::clone(&self.router);
                            let token = tracker.acquire();
                            let shutdown = shutdown.clone();

                            tokio::spawn(async move {
                                serve_connection(stream, peer_addr, router, access_log, shutdown).await;
                                drop(token);
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        drop(listener);

        let timeout = self.config.server.shutdown_timeout;
        let open = tracker.active_connections();
        if open > 0 {
            info!("Waiting up to {:?} for {} connections to close", timeout, open);
        }

        if tokio::time::timeout(timeout, tracker.wait_for_drain())
            .await
            .is_err()
        {
            warn!(
                "Shutdown timeout reached, {} connections still active",
                tracker.active_connections()
            );
        }

        info!("Server stopped.");
        Ok(())
    }
}

/// The URL announced at startup, built from the address actually bound.
fn startup_url(addr: SocketAddr) -> String {
    format!("http://{addr}")
}

async fn serve_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    router: Arc<Router>,
    access_log: bool,
    shutdown: ShutdownSignal,
) {
    let io = TokioIo::new(stream);

    let service = service_fn(move |req: Request<Incoming>| {
        let router = Arc::clone(&router);
        async move { Ok::<_, Infallible>(handle_request(req, &router, peer_addr, access_log).await) }
    });

    let conn = http1::Builder::new().serve_connection(io, service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(e) = result {
                debug!("Connection error from {}: {}", peer_addr, e);
            }
        }
        _ = shutdown.recv() => {
            conn.as_mut().graceful_shutdown();
            if let Err(e) = conn.as_mut().await {
                debug!("Connection error from {} during shutdown: {}", peer_addr, e);
            }
        }
    }
}

async fn handle_request(
    req: Request<Incoming>,
    router: &Router,
    peer_addr: SocketAddr,
    access_log: bool,
) -> HttpResponse {
    let start = Instant::now();
    let (parts, _body) = req.into_parts();

    let span = tracing::info_span!(
        "request",
        method = %parts.method,
        path = %parts.uri.path(),
        peer = %peer_addr,
    );

    async move {
        let (route, response) = router.dispatch(&parts).await;

        if access_log {
            info!(
                status = response.status().as_u16(),
                route = route.as_str(),
                duration_ms = start.elapsed().as_millis() as u64,
                "request completed"
            );
        }

        response
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_startup_url() {
        let v4: SocketAddr = "0.0.0.0:1234".parse().unwrap();
        assert_eq!(startup_url(v4), "http://0.0.0.0:1234");

        let v6: SocketAddr = "[::1]:8080".parse().unwrap();
        assert_eq!(startup_url(v6), "http://[::1]:8080");
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_address() {
        let mut config = HostConfig::default();
        config.server.listen_addr = "not-an-address".to_string();

        let server = HostServer::new(config).unwrap();
        let err = server.bind().await.unwrap_err();
        assert_eq!(err.category(), "config");
    }

    #[tokio::test]
    async fn test_bind_conflict_is_server_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let config = HostConfig::builder()
            .listen_addr("127.0.0.1")
            .listen_port(port)
            .build()
            .unwrap();
        let err = HostServer::new(config)
            .unwrap()
            .run_with_shutdown(ShutdownSignal::new())
            .await
            .unwrap_err();
        assert_eq!(err.category(), "server");
    }

    #[tokio::test]
    async fn test_run_and_shutdown() {
        let config = HostConfig::builder()
            .listen_addr("127.0.0.1")
            .listen_port(0)
            .shutdown_timeout(Duration::from_millis(100))
            .build()
            .unwrap();

        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            HostServer::new(config).unwrap().run_with_shutdown(shutdown),
        )
        .await;

        assert!(result.expect("server should stop").is_ok());
    }
}
