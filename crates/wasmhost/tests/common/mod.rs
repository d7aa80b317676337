//! Shared fixtures: a game build on disk and a mock Geo-IP upstream.

#![allow(dead_code)]

use std::convert::Infallible;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use wasmhost::HostConfig;

/// Body returned by the mock upstream for a valid lookup.
pub const LOOKUP_JSON: &str =
    r#"{"status":"success","country":"United States","query":"8.8.8.8"}"#;

/// Writes a small exported build into a fresh directory.
pub fn game_build() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    fs::write(root.join("index.html"), "<html><body>game</body></html>").unwrap();
    fs::write(root.join("style.css"), "canvas { width: 100% }").unwrap();
    fs::write(root.join("favicon.ico"), [0u8, 0, 1, 0]).unwrap();

    let build = root.join("Build");
    fs::create_dir(&build).unwrap();
    fs::write(build.join("game.loader.js"), "function createUnityInstance() {}").unwrap();
    fs::write(build.join("game.wasm"), [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00]).unwrap();
    fs::write(build.join("game.data"), vec![7u8; 64]).unwrap();
    fs::write(build.join("game.framework.unityweb"), "framework").unwrap();

    dir
}

/// Configuration serving `root` and querying `upstream` on localhost.
pub fn config(root: &Path, upstream: &str) -> HostConfig {
    HostConfig::builder()
        .listen_addr("127.0.0.1")
        .listen_port(0)
        .static_root(root)
        .geoip_url(upstream)
        .geoip_timeout(Duration::from_millis(500))
        .shutdown_timeout(Duration::from_secs(1))
        .build()
        .unwrap()
}

/// A mock upstream answering every request with a fixed body.
pub struct MockUpstream {
    /// Base URL to configure as `geoip.upstream_url`.
    pub url: String,
    /// Paths requested so far.
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl MockUpstream {
    /// Starts a mock answering `status` with `body`.
    pub async fn start(status: StatusCode, body: &'static str) -> Self {
        Self::start_with_delay(status, body, Duration::ZERO).await
    }

    /// Starts a mock that waits `delay` before answering.
    pub async fn start_with_delay(status: StatusCode, body: &'static str, delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let seen = Arc::clone(&seen);

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let seen = Arc::clone(&seen);
                        async move {
                            seen.lock().unwrap().push(req.uri().path().to_string());
                            tokio::time::sleep(delay).await;
                            Ok::<_, Infallible>(
                                Response::builder()
                                    .status(status)
                                    .body(Full::new(Bytes::from_static(body.as_bytes())))
                                    .unwrap(),
                            )
                        }
                    });

                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self {
            url: format!("http://{addr}/json"),
            requests,
        }
    }

    /// Paths requested so far.
    pub fn requested(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// An upstream that reads one lookup request and never answers it.
pub struct HangingUpstream {
    /// Base URL to configure as `geoip.upstream_url`.
    pub url: String,
    /// Fires once the request head has arrived.
    pub received: oneshot::Receiver<()>,
    /// Fires once the client has closed the connection.
    pub closed: oneshot::Receiver<()>,
}

impl HangingUpstream {
    /// Starts the upstream on a raw socket.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (received_tx, received) = oneshot::channel();
        let (closed_tx, closed) = oneshot::channel();

        tokio::spawn(async move {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };

            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => head.extend_from_slice(&buf[..n]),
                }
            }
            let _ = received_tx.send(());

            while let Ok(n) = stream.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
            let _ = closed_tx.send(());
        });

        Self {
            url: format!("http://{addr}/json"),
            received,
            closed,
        }
    }
}

/// A base URL on localhost where nothing is listening.
pub async fn unreachable_upstream() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/json")
}
