//! wasmhost - static host for WebAssembly game builds
//!
//! Serves an exported Unity/Unreal WebAssembly build from a directory and
//! adds the response headers such builds need to run in a browser:
//!
//! - **Static assets** with fixed types for `.wasm`, `.js`, `.css`, `.ico`,
//!   `.data` and `.unityweb`, and year-long immutable caching for the large
//!   build payloads.
//! - **Cross-origin isolation** (`COOP`/`COEP`/`CORP`) and CORS headers on
//!   every response, so threaded builds get `SharedArrayBuffer`.
//! - **Geo-IP lookup** at `/api/ip/{ip}`, proxied to a third-party service so
//!   the browser never calls it directly.
//! - **Liveness** at `/health`.
//!
//! # Example Usage
//!
//! ```bash
//! # Serve ./public on 0.0.0.0:1234
//! $ wasmhost
//!
//! # Serve another directory on the platform-provided port
//! $ PORT=8080 WASMHOST_STATIC_ROOT=./Build wasmhost
//! ```
//!
//! Embedding:
//!
//! ```rust,no_run
//! use wasmhost::{HostConfig, HostServer};
//!
//! # async fn run() -> wasmhost::HostResult<()> {
//! let config = HostConfig::builder().static_root("dist").listen_port(8080).build()?;
//! HostServer::new(config)?.run().await
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod body;
pub mod config;
pub mod error;
pub mod geoip;
pub mod headers;
pub mod health;
pub mod logging;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod static_files;

pub use config::HostConfig;
pub use error::{ErrorBody, HostError, HostResult};
pub use geoip::GeoIpClient;
pub use headers::HeaderPolicy;
pub use router::{Route, Router};
pub use server::HostServer;
pub use shutdown::ShutdownSignal;
pub use static_files::StaticFiles;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
