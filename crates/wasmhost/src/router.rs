//! Request dispatch.
//!
//! Stages run in a fixed order and the first one that claims the request
//! writes the response: preflight, Geo-IP lookup, static assets, health,
//! then the not-found fallback. The header policy is applied afterwards, so
//! it lands on every response whichever stage produced it.

use std::sync::Arc;

use http::request::Parts;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use hyper::body::Body;
use tracing::{debug, warn};

use crate::body::{self, HttpResponse};
use crate::config::HostConfig;
use crate::error::{ErrorBody, HostError, HostResult};
use crate::geoip::{GeoIpClient, ROUTE_PREFIX};
use crate::headers::HeaderPolicy;
use crate::health::{health_response, HEALTH_PATH};
use crate::static_files::{StaticFileError, StaticFiles};

/// Body of the not-found response.
pub const NOT_FOUND_BODY: &str = "File not found";

/// Methods advertised in `Allow` on preflight responses.
pub const ALLOWED_METHODS: &str = "GET, HEAD, OPTIONS";

/// Which stage claimed a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `OPTIONS` on any path.
    Preflight,
    /// `/api/ip/{ip}`.
    GeoIp,
    /// A file under the static root.
    Static,
    /// `/health`.
    Health,
    /// Nothing matched.
    NotFound,
}

impl Route {
    /// Short name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preflight => "preflight",
            Self::GeoIp => "geoip",
            Self::Static => "static",
            Self::Health => "health",
            Self::NotFound => "not_found",
        }
    }
}

/// Immutable request router shared by all connections.
#[derive(Debug, Clone)]
pub struct Router {
    policy: HeaderPolicy,
    static_files: StaticFiles,
    geoip: GeoIpClient,
}

impl Router {
    /// Build a router from configuration.
    pub fn new(config: Arc<HostConfig>) -> HostResult<Self> {
        let policy = HeaderPolicy::new(config.headers);
        let static_files = StaticFiles::new(&config.server.static_root)
            .index(config.server.index_file.clone());
        let geoip = GeoIpClient::new(&config.geoip)?;

        Ok(Self {
            policy,
            static_files,
            geoip,
        })
    }

    /// Handle a request. Never fails: every error becomes a response.
    pub async fn handle<B>(&self, request: Request<B>) -> HttpResponse {
        let (parts, _body) = request.into_parts();
        self.dispatch(&parts).await.1
    }

    /// Handle a request head and report which stage answered it.
    pub async fn dispatch(&self, request: &Parts) -> (Route, HttpResponse) {
        let method = &request.method;
        let path = request.uri.path();

        let (route, mut response) = self.route(method, path, &request.headers).await;

        if method == Method::HEAD {
            response = strip_body(response);
        }
        self.policy.apply(response.headers_mut());

        (route, response)
    }

    async fn route(
        &self,
        method: &Method,
        path: &str,
        headers: &http::HeaderMap,
    ) -> (Route, HttpResponse) {
        if method == Method::OPTIONS {
            return (Route::Preflight, preflight_response());
        }

        let readable = method == Method::GET || method == Method::HEAD;

        if readable {
            if let Some(raw_ip) = geoip_segment(path) {
                return (Route::GeoIp, self.lookup(raw_ip).await);
            }
        }

        match self.static_files.serve(path, headers, method).await {
            Ok(response) => return (Route::Static, response),
            Err(e) if e.is_fallthrough() => {
                debug!(error = %e, "static resolution fell through");
            }
            Err(StaticFileError::RangeNotSatisfiable { size }) => {
                return (Route::Static, range_not_satisfiable(size));
            }
            Err(e) => {
                warn!(error = %e, "failed to serve static file");
                return (
                    Route::Static,
                    text_response(e.status_code(), "text/plain; charset=utf-8", "Internal Server Error"),
                );
            }
        }

        if readable && path == HEALTH_PATH {
            return (Route::Health, health_response());
        }

        (
            Route::NotFound,
            text_response(StatusCode::NOT_FOUND, "text/html; charset=utf-8", NOT_FOUND_BODY),
        )
    }

    async fn lookup(&self, raw_ip: &str) -> HttpResponse {
        match self.geoip.lookup(raw_ip).await {
            Ok(json) => Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body::full(json))
                .unwrap_or_else(|_| internal_error()),
            Err(e) => {
                warn!(error = %e, category = e.category(), "geo-ip lookup failed");
                error_response(&e)
            }
        }
    }
}

/// The single path segment after `/api/ip/`, if the path has that shape.
/// One trailing slash is accepted.
fn geoip_segment(path: &str) -> Option<&str> {
    path.strip_prefix(ROUTE_PREFIX)
        .map(|rest| rest.strip_suffix('/').unwrap_or(rest))
        .filter(|rest| !rest.is_empty() && !rest.contains('/'))
}

/// JSON error response for a host error.
pub fn error_response(err: &HostError) -> HttpResponse {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json_response(status, &ErrorBody::from(err))
}

/// Create a JSON response.
fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> HttpResponse {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body::full(json))
        .unwrap_or_else(|_| internal_error())
}

fn text_response(status: StatusCode, content_type: &'static str, content: &'static str) -> HttpResponse {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .body(body::full(content))
        .unwrap_or_else(|_| internal_error())
}

fn preflight_response() -> HttpResponse {
    let mut response = Response::new(body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
    response
}

fn range_not_satisfiable(size: u64) -> HttpResponse {
    Response::builder()
        .status(StatusCode::RANGE_NOT_SATISFIABLE)
        .header(header::CONTENT_RANGE, format!("bytes */{size}"))
        .body(body::empty())
        .unwrap_or_else(|_| internal_error())
}

fn internal_error() -> HttpResponse {
    let mut response = Response::new(body::empty());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// Drop the body of a HEAD response, keeping the length a GET would send.
fn strip_body(response: HttpResponse) -> HttpResponse {
    let (mut parts, content) = response.into_parts();
    let status = parts.status;
    let bodyless = status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED;

    if !bodyless && !parts.headers.contains_key(header::CONTENT_LENGTH) {
        if let Some(length) = content.size_hint().exact() {
            parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        }
    }
    Response::from_parts(parts, body::empty())
}
