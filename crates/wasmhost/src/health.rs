//! Liveness endpoint.

use http::{header, Response, StatusCode};

use crate::body::{self, HttpResponse};

/// Path answered by the liveness check.
pub const HEALTH_PATH: &str = "/health";

/// Body of a healthy response.
pub const HEALTH_BODY: &str = "OK";

/// Builds the liveness response.
pub fn health_response() -> HttpResponse {
    let mut response = Response::new(body::full(HEALTH_BODY));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
