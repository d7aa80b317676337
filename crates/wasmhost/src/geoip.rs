//! Geo-IP lookup proxy.

use std::net::IpAddr;

use bytes::Bytes;
use reqwest::Client;

use crate::config::GeoIpSettings;
use crate::error::{HostError, HostResult};

/// Route prefix; the remainder of the path is the IP literal.
pub const ROUTE_PREFIX: &str = "/api/ip/";

/// Client for the third-party Geo-IP lookup service.
#[derive(Debug, Clone)]
pub struct GeoIpClient {
    /// HTTP client.
    client: Client,
    /// Upstream base URL, without trailing slash.
    upstream_url: String,
}

impl GeoIpClient {
    /// Create a new lookup client.
    pub fn new(settings: &GeoIpSettings) -> HostResult<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| HostError::upstream(format!("failed to create client: {e}")))?;

        Ok(Self {
            client,
            upstream_url: settings.upstream_url.trim_end_matches('/').to_string(),
        })
    }

    /// Look up `raw_ip` (a percent-encoded path segment) upstream.
    ///
    /// Returns the upstream body verbatim once it has been checked to be JSON.
    pub async fn lookup(&self, raw_ip: &str) -> HostResult<Bytes> {
        let ip = parse_ip(raw_ip)?;
        let url = self.lookup_url(ip);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| HostError::upstream(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| HostError::upstream(format!("failed to read body: {e}")))?;

        serde_json::from_slice::<serde::de::IgnoredAny>(&body).map_err(|e| {
            HostError::upstream_body(format!("upstream status {status}, invalid JSON: {e}"))
        })?;

        tracing::debug!(%ip, %status, bytes = body.len(), "geo-ip lookup completed");
        Ok(body)
    }

    fn lookup_url(&self, ip: IpAddr) -> String {
        format!("{}/{}", self.upstream_url, ip)
    }
}

/// Decode a path segment and parse it as an IPv4 or IPv6 literal.
pub fn parse_ip(raw: &str) -> HostResult<IpAddr> {
    let decoded = urlencoding::decode(raw).map_err(|_| HostError::invalid_address(raw))?;
    if decoded.contains('/') {
        return Err(HostError::invalid_address(decoded));
    }
    decoded
        .trim()
        .parse()
        .map_err(|_| HostError::invalid_address(decoded.as_ref()))
}
