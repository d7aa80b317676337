//! Response header policy.
//!
//! Every response leaves the host with the same CORS and cross-origin
//! isolation headers, whichever handler produced it. Browsers only expose
//! `SharedArrayBuffer` (and therefore threaded WebAssembly) to documents
//! served with COOP `same-origin` and COEP `require-corp`.

use http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::config::HeaderSettings;

/// Header name for `Cross-Origin-Opener-Policy`.
pub static CROSS_ORIGIN_OPENER_POLICY: HeaderName =
    HeaderName::from_static("cross-origin-opener-policy");

/// Header name for `Cross-Origin-Embedder-Policy`.
pub static CROSS_ORIGIN_EMBEDDER_POLICY: HeaderName =
    HeaderName::from_static("cross-origin-embedder-policy");

/// Header name for `Cross-Origin-Resource-Policy`.
pub static CROSS_ORIGIN_RESOURCE_POLICY: HeaderName =
    HeaderName::from_static("cross-origin-resource-policy");

/// Value sent in `Access-Control-Allow-Methods` by the extended CORS policy.
pub const CORS_ALLOW_METHODS: &str = "GET, POST, OPTIONS";

/// Value sent in `Access-Control-Allow-Headers` by the extended CORS policy.
pub const CORS_ALLOW_HEADERS: &str = "Content-Type";

/// Headers attached to every response, computed once from configuration.
#[derive(Debug, Clone, Default)]
pub struct HeaderPolicy {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderPolicy {
    /// Build the policy from configuration toggles.
    pub fn new(settings: HeaderSettings) -> Self {
        let mut headers = Vec::new();

        if settings.cors {
            headers.push((
                http::header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            ));

            if settings.extended_cors {
                headers.push((
                    http::header::ACCESS_CONTROL_ALLOW_METHODS,
                    HeaderValue::from_static(CORS_ALLOW_METHODS),
                ));
                headers.push((
                    http::header::ACCESS_CONTROL_ALLOW_HEADERS,
                    HeaderValue::from_static(CORS_ALLOW_HEADERS),
                ));
            }
        }

        if settings.cross_origin_isolation {
            headers.push((
                CROSS_ORIGIN_OPENER_POLICY.clone(),
                HeaderValue::from_static("same-origin"),
            ));
            headers.push((
                CROSS_ORIGIN_EMBEDDER_POLICY.clone(),
                HeaderValue::from_static("require-corp"),
            ));
            headers.push((
                CROSS_ORIGIN_RESOURCE_POLICY.clone(),
                HeaderValue::from_static("cross-origin"),
            ));
        }

        Self { headers }
    }

    /// Write the policy headers into `target`, replacing existing values.
    pub fn apply(&self, target: &mut HeaderMap) {
        for (name, value) in &self.headers {
            target.insert(name.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(cors: bool, extended_cors: bool, cross_origin_isolation: bool) -> HeaderSettings {
        HeaderSettings {
            cors,
            extended_cors,
            cross_origin_isolation,
        }
    }

    #[test]
    fn test_default_policy() {
        let mut headers = HeaderMap::new();
        HeaderPolicy::new(HeaderSettings::default()).apply(&mut headers);

        assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
        assert_eq!(headers.get("cross-origin-opener-policy").unwrap(), "same-origin");
        assert_eq!(headers.get("cross-origin-embedder-policy").unwrap(), "require-corp");
        assert_eq!(headers.get("cross-origin-resource-policy").unwrap(), "cross-origin");
        assert!(!headers.contains_key("access-control-allow-methods"));
        assert_eq!(headers.len(), 4);
    }

    #[test]
    fn test_extended_cors() {
        let mut headers = HeaderMap::new();
        HeaderPolicy::new(settings(true, true, false)).apply(&mut headers);

        assert_eq!(
            headers.get("access-control-allow-methods").unwrap(),
            "GET, POST, OPTIONS"
        );
        assert_eq!(headers.get("access-control-allow-headers").unwrap(), "Content-Type");
        assert!(!headers.contains_key("cross-origin-opener-policy"));
    }

    #[test]
    fn test_extended_cors_requires_cors() {
        let mut headers = HeaderMap::new();
        HeaderPolicy::new(settings(false, true, false)).apply(&mut headers);
        assert!(headers.is_empty());
    }

    #[test]
    fn test_apply_overwrites_existing_values() {
        let mut headers = HeaderMap::new();
        headers.insert("access-control-allow-origin", HeaderValue::from_static("https://a.test"));
        headers.insert("content-type", HeaderValue::from_static("text/css"));

        HeaderPolicy::new(HeaderSettings::default()).apply(&mut headers);

        assert_eq!(headers.get_all("access-control-allow-origin").iter().count(), 1);
        assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
        assert_eq!(headers.get("content-type").unwrap(), "text/css");
    }

    #[test]
    fn test_isolation_only() {
        let mut headers = HeaderMap::new();
        HeaderPolicy::new(settings(false, false, true)).apply(&mut headers);
        let mut names: Vec<_> = headers.keys().map(HeaderName::as_str).collect();
        names.sort_unstable();
        assert_eq!(
            names,
            [
                "cross-origin-embedder-policy",
                "cross-origin-opener-policy",
                "cross-origin-resource-policy"
            ]
        );
    }
}
