//! Configuration for wasmhost.
//!
//! Configuration is assembled once at startup (file, then environment
//! overrides, then validation) and shared read-only behind an `Arc`.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HostError, HostResult};

/// Default Geo-IP lookup endpoint; the IP literal is appended as a path segment.
pub const DEFAULT_GEOIP_URL: &str = "https://ip-api.com/json";

/// Host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Listener and static root settings.
    pub server: ServerSettings,
    /// Response header policy toggles.
    pub headers: HeaderSettings,
    /// Geo-IP proxy settings.
    pub geoip: GeoIpSettings,
    /// Logging settings.
    pub telemetry: TelemetrySettings,
}

impl HostConfig {
    /// Create a new configuration builder.
    pub fn builder() -> HostConfigBuilder {
        HostConfigBuilder::default()
    }

    /// Load configuration from a file.
    pub fn from_file(path: impl Into<PathBuf>) -> HostResult<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| HostError::config(format!("failed to read config file: {e}")))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        match extension {
            "toml" => toml::from_str(&content)
                .map_err(|e| HostError::config(format!("invalid TOML: {e}"))),
            "json" => serde_json::from_str(&content)
                .map_err(|e| HostError::config(format!("invalid JSON: {e}"))),
            _ => Err(HostError::config(format!(
                "unsupported config format: {extension}"
            ))),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Variables are prefixed with `WASMHOST_`. The platform-provided `PORT`
    /// is honoured too, with `WASMHOST_LISTEN_PORT` taking precedence.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.server.listen_port = port;
        }

        if let Some(port) = lookup("WASMHOST_LISTEN_PORT").and_then(|p| p.parse().ok()) {
            self.server.listen_port = port;
        }

        if let Some(addr) = lookup("WASMHOST_LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }

        if let Some(root) = lookup("WASMHOST_STATIC_ROOT") {
            self.server.static_root = PathBuf::from(root);
        }

        if let Some(enabled) = lookup("WASMHOST_CORS").and_then(|v| parse_flag(&v)) {
            self.headers.cors = enabled;
        }

        if let Some(enabled) = lookup("WASMHOST_EXTENDED_CORS").and_then(|v| parse_flag(&v)) {
            self.headers.extended_cors = enabled;
        }

        if let Some(enabled) =
            lookup("WASMHOST_CROSS_ORIGIN_ISOLATION").and_then(|v| parse_flag(&v))
        {
            self.headers.cross_origin_isolation = enabled;
        }

        if let Some(url) = lookup("WASMHOST_GEOIP_URL") {
            self.geoip.upstream_url = url;
        }

        if let Some(timeout) =
            lookup("WASMHOST_GEOIP_TIMEOUT").and_then(|t| humantime_serde::parse_duration(&t).ok())
        {
            self.geoip.timeout = timeout;
        }

        if let Some(json) = lookup("WASMHOST_LOG_JSON").and_then(|v| parse_flag(&v)) {
            self.telemetry.json_logs = json;
        }

        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> HostResult<()> {
        self.socket_addr()?;

        if self.server.static_root.as_os_str().is_empty() {
            return Err(HostError::config("static_root must not be empty"));
        }

        if !self.geoip.upstream_url.starts_with("http://")
            && !self.geoip.upstream_url.starts_with("https://")
        {
            return Err(HostError::config(
                "geoip.upstream_url must start with http:// or https://",
            ));
        }

        if self.geoip.timeout.is_zero() {
            return Err(HostError::config("geoip.timeout must be greater than zero"));
        }

        Ok(())
    }

    /// The socket address the listener binds to.
    pub fn socket_addr(&self) -> HostResult<SocketAddr> {
        let ip: IpAddr = self
            .server
            .listen_addr
            .parse()
            .map_err(|e| HostError::config(format!("invalid listen address: {e}")))?;
        Ok(SocketAddr::new(ip, self.server.listen_port))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Listener and static root settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind to.
    pub listen_addr: String,
    /// Port to listen on.
    pub listen_port: u16,
    /// Directory static assets are served from.
    pub static_root: PathBuf,
    /// File served for directory requests.
    pub index_file: String,
    /// How long in-flight connections may take to finish after shutdown.
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 1234,
            static_root: PathBuf::from("public"),
            index_file: "index.html".to_string(),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// Response header policy toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderSettings {
    /// Send `Access-Control-Allow-Origin: *`.
    pub cors: bool,
    /// Also send the allowed methods and headers.
    pub extended_cors: bool,
    /// Send COOP/COEP/CORP so browsers expose `SharedArrayBuffer`.
    pub cross_origin_isolation: bool,
}

impl Default for HeaderSettings {
    fn default() -> Self {
        Self {
            cors: true,
            extended_cors: false,
            cross_origin_isolation: true,
        }
    }
}

/// Geo-IP proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoIpSettings {
    /// Base URL of the lookup service.
    pub upstream_url: String,
    /// Timeout for the whole upstream exchange.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for GeoIpSettings {
    fn default() -> Self {
        Self {
            upstream_url: DEFAULT_GEOIP_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json_logs: bool,
    /// Log one line per completed request.
    pub access_log: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            access_log: true,
        }
    }
}

/// Builder for `HostConfig`.
#[derive(Debug, Default)]
pub struct HostConfigBuilder {
    config: HostConfig,
}

impl HostConfigBuilder {
    /// Set the listen address.
    #[must_use]
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.server.listen_addr = addr.into();
        self
    }

    /// Set the listen port.
    #[must_use]
    pub fn listen_port(mut self, port: u16) -> Self {
        self.config.server.listen_port = port;
        self
    }

    /// Set the static root directory.
    #[must_use]
    pub fn static_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.server.static_root = root.into();
        self
    }

    /// Set the shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.server.shutdown_timeout = timeout;
        self
    }

    /// Toggle the basic CORS header.
    #[must_use]
    pub fn cors(mut self, enabled: bool) -> Self {
        self.config.headers.cors = enabled;
        self
    }

    /// Toggle the extended CORS headers.
    #[must_use]
    pub fn extended_cors(mut self, enabled: bool) -> Self {
        self.config.headers.extended_cors = enabled;
        self
    }

    /// Toggle the cross-origin isolation headers.
    #[must_use]
    pub fn cross_origin_isolation(mut self, enabled: bool) -> Self {
        self.config.headers.cross_origin_isolation = enabled;
        self
    }

    /// Set the Geo-IP upstream base URL.
    #[must_use]
    pub fn geoip_url(mut self, url: impl Into<String>) -> Self {
        self.config.geoip.upstream_url = url.into();
        self
    }

    /// Set the Geo-IP upstream timeout.
    #[must_use]
    pub fn geoip_timeout(mut self, timeout: Duration) -> Self {
        self.config.geoip.timeout = timeout;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> HostResult<HostConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Duration (de)serialization accepting `500ms`, `10s`, `1m`, `1h` or bare seconds.
mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = if duration.subsec_millis() == 0 {
            format!("{}s", duration.as_secs())
        } else {
            format!("{}ms", duration.as_millis())
        };
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let parse = |n: &str| -> Result<u64, String> {
            n.trim().parse().map_err(|_| format!("invalid duration: {s}"))
        };

        if let Some(stripped) = s.strip_suffix("ms") {
            Ok(Duration::from_millis(parse(stripped)?))
        } else if let Some(stripped) = s.strip_suffix('s') {
            Ok(Duration::from_secs(parse(stripped)?))
        } else if let Some(stripped) = s.strip_suffix('m') {
            Ok(Duration::from_secs(parse(stripped)? * 60))
        } else if let Some(stripped) = s.strip_suffix('h') {
            Ok(Duration::from_secs(parse(stripped)? * 3600))
        } else {
            Ok(Duration::from_secs(parse(s)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();
        assert_eq!(config.server.listen_addr, "0.0.0.0");
        assert_eq!(config.server.listen_port, 1234);
        assert_eq!(config.server.static_root, PathBuf::from("public"));
        assert!(config.headers.cors);
        assert!(!config.headers.extended_cors);
        assert!(config.headers.cross_origin_isolation);
        assert_eq!(config.geoip.upstream_url, "https://ip-api.com/json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = HostConfig::builder()
            .listen_addr("127.0.0.1")
            .listen_port(8080)
            .static_root("/srv/game")
            .extended_cors(true)
            .geoip_timeout(Duration::from_secs(3))
            .build()
            .unwrap();

        assert_eq!(config.socket_addr().unwrap(), "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.server.static_root, PathBuf::from("/srv/game"));
        assert!(config.headers.extended_cors);
        assert_eq!(config.geoip.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_config_validation() {
        assert!(HostConfig::builder().listen_addr("localhost:80").build().is_err());
        assert!(HostConfig::builder().static_root("").build().is_err());
        assert!(HostConfig::builder().geoip_url("ip-api.com/json").build().is_err());
        assert!(HostConfig::builder().geoip_timeout(Duration::ZERO).build().is_err());
        assert!(HostConfig::builder().listen_addr("::").build().is_ok());
    }

    #[test]
    fn test_platform_port_override() {
        let config = HostConfig::default().with_overrides_from(lookup(&[("PORT", "5000")]));
        assert_eq!(config.server.listen_port, 5000);

        let config = HostConfig::default().with_overrides_from(lookup(&[
            ("PORT", "5000"),
            ("WASMHOST_LISTEN_PORT", "6000"),
        ]));
        assert_eq!(config.server.listen_port, 6000);

        let config = HostConfig::default().with_overrides_from(lookup(&[("PORT", "not-a-port")]));
        assert_eq!(config.server.listen_port, 1234);
    }

    #[test]
    fn test_flag_overrides() {
        let config = HostConfig::default().with_overrides_from(lookup(&[
            ("WASMHOST_CORS", "off"),
            ("WASMHOST_EXTENDED_CORS", "1"),
            ("WASMHOST_CROSS_ORIGIN_ISOLATION", "false"),
            ("WASMHOST_GEOIP_TIMEOUT", "750ms"),
            ("WASMHOST_STATIC_ROOT", "dist"),
        ]));

        assert!(!config.headers.cors);
        assert!(config.headers.extended_cors);
        assert!(!config.headers.cross_origin_isolation);
        assert_eq!(config.geoip.timeout, Duration::from_millis(750));
        assert_eq!(config.server.static_root, PathBuf::from("dist"));
    }

    #[test]
    fn test_toml_config() {
        let toml = r#"
[server]
listen_port = 8000
static_root = "build"
shutdown_timeout = "30s"

[headers]
extended_cors = true

[geoip]
timeout = "2s"
"#;
        let config: HostConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.listen_port, 8000);
        assert_eq!(config.server.listen_addr, "0.0.0.0");
        assert_eq!(config.server.static_root, PathBuf::from("build"));
        assert_eq!(config.server.shutdown_timeout, Duration::from_secs(30));
        assert!(config.headers.cors);
        assert!(config.headers.extended_cors);
        assert_eq!(config.geoip.timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_from_file_rejects_unknown_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.yaml");
        std::fs::write(&path, "server: {}").unwrap();

        let err = HostConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.json");
        std::fs::write(&path, r#"{"server": {"listen_port": 9999}}"#).unwrap();

        let config = HostConfig::from_file(&path).unwrap();
        assert_eq!(config.server.listen_port, 9999);
    }

    #[test]
    fn test_parse_duration() {
        use super::humantime_serde::parse_duration;

        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("7").unwrap(), Duration::from_secs(7));
        assert!(parse_duration("soon").is_err());
    }
}
