//! Log subscriber setup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::TelemetrySettings;
use crate::error::{HostError, HostResult};

/// Builds the filter: `RUST_LOG` when set, otherwise this crate at the
/// configured level and everything else at `warn`.
pub fn env_filter(settings: &TelemetrySettings) -> HostResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(format!("wasmhost={},warn", settings.log_level))
        .map_err(|e| HostError::config(format!("invalid log level: {e}")))
}

/// Installs the global subscriber.
///
/// Fails if the level is invalid or a subscriber is already installed.
pub fn init_logging(settings: &TelemetrySettings) -> HostResult<()> {
    let filter = env_filter(settings)?;

    let layer = if settings.json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_filter(filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_filter(filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| HostError::config(format!("failed to initialize logging: {e}")))
}
