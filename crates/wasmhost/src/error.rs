//! Error types for wasmhost.

use thiserror::Error;

/// Errors raised while configuring or running the host.
#[derive(Debug, Error)]
pub enum HostError {
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// Listener or connection-level failure.
    #[error("Server error: {message}")]
    Server {
        /// Error message.
        message: String,
    },

    /// The `ip` path parameter is not an IP literal.
    #[error("Invalid IP address: {input}")]
    InvalidAddress {
        /// The rejected input.
        input: String,
    },

    /// The Geo-IP upstream could not be reached or its body could not be read.
    #[error("Upstream error: {message}")]
    Upstream {
        /// Error message.
        message: String,
    },

    /// The Geo-IP upstream answered with something that is not JSON.
    #[error("Upstream body error: {message}")]
    UpstreamBody {
        /// Error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Create an invalid address error.
    pub fn invalid_address(input: impl Into<String>) -> Self {
        Self::InvalidAddress {
            input: input.into(),
        }
    }

    /// Create an upstream error.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Create an upstream body error.
    pub fn upstream_body(message: impl Into<String>) -> Self {
        Self::UpstreamBody {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error.
    #[allow(clippy::match_same_arms)]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config { .. } => 500,
            Self::Server { .. } => 500,
            Self::InvalidAddress { .. } => 400,
            Self::Upstream { .. } => 500,
            Self::UpstreamBody { .. } => 502,
            Self::Io(_) => 500,
        }
    }

    /// Message returned to HTTP clients.
    ///
    /// Upstream failures collapse to a fixed message so upstream details
    /// never leak to the browser.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::InvalidAddress { .. } => "Invalid IP address",
            Self::Upstream { .. } => "Failed to fetch IP data",
            Self::UpstreamBody { .. } => "Invalid response from IP data provider",
            _ => "Internal server error",
        }
    }

    /// Get the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Server { .. } => "server",
            Self::InvalidAddress { .. } => "validation",
            Self::Upstream { .. } => "upstream",
            Self::UpstreamBody { .. } => "upstream_body",
            Self::Io(_) => "io",
        }
    }
}

/// Result type for host operations.
pub type HostResult<T> = Result<T, HostError>;

/// JSON error body, e.g. `{"error":"Failed to fetch IP data"}`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
}

impl ErrorBody {
    /// Create a new error body.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

impl From<&HostError> for ErrorBody {
    fn from(err: &HostError) -> Self {
        Self::new(err.public_message())
    }
}
