//! Error types for the common library.
//!
//! This module provides a unified error hierarchy using `thiserror` and the
//! mapping from that hierarchy onto JSON-RPC error objects.
//!
//! # Error Categories
//!
//! - `ConfigError`: Missing or invalid configuration
//! - `Error::InvalidParams`: Tool argument schema violations
//! - `Error::NotFound`: Unknown method or tool name
//! - `Error::UnsupportedDimensions`: Edit source whose size cannot be honoured
//! - `Error::Timeout`: Upstream call exceeded its deadline
//! - `Error::Upstream`: Upstream returned a non-success status
//! - `Error::Decode`: Upstream response (or image) could not be decoded
//! - `Error::Io`: File system operations on the primary path

use rmcp::ErrorData as McpError;
use rmcp::model::ErrorCode;
use serde_json::json;
use thiserror::Error;

/// Server-defined JSON-RPC error codes (the `-32000..-32099` range).
pub mod codes {
    /// The edit source image has dimensions that cannot be honoured.
    pub const UNSUPPORTED_DIMENSIONS: i32 = -32001;
    /// The upstream call exceeded its deadline.
    pub const TIMEOUT: i32 = -32002;
    /// The upstream API returned a non-success status.
    pub const UPSTREAM_ERROR: i32 = -32003;
    /// The upstream response could not be decoded.
    pub const DECODE_ERROR: i32 = -32004;
}

/// Unified error type for the common library.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors (missing env vars, invalid values)
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Tool arguments violate the declared schema
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Unknown method or tool
    #[error("{0}")]
    NotFound(String),

    /// Edit source dimensions cannot be mapped onto a supported canvas
    #[error("Unsupported image dimensions {width}x{height}: {reason}")]
    UnsupportedDimensions {
        /// Source width in pixels (0 when unknown)
        width: u32,
        /// Source height in pixels (0 when unknown)
        height: u32,
        /// Why the dimensions were rejected
        reason: String,
    },

    /// Operation timeout errors
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// Upstream API errors with endpoint and HTTP status context
    ///
    /// A `status_code` of 0 means no HTTP response was received.
    #[error("API error for {endpoint} (HTTP {status_code}): {message}")]
    Upstream {
        /// The API endpoint that was called
        endpoint: String,
        /// HTTP status code returned by the API
        status_code: u16,
        /// Response body or transport failure description
        message: String,
    },

    /// Upstream payload or image bytes could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// File system I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new invalid params error.
    ///
    /// # Example
    ///
    /// ```
    /// use azure_image_mcp_common::error::Error;
    ///
    /// let err = Error::invalid_params("prompt cannot be empty");
    /// assert!(err.to_string().contains("prompt cannot be empty"));
    /// ```
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Error::InvalidParams(message.into())
    }

    /// Create a new not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound(message.into())
    }

    /// Create a new unsupported dimensions error.
    pub fn unsupported_dimensions(width: u32, height: u32, reason: impl Into<String>) -> Self {
        Error::UnsupportedDimensions {
            width,
            height,
            reason: reason.into(),
        }
    }

    /// Create a new timeout error.
    ///
    /// # Example
    ///
    /// ```
    /// use azure_image_mcp_common::error::Error;
    ///
    /// let err = Error::timeout(300);
    /// assert!(err.to_string().contains("300 seconds"));
    /// ```
    pub fn timeout(seconds: u64) -> Self {
        Error::Timeout(seconds)
    }

    /// Create a new upstream error with endpoint, status code, and message.
    ///
    /// # Example
    ///
    /// ```
    /// use azure_image_mcp_common::error::Error;
    ///
    /// let err = Error::upstream(
    ///     "https://example.com/openai/deployments/d/images/generations",
    ///     500,
    ///     "Internal server error"
    /// );
    /// assert!(err.to_string().contains("example.com"));
    /// assert!(err.to_string().contains("500"));
    /// ```
    pub fn upstream(endpoint: impl Into<String>, status_code: u16, message: impl Into<String>) -> Self {
        Error::Upstream {
            endpoint: endpoint.into(),
            status_code,
            message: message.into(),
        }
    }

    /// Create a new decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Error::Decode(message.into())
    }

    /// The JSON-RPC error code this error is reported with.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidParams(_) => ErrorCode::INVALID_PARAMS,
            Error::NotFound(_) => ErrorCode::METHOD_NOT_FOUND,
            Error::UnsupportedDimensions { .. } => ErrorCode(codes::UNSUPPORTED_DIMENSIONS),
            Error::Timeout(_) => ErrorCode(codes::TIMEOUT),
            Error::Upstream { .. } => ErrorCode(codes::UPSTREAM_ERROR),
            Error::Decode(_) => ErrorCode(codes::DECODE_ERROR),
            Error::Config(_) | Error::Io(_) => ErrorCode::INTERNAL_ERROR,
        }
    }

    /// Convert into a JSON-RPC error object.
    ///
    /// Upstream failures carry the status and body in `data` for diagnostics.
    pub fn to_error_data(&self) -> McpError {
        let data = match self {
            Error::Upstream {
                status_code,
                message,
                ..
            } => Some(json!({ "status": status_code, "body": message })),
            Error::UnsupportedDimensions { width, height, .. } => {
                Some(json!({ "width": width, "height": height }))
            }
            Error::Timeout(seconds) => Some(json!({ "timeout_secs": seconds })),
            _ => None,
        };
        McpError::new(self.code(), self.to_string(), data)
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        err.to_error_data()
    }
}

/// Configuration errors.
///
/// These errors occur when loading or validating configuration from
/// environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set
    #[error("Required environment variable {0} is not set")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl ConfigError {
    /// Create a new missing environment variable error.
    pub fn missing_env_var(name: impl Into<String>) -> Self {
        ConfigError::MissingEnvVar(name.into())
    }

    /// Create a new invalid value error.
    pub fn invalid_value(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue(name.into(), reason.into())
    }
}

/// Result type alias using the unified Error type.
pub type Result<T> = std::result::Result<T, Error>;
