//! Common error types for the connection proxy.
//!
//! This crate provides the error taxonomy shared by the db layer and the
//! proxy service: configuration problems, connect failures, and query
//! failures, plus a wire-safe `ErrorResponse` for transport consumers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Proxy-level errors.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection error: {0}")]
    Connect(#[from] ConnectError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),
}

/// Configuration errors.
///
/// Always raised before any network or file access is attempted.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),

    #[error("sqlite driver requires a database file path")]
    MissingSqlitePath,
}

/// Connection establishment errors.
///
/// A failed initial connect or forced re-establishment is fatal to the
/// owning worker; supervision is the host runtime's responsibility.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Connection failed: {0}")]
    Failed(String),

    #[error("Worker is no longer running")]
    WorkerGone,
}

/// Query execution errors.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Query failed: {0}")]
    Failed(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Retry after reconnect failed: {0}")]
    RetryFailed(String),
}

impl QueryError {
    /// True for the driver-identified "connection dropped mid-query"
    /// condition that a worker may recover from with a single reconnect.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, QueryError::ConnectionLost(_))
    }
}

/// Error response for transport clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Add details to the error response.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl From<&ProxyError> for ErrorResponse {
    fn from(err: &ProxyError) -> Self {
        let (code, message) = match err {
            ProxyError::Config(ConfigError::UnsupportedDriver(_)) => {
                ("CONFIG_UNSUPPORTED_DRIVER", "Unsupported database driver")
            }
            ProxyError::Config(ConfigError::MissingSqlitePath) => {
                ("CONFIG_MISSING_SQLITE_PATH", "Missing sqlite database path")
            }
            ProxyError::Connect(ConnectError::Failed(_)) => {
                ("DB_CONNECT_FAILED", "Database connection failed")
            }
            ProxyError::Connect(ConnectError::WorkerGone) => {
                ("WORKER_GONE", "Connection worker is no longer running")
            }
            ProxyError::Query(QueryError::Failed(_)) => {
                ("DB_QUERY_FAILED", "Database query failed")
            }
            ProxyError::Query(QueryError::ConnectionLost(_)) => {
                ("DB_CONNECTION_LOST", "Database connection lost")
            }
            ProxyError::Query(QueryError::RetryFailed(_)) => {
                ("DB_RETRY_FAILED", "Query retry after reconnect failed")
            }
        };
        Self::new(code, message).with_details(err.to_string())
    }
}

/// Result type alias using ProxyError.
pub type Result<T> = std::result::Result<T, ProxyError>;
