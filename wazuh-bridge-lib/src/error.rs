//! Error types for the Wazuh API bridge
//!
//! Provides a unified error type that covers all failure modes across
//! the document store, upstream client, request proxy and provisioning.

use thiserror::Error;

/// Result type alias using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Comprehensive error type for all bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Document store unreachable or returned an unexpected answer
    #[error("Store error: {0}")]
    Store(String),

    /// Document already exists (create semantics)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Document or resource missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Upstream unreachable, TLS failure, connect timeout
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input/request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provisioning step failures
    #[error("Provisioning error: {0}")]
    Provision(String),
}

impl BridgeError {
    /// Create a store error with context
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a conflict error with context
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a not found error with context
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a transport error with context
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a config error with context
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error with context
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a provisioning error with context
    pub fn provision(msg: impl Into<String>) -> Self {
        Self::Provision(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Numeric `error` codes carried by HTTP error envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Body could not be parsed as JSON
    MalformedBody = 0,
    CredentialsMissing = 1,
    StoreUnavailable = 2,
    MissingMethod = 3,
    MissingPath = 4,
    RequestFailed = 5,
    UpstreamError = 6,
    MissingSettings = 7,
    SaveFailed = 8,
}

impl ErrorCode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(e: reqwest::Error) -> Self {
        BridgeError::Transport(e.to_string())
    }
}
