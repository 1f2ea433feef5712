//! Error types for prdgen
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for prdgen operations
///
/// This enum encompasses all possible errors that can occur during
/// configuration loading, relay endpoint operation, upstream calls,
/// and client-side stream consumption.
#[derive(Error, Debug)]
pub enum PrdgenError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Relay endpoint errors (request handling, response construction)
    #[error("Relay error: {0}")]
    Relay(String),

    /// Upstream workflow API errors (all candidate endpoints failed,
    /// unpublished workflow, bad credential)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Stream consumption errors (transport failure or decode failure
    /// while reading an SSE body)
    #[error("Stream error: {0}")]
    Stream(String),

    /// Session bookkeeping errors
    #[error("Session error: {0}")]
    Session(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for prdgen operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
