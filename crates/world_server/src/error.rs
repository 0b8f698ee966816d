//! Error types and handling for the world server.
//!
//! This module defines the error types that can occur during server operations,
//! providing clear categorization of different failure modes.

/// Enumeration of possible server errors.
///
/// Categorizes errors into network-related and internal server errors to
/// help with debugging and error handling. Bus connectivity problems are
/// deliberately not represented here: they are reported through the bus
/// adapter's own error type, logged, and ridden out.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Network-related errors such as binding failures or connection issues
    #[error("Network error: {0}")]
    Network(String),

    /// Internal server errors including malformed envelopes and record
    /// store failures
    #[error("Internal error: {0}")]
    Internal(String),
}
