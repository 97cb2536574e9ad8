//! Error types for the Sayna SDK.
//!
//! Every fallible SDK operation returns [`SaynaResult`]. Webhook verification
//! failures are always surfaced as [`SaynaError::Validation`] so that route
//! handlers can treat signature, timestamp, and schema problems uniformly.

/// Error type covering all Sayna SDK operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum SaynaError {
    /// Attempted to use the client before connecting
    #[error("Not connected to Sayna WebSocket")]
    NotConnected,

    /// Attempted an operation before the server signalled readiness
    #[error("Sayna voice providers are not ready. Wait for the connection to be established.")]
    NotReady,

    /// WebSocket connection failed or dropped
    #[error("Connection error: {0}")]
    Connection(String),

    /// Invalid parameters, malformed payloads, or failed webhook verification
    #[error("Validation error: {0}")]
    Validation(String),

    /// The server returned an error response
    #[error("Server error: {0}")]
    Server(String),
}

/// Result type alias for SDK operations
pub type SaynaResult<T> = Result<T, SaynaError>;
