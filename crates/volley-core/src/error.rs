//! Error types for Volley operations

use thiserror::Error;

/// Result type alias for Volley operations
pub type Result<T> = std::result::Result<T, VolleyError>;

/// Errors that can occur in the load generator
#[derive(Error, Debug)]
pub enum VolleyError {
    // === Wire Protocol ===
    /// Response line is missing a delimiter or carries a non-numeric id
    #[error("malformed response: {0:?}")]
    MalformedResponse(String),

    /// Response id does not match any outstanding request
    #[error("response id {0} does not match any outstanding request")]
    UnknownId(u64),

    /// Response payload was not decodable text
    #[error("unexpected message payload")]
    UnexpectedPayload,

    // === Corpus ===
    /// Corpus file could not be read
    #[error("failed to read corpus {path}: {source}")]
    CorpusUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Corpus file contains no usable lines
    #[error("corpus {0} contains no usable lines")]
    CorpusEmpty(String),

    // === Configuration ===
    /// Configuration rejected at startup
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // === Transport ===
    /// Session establishment failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Session is no longer accepting frames
    #[error("session closed")]
    SessionClosed,
}

impl VolleyError {
    /// Whether this error faults a single connection rather than the whole
    /// process. Connection faults are isolated: the faulted connection stops,
    /// everything else keeps running.
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            Self::MalformedResponse(_) | Self::UnknownId(_) | Self::UnexpectedPayload
        )
    }
}
