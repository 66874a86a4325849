//! Error types for shardlocate

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Selection Errors ===
    #[error("Didn't get any collection's state from the coordination service")]
    UnavailableState,

    #[error("Didn't get '{0}' collection state from the coordination service")]
    UnknownCollection(String),

    #[error("No appropriate node was selected to perform the operation on collection {collection} and leader = {leader}")]
    NoReplicaAvailable { collection: String, leader: bool },

    #[error("Operations factory returned nothing for {0}")]
    OperationsUnavailable(String),

    // === Coordination Errors ===
    #[error("Fetch of {path} failed: {reason}")]
    Fetch { path: String, reason: String },

    #[error("Session error: {0}")]
    Session(String),

    #[error("Provider disposed")]
    Disposed,

    // === State Document Errors ===
    #[error("Malformed state document: {0}")]
    Parse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Is this a retryable error?
    ///
    /// Selection failures are final for the current snapshot; callers may
    /// retry them after the next refresh publishes new membership.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Fetch { .. }
                | Error::Session(_)
                | Error::UnavailableState
                | Error::NoReplicaAvailable { .. }
        )
    }

    /// Collection name this error refers to, if any
    pub fn collection(&self) -> Option<&str> {
        match self {
            Error::UnknownCollection(name) => Some(name),
            Error::NoReplicaAvailable { collection, .. } => Some(collection),
            _ => None,
        }
    }
}

// Implement From for common error types
impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
