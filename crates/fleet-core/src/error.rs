//! Error types shared across the fleet core

use crate::models::{EntityIdentity, EntityKind};
use thiserror::Error;

/// Errors raised while talking to the inventory store, the live API
/// or the command backend.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The request never produced a response
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The backend answered with a non-success status
    #[error("{url} returned {status}: {body}")]
    Status { url: String, status: u16, body: String },

    /// The response body did not match the expected shape
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    /// The configured endpoint could not be turned into a request URL
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The source reported itself unavailable
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// Reasons a command is refused, either locally or by the backend
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{command} is not supported for {kind}")]
    Unsupported { command: &'static str, kind: EntityKind },

    #[error("{command} on {identity} is refused: namespace is protected")]
    ProtectedNamespace {
        command: &'static str,
        identity: EntityIdentity,
    },

    #[error("malformed identity {0}: namespace does not match the kind's scope")]
    InvalidIdentity(EntityIdentity),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("backend rejected {command} on {identity}: {source}")]
    Rejected {
        command: &'static str,
        identity: EntityIdentity,
        #[source]
        source: SourceError,
    },
}

impl DispatchError {
    /// True for errors detected before any backend call was issued
    pub fn is_validation(&self) -> bool {
        !matches!(self, DispatchError::Rejected { .. })
    }
}
