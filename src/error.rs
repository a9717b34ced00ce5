//! Error types for the media gateway

use std::io;

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for the media gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Media gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request carried no usable `Authorization: Bearer` header
    #[error("Missing or malformed Authorization header")]
    Unauthorized,

    /// The bearer token failed verification
    #[error("Invalid token: {0}")]
    InvalidToken(#[from] crate::auth::AuthError),

    /// The requested key does not exist in the store
    #[error("Object not found: {0}")]
    NotFound(String),

    /// An object store operation failed
    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    /// The index rewrite lost every conditional-write attempt
    #[error("Index update conflict after {0} attempts")]
    IndexConflict(u32),

    /// The index object exists but is not a valid track listing
    #[error("Index parse error: {0}")]
    IndexCorrupt(serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status this error maps to at the handler boundary.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized | Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the caller.
    ///
    /// Store and index faults keep their detail in the log only; the response
    /// body names the failed operation, never the underlying fault text.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Unauthorized",
            Self::InvalidToken(_) => "Invalid token",
            Self::NotFound(_) => "File not found",
            Self::IndexConflict(_) | Self::IndexCorrupt(_) => "Failed to update track index",
            _ => "Internal error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_401() {
        assert_eq!(Error::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::Unauthorized.public_message(), "Unauthorized");
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = Error::NotFound("song.mp3".to_string());
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.public_message(), "File not found");
    }

    #[test]
    fn store_faults_never_leak_detail() {
        let err = Error::Store(crate::store::StoreError::Backend(
            "connection reset by peer at 10.0.0.3:9000".to_string(),
        ));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.public_message().contains("10.0.0.3"));
    }
}
