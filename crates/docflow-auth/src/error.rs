//! Error types for session authentication operations

/// Errors from session authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("session refresh rejected: {0}")]
    RefreshRejected(String),

    #[error("session refresh failed: {0}")]
    RefreshFailed(String),

    #[error("invalid refresh response: {0}")]
    Envelope(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
