//! Request error taxonomy
//!
//! One uniform error type flows through transport, classification, retry,
//! and the refresh coordinator. Variants are `Clone` because a refresh
//! outcome is broadcast to every request waiting on it.

use thiserror::Error;

/// Errors surfaced to callers of the client.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Request exceeded its deadline before the exchange resolved.
    #[error("request timed out: {url}")]
    Timeout { url: String },

    /// Transport-level failure (DNS, connect, broken stream).
    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },

    /// HTTP 401 — the access token is missing, expired, or revoked.
    #[error("unauthorized for {url}: {message}")]
    Unauthorized { url: String, message: String },

    /// Non-2xx HTTP status, or a failing envelope code inside a 2xx body.
    #[error("request to {url} failed: {message}")]
    Business {
        url: String,
        status: Option<u16>,
        code: Option<i64>,
        message: String,
    },

    /// Caller aborted the request.
    #[error("request cancelled: {url}")]
    Cancelled { url: String },

    /// Response body did not decode as the expected shape.
    #[error("invalid response from {url}: {message}")]
    Parse { url: String, message: String },

    /// Token refresh failed or was exhausted; the session is gone.
    #[error("session expired: {message}")]
    SessionExpired { message: String },
}

impl Error {
    /// HTTP status associated with the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Unauthorized { .. } => Some(401),
            Error::Business { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether the generic retry loop may re-attempt this error. Auth
    /// errors route through the refresh coordinator instead; cancellation
    /// and parse failures propagate immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout { .. } | Error::Network { .. } | Error::Business { .. }
        )
    }

    /// Whether this is the 401 class that triggers a refresh.
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Unauthorized { .. })
    }

    /// Short kind label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Timeout { .. } => "timeout",
            Error::Network { .. } => "network",
            Error::Unauthorized { .. } => "unauthorized",
            Error::Business { .. } => "business",
            Error::Cancelled { .. } => "cancelled",
            Error::Parse { .. } => "parse",
            Error::SessionExpired { .. } => "session_expired",
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn business(status: Option<u16>) -> Error {
        Error::Business {
            url: "http://api/docs".into(),
            status,
            code: None,
            message: "failed".into(),
        }
    }

    #[test]
    fn status_reflects_variant() {
        assert_eq!(
            Error::Unauthorized {
                url: "u".into(),
                message: "m".into()
            }
            .status(),
            Some(401)
        );
        assert_eq!(business(Some(503)).status(), Some(503));
        assert_eq!(business(None).status(), None);
        assert_eq!(Error::Timeout { url: "u".into() }.status(), None);
    }

    #[test]
    fn retry_eligibility_matrix() {
        assert!(Error::Timeout { url: "u".into() }.is_retryable());
        assert!(
            Error::Network {
                url: "u".into(),
                message: "m".into()
            }
            .is_retryable()
        );
        assert!(business(Some(500)).is_retryable());

        // Auth goes to the coordinator, never the generic loop
        assert!(
            !Error::Unauthorized {
                url: "u".into(),
                message: "m".into()
            }
            .is_retryable()
        );
        assert!(!Error::Cancelled { url: "u".into() }.is_retryable());
        assert!(
            !Error::Parse {
                url: "u".into(),
                message: "m".into()
            }
            .is_retryable()
        );
        assert!(
            !Error::SessionExpired {
                message: "m".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn display_carries_url() {
        let err = Error::Timeout {
            url: "http://api/docs".into(),
        };
        assert!(err.to_string().contains("http://api/docs"));
    }

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(Error::Cancelled { url: "u".into() }.kind(), "cancelled");
        assert_eq!(
            Error::SessionExpired {
                message: "m".into()
            }
            .kind(),
            "session_expired"
        );
    }
}
