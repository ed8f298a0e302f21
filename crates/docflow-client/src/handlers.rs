//! Structured error-event handlers
//!
//! Callers register optional callbacks keyed by error kind instead of
//! probing every result at every call site. The client dispatches terminal
//! per-request errors here; the refresh coordinator fires
//! `on_session_expired` exactly once per failed refresh, which is where an
//! application hangs its sign-in redirect.

use std::fmt;
use std::sync::Arc;

use crate::error::Error;

/// Callback invoked with the error that triggered it.
pub type Handler = Arc<dyn Fn(&Error) + Send + Sync>;

/// Optional callbacks keyed by error kind.
#[derive(Clone, Default)]
pub struct EventHandlers {
    /// HTTP 401 that survived the refresh path.
    pub on_unauthorized: Option<Handler>,
    /// HTTP 403.
    pub on_forbidden: Option<Handler>,
    /// Refresh failed or was exhausted — the session is gone. Fired by the
    /// coordinator once per failure, not once per queued request.
    pub on_session_expired: Option<Handler>,
    /// Every terminal error, after any kind-specific handler.
    pub on_error: Option<Handler>,
}

impl EventHandlers {
    /// Dispatch a terminal request error to the matching handlers.
    pub fn dispatch(&self, error: &Error) {
        match error {
            Error::Unauthorized { .. } => {
                if let Some(handler) = &self.on_unauthorized {
                    handler(error);
                }
            }
            Error::Business {
                status: Some(403), ..
            } => {
                if let Some(handler) = &self.on_forbidden {
                    handler(error);
                }
            }
            _ => {}
        }
        if let Some(handler) = &self.on_error {
            handler(error);
        }
    }

    /// Fire the session-expired boundary. Coordinator-only: request paths
    /// go through `dispatch`.
    pub fn session_expired(&self, error: &Error) {
        if let Some(handler) = &self.on_session_expired {
            handler(error);
        }
    }
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_unauthorized", &self.on_unauthorized.is_some())
            .field("on_forbidden", &self.on_forbidden.is_some())
            .field("on_session_expired", &self.on_session_expired.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
