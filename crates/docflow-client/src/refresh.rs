//! Single-flight token refresh coordination
//!
//! At most one refresh is in flight per client. The first request to hit a
//! 401 becomes the leader: it calls the refresh endpoint, rotates the
//! credential store, and broadcasts the outcome. Requests that hit a 401
//! while that refresh is pending attach to the same outcome instead of
//! starting a second one, then resume with the new token.
//!
//! An attempt counter bounds consecutive refreshes: once the bound is
//! reached without a success, further refreshes are refused outright, so a
//! provider that keeps rejecting tokens cannot drive an endless refresh
//! loop. Refresh failure tears the session down: credentials are cleared
//! and the session-expired boundary fires exactly once.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use docflow_auth::{CredentialStore, Credentials};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::handlers::EventHandlers;
use crate::metrics;

/// Default bound on consecutive refresh attempts without a success.
pub const DEFAULT_MAX_REFRESH_ATTEMPTS: u32 = 2;

/// Outcome broadcast to every request waiting on a refresh: the new access
/// token, or the error that ended the session.
type Outcome = std::result::Result<String, Error>;

/// Single-slot in-flight holder plus the attempt counter.
struct RefreshState {
    /// Present while a refresh is pending; waiters clone the receiver.
    inflight: Option<watch::Receiver<Option<Outcome>>>,
    /// Consecutive attempts since the last success.
    attempts: u32,
}

enum Role {
    Leader(watch::Sender<Option<Outcome>>),
    Waiter(watch::Receiver<Option<Outcome>>),
}

/// Coordinates token refresh across all concurrent requests of one client.
pub struct RefreshCoordinator {
    http: reqwest::Client,
    base_url: String,
    store: Arc<CredentialStore>,
    handlers: Arc<EventHandlers>,
    max_attempts: u32,
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        store: Arc<CredentialStore>,
        handlers: Arc<EventHandlers>,
        max_attempts: u32,
    ) -> Self {
        Self {
            http,
            base_url,
            store,
            handlers,
            max_attempts,
            state: Mutex::new(RefreshState {
                inflight: None,
                attempts: 0,
            }),
        }
    }

    /// Obtain a fresh access token after a 401, joining an in-flight refresh
    /// when one is pending.
    ///
    /// `stale` is the access token the failed request used. When the store
    /// already holds a different token, a refresh settled since that request
    /// read its token — the current one is returned without another
    /// round-trip to the endpoint.
    pub async fn refresh_access_token(self: &Arc<Self>, stale: Option<&str>) -> Result<String> {
        let role = {
            let mut state = self.state.lock().await;
            if let Some(rx) = &state.inflight {
                Role::Waiter(rx.clone())
            } else if let Some(current) = self.rotated_since(stale).await {
                debug!("token already rotated by an earlier refresh, reusing it");
                return Ok(current);
            } else if state.attempts >= self.max_attempts {
                warn!(
                    attempts = state.attempts,
                    "refresh attempts exhausted, refusing to call the endpoint"
                );
                return Err(Error::Unauthorized {
                    url: self.refresh_url(),
                    message: "refresh attempts exhausted, please sign in again".into(),
                });
            } else if self.store.refresh_token().await.is_none() {
                debug!("no refresh token stored, refresh not attempted");
                return Err(Error::Unauthorized {
                    url: self.refresh_url(),
                    message: "no session to refresh, please sign in".into(),
                });
            } else {
                state.attempts += 1;
                let (tx, rx) = watch::channel(None);
                state.inflight = Some(rx);
                Role::Leader(tx)
            }
        };

        match role {
            Role::Waiter(mut rx) => {
                debug!("refresh already in flight, waiting for its outcome");
                let settled = match rx.wait_for(|slot| slot.is_some()).await {
                    Ok(slot) => Ok(slot.clone()),
                    Err(err) => Err(err),
                };
                match settled {
                    Ok(slot) => slot.unwrap_or_else(|| {
                        Err(Error::SessionExpired {
                            message: "refresh settled without an outcome".into(),
                        })
                    }),
                    Err(_) => {
                        // The leader task died before settling; free the
                        // slot so a later request can try again.
                        let mut state = self.state.lock().await;
                        if state
                            .inflight
                            .as_ref()
                            .is_some_and(|cur| cur.same_channel(&rx))
                        {
                            state.inflight = None;
                        }
                        Err(Error::SessionExpired {
                            message: "refresh abandoned before completion".into(),
                        })
                    }
                }
            }
            Role::Leader(tx) => {
                // Run the refresh on its own task so cancelling the request
                // that triggered it cannot strand the waiters.
                let coordinator = Arc::clone(self);
                let task = tokio::spawn(async move {
                    let outcome = coordinator.run_refresh().await;
                    {
                        let mut state = coordinator.state.lock().await;
                        state.inflight = None;
                        if outcome.is_ok() {
                            state.attempts = 0;
                        }
                    }
                    let _ = tx.send(Some(outcome.clone()));
                    outcome
                });
                match task.await {
                    Ok(outcome) => outcome,
                    Err(e) => Err(Error::SessionExpired {
                        message: format!("refresh task failed: {e}"),
                    }),
                }
            }
        }
    }

    /// Current store token when it differs from the one the failed request
    /// used — meaning a refresh already landed.
    async fn rotated_since(&self, stale: Option<&str>) -> Option<String> {
        let stale = stale?;
        self.store
            .access_token()
            .await
            .filter(|current| current != stale)
    }

    /// One refresh round-trip: endpoint call, store rotation on success,
    /// session teardown on failure.
    async fn run_refresh(&self) -> Outcome {
        let Some(refresh_token) = self.store.refresh_token().await else {
            return Err(Error::Unauthorized {
                url: self.refresh_url(),
                message: "no session to refresh, please sign in".into(),
            });
        };

        info!("refreshing session tokens");
        match docflow_auth::refresh_session(&self.http, &self.base_url, &refresh_token).await {
            Ok(tokens) => {
                let now = unix_millis();
                let credentials = Credentials {
                    access: tokens.token.clone(),
                    refresh: tokens.refresh_token,
                    access_expires: now + tokens.expires_in * 1000,
                    refresh_expires: now + tokens.refresh_expires_in * 1000,
                };
                if let Err(e) = self.store.save(credentials).await {
                    warn!(error = %e, "failed to persist refreshed credentials");
                }
                metrics::record_refresh("success");
                info!("session refresh succeeded");
                Ok(tokens.token)
            }
            Err(e) => {
                warn!(error = %e, "session refresh failed, clearing credentials");
                if let Err(clear_err) = self.store.clear().await {
                    warn!(error = %clear_err, "failed to clear credentials");
                }
                metrics::record_refresh("failure");
                let error = Error::SessionExpired {
                    message: format!("session refresh failed, please sign in again: {e}"),
                };
                self.handlers.session_expired(&error);
                Err(error)
            }
        }
    }

    fn refresh_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            docflow_auth::REFRESH_PATH
        )
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
