//! Request orchestration
//!
//! `Client` composes the transport, classifier, retry policy, and refresh
//! coordinator into the public request surface. Every failure resolves to
//! the uniform `Error` — callers never see a panic or a raw transport error.
//! A 401 routes through the single-flight refresh coordinator and the
//! request replays exactly once with the new token; transient failures use
//! the bounded fixed-delay retry loop.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use docflow_auth::CredentialStore;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::classify::{Classification, SuccessCodes, classify};
use crate::error::{Error, Result};
use crate::handlers::EventHandlers;
use crate::metrics;
use crate::refresh::{DEFAULT_MAX_REFRESH_ATTEMPTS, RefreshCoordinator};
use crate::retry::RetryPolicy;
use crate::transport;

/// Per-request options.
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// Query-string pairs appended to the URL.
    pub query: Vec<(String, String)>,
    /// Explicit bearer token; overrides the store and opts out of refresh.
    pub token: Option<String>,
    /// Per-request timeout override.
    pub timeout: Option<Duration>,
    /// Per-request retry-count override.
    pub retries: Option<u32>,
    /// Abort handle; cancelling surfaces `Error::Cancelled`.
    pub cancel: Option<CancellationToken>,
}

/// Request body, rebuildable for every attempt.
enum Payload {
    None,
    Json(Value),
    Multipart(Arc<dyn Fn() -> reqwest::multipart::Form + Send + Sync>),
}

struct Prepared {
    method: Method,
    url: String,
    options: RequestOptions,
    payload: Payload,
}

/// Successful response payload before typed decoding.
enum Fetched {
    Json(Value),
    Raw(Bytes),
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    base_url: String,
    timeout: Duration,
    retry: RetryPolicy,
    success: SuccessCodes,
    handlers: EventHandlers,
    max_refresh_attempts: u32,
    http: Option<reqwest::Client>,
}

impl ClientBuilder {
    fn new(base_url: String) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            success: SuccessCodes::default(),
            handlers: EventHandlers::default(),
            max_refresh_attempts: DEFAULT_MAX_REFRESH_ATTEMPTS,
            http: None,
        }
    }

    /// Default per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry policy for transient failures.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Envelope codes accepted as success besides the 2xx range.
    pub fn success_sentinels(mut self, sentinels: Vec<i64>) -> Self {
        self.success = SuccessCodes::with_sentinels(sentinels);
        self
    }

    /// Error-event callbacks.
    pub fn handlers(mut self, handlers: EventHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    /// Bound on consecutive refresh attempts without a success.
    pub fn max_refresh_attempts(mut self, max: u32) -> Self {
        self.max_refresh_attempts = max;
        self
    }

    /// Bring-your-own reqwest client (proxies, TLS settings).
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Build the client over the given credential store.
    pub fn build(self, store: Arc<CredentialStore>) -> Client {
        let http = self.http.unwrap_or_default();
        let handlers = Arc::new(self.handlers);
        let refresh = Arc::new(RefreshCoordinator::new(
            http.clone(),
            self.base_url.clone(),
            store.clone(),
            handlers.clone(),
            self.max_refresh_attempts,
        ));
        Client {
            http,
            base_url: self.base_url,
            timeout: self.timeout,
            retry: self.retry,
            success: self.success,
            handlers,
            store,
            refresh,
        }
    }
}

/// Authenticated DocFlow API client.
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    retry: RetryPolicy,
    success: SuccessCodes,
    handlers: Arc<EventHandlers>,
    store: Arc<CredentialStore>,
    refresh: Arc<RefreshCoordinator>,
}

impl Client {
    /// Start building a client for the given API base URL.
    pub fn builder(base_url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(base_url.into())
    }

    /// GET a JSON endpoint.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> Result<T> {
        self.request_json(Method::GET, path, Payload::None, options)
            .await
    }

    /// DELETE a JSON endpoint.
    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T> {
        self.request_json(Method::DELETE, path, Payload::None, options)
            .await
    }

    /// POST a JSON body.
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
        options: RequestOptions,
    ) -> Result<T> {
        self.request_json(Method::POST, path, Payload::Json(body), options)
            .await
    }

    /// PUT a JSON body.
    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
        options: RequestOptions,
    ) -> Result<T> {
        self.request_json(Method::PUT, path, Payload::Json(body), options)
            .await
    }

    /// PATCH a JSON body.
    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
        options: RequestOptions,
    ) -> Result<T> {
        self.request_json(Method::PATCH, path, Payload::Json(body), options)
            .await
    }

    /// POST a multipart form (uploads). The closure rebuilds the form for
    /// every attempt, since multipart bodies are consumed on send.
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: impl Fn() -> reqwest::multipart::Form + Send + Sync + 'static,
        options: RequestOptions,
    ) -> Result<T> {
        self.request_json(Method::POST, path, Payload::Multipart(Arc::new(form)), options)
            .await
    }

    /// GET a raw body (binary downloads, exports). JSON responses are
    /// returned re-serialized.
    pub async fn get_bytes(&self, path: &str, options: RequestOptions) -> Result<Bytes> {
        let url = self.url_for(path);
        let prepared = Prepared {
            method: Method::GET,
            url: url.clone(),
            options,
            payload: Payload::None,
        };
        match self.dispatch(prepared).await? {
            Fetched::Raw(bytes) => Ok(bytes),
            Fetched::Json(value) => serde_json::to_vec(&value)
                .map(Bytes::from)
                .map_err(|e| Error::Parse {
                    url,
                    message: format!("re-encoding JSON body: {e}"),
                }),
        }
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        payload: Payload,
        options: RequestOptions,
    ) -> Result<T> {
        let url = self.url_for(path);
        let prepared = Prepared {
            method,
            url: url.clone(),
            options,
            payload,
        };
        match self.dispatch(prepared).await? {
            Fetched::Json(value) => serde_json::from_value(value).map_err(|e| Error::Parse {
                url,
                message: format!("decoding response data: {e}"),
            }),
            Fetched::Raw(_) => Err(Error::Parse {
                url,
                message: "expected a JSON response, got a raw body".into(),
            }),
        }
    }

    /// One request through retry, refresh, and handler dispatch.
    #[instrument(skip_all, fields(request_id = %Uuid::new_v4(), method = %prepared.method, url = %prepared.url))]
    async fn dispatch(&self, prepared: Prepared) -> Result<Fetched> {
        let result = match prepared.options.cancel.clone() {
            Some(token) if token.is_cancelled() => Err(Error::Cancelled {
                url: prepared.url.clone(),
            }),
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => Err(Error::Cancelled {
                        url: prepared.url.clone(),
                    }),
                    result = self.dispatch_inner(&prepared) => result,
                }
            }
            None => self.dispatch_inner(&prepared).await,
        };

        match &result {
            Ok(_) => metrics::record_request(prepared.method.as_str(), "ok"),
            Err(error) => {
                metrics::record_request(prepared.method.as_str(), error.kind());
                self.handlers.dispatch(error);
            }
        }
        result
    }

    async fn dispatch_inner(&self, prepared: &Prepared) -> Result<Fetched> {
        let policy = self.retry.with_retries(prepared.options.retries);
        let mut attempted = 0u32;
        let mut used_token: Option<String> = None;

        let outcome = loop {
            let token = match &prepared.options.token {
                Some(explicit) => Some(explicit.clone()),
                // Read fresh each attempt: a refresh may have landed meanwhile
                None => self.store.access_token().await,
            };
            used_token = token.clone();

            match self.attempt(prepared, token.as_deref()).await {
                Ok(fetched) => break Ok(fetched),
                Err(error) if policy.should_retry(&error, attempted) => {
                    attempted += 1;
                    warn!(
                        attempt = attempted,
                        error = %error,
                        "transient failure, retrying"
                    );
                    metrics::record_retry(prepared.method.as_str());
                    tokio::time::sleep(policy.delay).await;
                }
                Err(error) => break Err(error),
            }
        };

        match outcome {
            Err(error) if error.is_auth() && prepared.options.token.is_none() => {
                debug!("unauthorized, routing through the refresh coordinator");
                let fresh = self
                    .refresh
                    .refresh_access_token(used_token.as_deref())
                    .await?;
                // Replay exactly once with the fresh token; a second 401 is
                // terminal rather than another refresh round.
                self.attempt(prepared, Some(&fresh)).await
            }
            other => other,
        }
    }

    /// One transport exchange plus classification.
    async fn attempt(&self, prepared: &Prepared, token: Option<&str>) -> Result<Fetched> {
        let timeout = prepared.options.timeout.unwrap_or(self.timeout);
        let mut request = self
            .http
            .request(prepared.method.clone(), &prepared.url)
            .timeout(timeout);

        if !prepared.options.query.is_empty() {
            request = request.query(&prepared.options.query);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request = match &prepared.payload {
            Payload::None => request,
            Payload::Json(body) => request.json(body),
            Payload::Multipart(form) => request.multipart(form()),
        };

        let raw = transport::send_buffered(request, &prepared.url).await?;
        match classify(
            &prepared.url,
            raw.status,
            raw.content_type.as_deref(),
            raw.body,
            &self.success,
        )? {
            Classification::Json(value) => Ok(Fetched::Json(value)),
            Classification::Raw(bytes) => Ok(Fetched::Raw(bytes)),
            Classification::Business {
                status,
                code,
                message,
            } => Err(Error::Business {
                url: prepared.url.clone(),
                status: Some(status),
                code,
                message,
            }),
            Classification::Auth { message } => Err(Error::Unauthorized {
                url: prepared.url.clone(),
                message,
            }),
        }
    }

    pub(crate) fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub(crate) fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn credential_store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub(crate) fn refresh_coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.refresh
    }

    pub(crate) fn success_codes(&self) -> &SuccessCodes {
        &self.success
    }
}
