//! Authenticated DocFlow API client
//!
//! HTTP client for the DocFlow API with single-flight token refresh. A
//! request that hits a 401 triggers one refresh against the identity
//! endpoint; requests that hit a 401 while that refresh is pending attach to
//! it and replay with the new token once it lands. Transient failures retry
//! on a bounded fixed-delay policy; 2xx bodies carrying a failing envelope
//! code surface as business errors; streaming endpoints reconnect once after
//! a refresh.
//!
//! Request lifecycle:
//! 1. `Client::get/post/...` builds the request with the stored bearer token
//! 2. The transport sends it; the classifier maps the buffered response
//! 3. Transient failure → bounded retry with fixed delay
//! 4. 401 → single-flight refresh, then exactly one replay
//! 5. Refresh failure → credentials cleared, session-expired boundary fired

pub mod classify;
pub mod client;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod refresh;
pub mod retry;
pub mod sse;
mod transport;

pub use classify::{Classification, SuccessCodes, status_message};
pub use client::{Client, ClientBuilder, RequestOptions};
pub use error::{Error, Result};
pub use handlers::{EventHandlers, Handler};
pub use refresh::RefreshCoordinator;
pub use retry::RetryPolicy;
pub use sse::{SseEvent, SseHandle, SseParser};
