//! Client metrics
//!
//! Counters recorded through the `metrics` facade:
//!
//! - `docflow_client_requests_total` (counter): labels `method`, `outcome`
//! - `docflow_client_retries_total` (counter): label `method`
//! - `docflow_client_refreshes_total` (counter): label `outcome`
//!
//! The embedding application decides whether to install a recorder; without
//! one these calls are no-ops.

/// Record a completed request with its method and outcome kind
/// ("ok" or an error kind label).
pub fn record_request(method: &str, outcome: &str) {
    metrics::counter!(
        "docflow_client_requests_total",
        "method" => method.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record one retry of a transient failure.
pub fn record_retry(method: &str) {
    metrics::counter!(
        "docflow_client_retries_total",
        "method" => method.to_string()
    )
    .increment(1);
}

/// Record a refresh attempt outcome ("success" or "failure").
pub fn record_refresh(outcome: &str) {
    metrics::counter!(
        "docflow_client_refreshes_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}
