//! Client-side metrics
//!
//! Emitted through the `metrics` facade; nothing is recorded unless the host
//! installs a recorder.
//!
//! - `api_client_requests_total` (counter): labels `method`, `status`
//! - `api_client_token_refresh_total` (counter): label `outcome`
//! - `api_client_parked_requests_total` (counter)

/// Record one request attempt and the status it came back with.
pub fn record_request(method: &str, status: u16) {
    metrics::counter!(
        "api_client_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a settled refresh: `success`, `rejected`, `error` or `discarded`.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("api_client_token_refresh_total", "outcome" => outcome).increment(1);
}

/// Record a request parked behind an in-flight refresh.
pub fn record_parked() {
    metrics::counter!("api_client_parked_requests_total").increment(1);
}
