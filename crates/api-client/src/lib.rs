//! Authenticated HTTP client for the careerdesk backend
//!
//! Every backend call from the resume editor, job board and account screens
//! goes through `AuthenticatedHttpClient`. It attaches the bearer token to
//! non-public paths and, when the backend answers 401, runs a single-flight
//! refresh through `TokenManager`: the first request to fault starts the
//! refresh, every later one parks until it settles, and all of them replay
//! once with the same new token (or fail together).
//!
//! Request lifecycle:
//! 1. Public allow-list path → sent without a token, never refreshed
//! 2. Token known to be expiring → refreshed before sending
//! 3. 401 → `TokenManager::recover()` starts or joins the refresh
//! 4. Replay once with the new token; a second 401 ends the session
//! 5. Refresh failure → storage cleared, `Navigator` sent to the login view

pub mod account;
pub mod client;
pub mod endpoints;
pub mod error;
pub mod metrics;
pub mod navigation;
pub mod refresh;

#[cfg(test)]
mod testing;

pub use account::Registration;
pub use client::{ApiResponse, AuthenticatedHttpClient, ClientConfig, RequestOptions};
pub use endpoints::{Application, Job, JobQuery, Resume, UserProfile};
pub use error::{HttpError, RefreshFailure, Result};
pub use navigation::{LoggingNavigator, NavigationTarget, Navigator, RecordingNavigator};
pub use refresh::TokenManager;
