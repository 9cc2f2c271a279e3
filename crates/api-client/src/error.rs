//! Error types for client operations

/// Why a refresh didn't produce a token.
///
/// Cloned into every parked request, so it carries messages rather than the
/// underlying (non-`Clone`) error values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshFailure {
    #[error("no session to refresh")]
    NoSession,

    #[error("refresh token rejected: {0}")]
    Rejected(String),

    #[error("token refresh failed: {0}")]
    Transport(String),

    #[error("session ended while the refresh was in flight")]
    SessionEnded,

    #[error("refresh task ended without a result")]
    Abandoned,
}

/// Errors surfaced to callers of the client.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// No response was received (connection refused, timeout, reset).
    #[error("network error: {0}")]
    Network(String),

    /// The session can't be recovered; the caller must sign in again.
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// Non-2xx response, passed through untouched.
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("session storage error: {0}")]
    Storage(String),
}

impl HttpError {
    /// HTTP status for pass-through errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, HttpError::SessionExpired(_))
    }
}

impl From<RefreshFailure> for HttpError {
    fn from(failure: RefreshFailure) -> Self {
        HttpError::SessionExpired(failure.to_string())
    }
}

impl From<session_auth::Error> for HttpError {
    fn from(err: session_auth::Error) -> Self {
        match err {
            session_auth::Error::Storage(msg) | session_auth::Error::Io(msg) => {
                HttpError::Storage(msg)
            }
            session_auth::Error::InvalidResponse(msg) => HttpError::Decode(msg),
            other => HttpError::SessionExpired(other.to_string()),
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, HttpError>;
