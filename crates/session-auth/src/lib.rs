//! Session credentials for the careerdesk backend
//!
//! Owns everything about a signed-in session that is not HTTP request
//! plumbing: which backend paths are public, where credentials are persisted,
//! how a token response becomes stored credentials, and the refresh call
//! itself. The request-level client lives in `api-client`.
//!
//! Credential lifecycle:
//! 1. Sign-in response converted via `Credentials::from_token_response()`
//! 2. Persisted with `SessionStore::save()` (plus `save_user()`)
//! 3. On 401, `token::refresh_token()` exchanges the refresh token
//! 4. New credentials replace the old ones via `SessionStore::save()`
//! 5. Sign-out or a failed refresh wipes every key with `SessionStore::clear()`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod storage;
pub mod token;

pub use constants::*;
pub use credentials::{Credentials, SessionStore, now_millis};
pub use error::{Error, Result};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StoreFuture};
pub use token::{TokenResponse, expiry_from_jwt, refresh_token};
