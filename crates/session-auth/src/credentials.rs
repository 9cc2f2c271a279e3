//! Session credentials and their persisted form
//!
//! `SessionStore` maps `Credentials` onto the fixed storage keys in
//! `constants`. It is the only code that knows the key names; everything
//! above it deals in `Credentials`.

use std::sync::Arc;

use common::Secret;
use tracing::{debug, info, warn};

use crate::constants::{
    ACCESS_TOKEN_KEY, IS_AUTHENTICATED_KEY, REFRESH_TOKEN_KEY, SESSION_KEYS, TOKEN_EXPIRY_KEY,
    USER_KEY,
};
use crate::error::{Error, Result};
use crate::storage::KeyValueStore;
use crate::token::{TokenResponse, expiry_from_jwt};

/// A signed-in session's tokens.
///
/// `expires_at` is a unix timestamp in milliseconds (absolute). `None` means
/// the backend never told us, in which case expiry is only discovered by a
/// 401.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access: Secret<String>,
    pub refresh: Secret<String>,
    pub expires_at: Option<u64>,
}

impl Credentials {
    /// Build credentials from a sign-in or refresh response.
    ///
    /// `previous_refresh` is kept when the backend doesn't rotate the
    /// refresh token. Expiry comes from `expires_in` when present, otherwise
    /// from the access token's JWT `exp` claim.
    pub fn from_token_response(
        response: TokenResponse,
        previous_refresh: Option<&Secret<String>>,
        now_millis: u64,
    ) -> Result<Self> {
        let TokenResponse {
            access_token,
            refresh_token,
            expires_in,
        } = response;

        if access_token.is_empty() {
            return Err(Error::InvalidResponse("empty access token".into()));
        }

        let refresh = match (refresh_token, previous_refresh) {
            (Some(new), _) if !new.is_empty() => Secret::new(new),
            (_, Some(previous)) => previous.clone(),
            _ => {
                return Err(Error::InvalidResponse(
                    "token response has no refresh token".into(),
                ));
            }
        };

        let expires_at = expires_in
            .map(|secs| now_millis.saturating_add(secs.saturating_mul(1000)))
            .or_else(|| expiry_from_jwt(&access_token));

        Ok(Self {
            access: Secret::new(access_token),
            refresh,
            expires_at,
        })
    }

    /// Whether the access token expires within `skew_millis` of `now_millis`.
    /// Unknown expiry is never considered expiring.
    pub fn expires_within(&self, now_millis: u64, skew_millis: u64) -> bool {
        self.expires_at
            .is_some_and(|at| at <= now_millis.saturating_add(skew_millis))
    }
}

/// Typed view over a `KeyValueStore` holding one session.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Load persisted credentials.
    ///
    /// Returns `None` unless both tokens and the authenticated flag are
    /// present. A half-written session (e.g. a crash between two older
    /// non-atomic writes) is treated as signed out.
    pub async fn load(&self) -> Result<Option<Credentials>> {
        let flag = self.backend.get(IS_AUTHENTICATED_KEY).await?;
        if flag.as_deref() != Some("true") {
            return Ok(None);
        }

        let access = self.backend.get(ACCESS_TOKEN_KEY).await?;
        let refresh = self.backend.get(REFRESH_TOKEN_KEY).await?;
        let (Some(access), Some(refresh)) = (access, refresh) else {
            warn!("session marked authenticated but tokens are missing, ignoring");
            return Ok(None);
        };

        let expires_at = match self.backend.get(TOKEN_EXPIRY_KEY).await? {
            Some(raw) => match raw.parse::<u64>() {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(error = %e, "unparseable token expiry in storage, treating as unknown");
                    None
                }
            },
            None => None,
        };

        info!(has_expiry = expires_at.is_some(), "restored session credentials");
        Ok(Some(Credentials {
            access: Secret::new(access),
            refresh: Secret::new(refresh),
            expires_at,
        }))
    }

    /// Persist credentials and mark the session authenticated.
    pub async fn save(&self, credentials: &Credentials) -> Result<()> {
        let mut entries = vec![
            (
                ACCESS_TOKEN_KEY.to_string(),
                credentials.access.expose().clone(),
            ),
            (
                REFRESH_TOKEN_KEY.to_string(),
                credentials.refresh.expose().clone(),
            ),
            (IS_AUTHENTICATED_KEY.to_string(), "true".to_string()),
        ];
        if let Some(at) = credentials.expires_at {
            entries.push((TOKEN_EXPIRY_KEY.to_string(), at.to_string()));
        }
        self.backend.put(entries).await?;
        if credentials.expires_at.is_none() {
            self.backend.remove(&[TOKEN_EXPIRY_KEY]).await?;
        }
        debug!("saved session credentials");
        Ok(())
    }

    /// Cache the signed-in user's profile alongside the tokens.
    pub async fn save_user(&self, user: &serde_json::Value) -> Result<()> {
        let json = serde_json::to_string(user)
            .map_err(|e| Error::Storage(format!("serializing user: {e}")))?;
        self.backend.put(vec![(USER_KEY.to_string(), json)]).await
    }

    /// The cached user profile, if any.
    pub async fn user(&self) -> Result<Option<serde_json::Value>> {
        match self.backend.get(USER_KEY).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| Error::Storage(format!("parsing cached user: {e}"))),
            None => Ok(None),
        }
    }

    /// Forget the cached user profile, leaving the tokens alone.
    pub async fn clear_user(&self) -> Result<()> {
        self.backend.remove(&[USER_KEY]).await
    }

    pub async fn is_authenticated(&self) -> Result<bool> {
        Ok(self.backend.get(IS_AUTHENTICATED_KEY).await?.as_deref() == Some("true"))
    }

    /// Remove every session key.
    pub async fn clear(&self) -> Result<()> {
        self.backend.remove(SESSION_KEYS).await?;
        info!("cleared session storage");
        Ok(())
    }
}

/// Current wall-clock time as unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStore, MemoryStore};

    fn response(access: &str, refresh: Option<&str>, expires_in: Option<u64>) -> TokenResponse {
        TokenResponse {
            access_token: access.into(),
            refresh_token: refresh.map(Into::into),
            expires_in,
        }
    }

    fn credentials(access: &str, refresh: &str, expires_at: Option<u64>) -> Credentials {
        Credentials {
            access: Secret::from(access),
            refresh: Secret::from(refresh),
            expires_at,
        }
    }

    #[test]
    fn from_response_computes_absolute_expiry() {
        let creds =
            Credentials::from_token_response(response("A2", Some("R2"), Some(300)), None, 1_000)
                .unwrap();
        assert_eq!(creds.access.expose(), "A2");
        assert_eq!(creds.refresh.expose(), "R2");
        assert_eq!(creds.expires_at, Some(301_000));
    }

    #[test]
    fn from_response_keeps_previous_refresh_token() {
        let previous = Secret::from("R1");
        let creds =
            Credentials::from_token_response(response("A2", None, None), Some(&previous), 0)
                .unwrap();
        assert_eq!(creds.refresh.expose(), "R1");
        assert_eq!(creds.expires_at, None, "opaque token has no exp claim");
    }

    #[test]
    fn from_response_without_any_refresh_token_errors() {
        let result = Credentials::from_token_response(response("A1", None, None), None, 0);
        assert!(matches!(result, Err(Error::InvalidResponse(_))));
    }

    #[test]
    fn from_response_rejects_empty_access_token() {
        let result = Credentials::from_token_response(response("", Some("R1"), None), None, 0);
        assert!(result.is_err());
    }

    #[test]
    fn expires_within_respects_skew_and_unknown_expiry() {
        let creds = credentials("A1", "R1", Some(10_000));
        assert!(!creds.expires_within(0, 5_000));
        assert!(creds.expires_within(6_000, 5_000));
        assert!(creds.expires_within(20_000, 0));
        assert!(!credentials("A1", "R1", None).expires_within(u64::MAX, 0));
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        store
            .save(&credentials("A1", "R1", Some(1_735_500_000_000)))
            .await
            .unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.access.expose(), "A1");
        assert_eq!(loaded.refresh.expose(), "R1");
        assert_eq!(loaded.expires_at, Some(1_735_500_000_000));
        assert!(store.is_authenticated().await.unwrap());
    }

    #[tokio::test]
    async fn save_without_expiry_drops_stale_expiry() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        store.save(&credentials("A1", "R1", Some(5))).await.unwrap();
        store.save(&credentials("A2", "R2", None)).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.expires_at, None);
    }

    #[tokio::test]
    async fn load_requires_authenticated_flag() {
        let backend = Arc::new(MemoryStore::new());
        backend
            .put(vec![
                (ACCESS_TOKEN_KEY.into(), "A1".into()),
                (REFRESH_TOKEN_KEY.into(), "R1".into()),
            ])
            .await
            .unwrap();
        let store = SessionStore::new(backend);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_removes_every_key() {
        let backend = Arc::new(MemoryStore::new());
        let store = SessionStore::new(backend.clone());
        store.save(&credentials("A1", "R1", Some(1))).await.unwrap();
        store
            .save_user(&serde_json::json!({"email": "ada@example.com"}))
            .await
            .unwrap();

        store.clear().await.unwrap();
        assert!(backend.snapshot().await.is_empty());
        assert!(store.load().await.unwrap().is_none());
        assert!(store.user().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_user_keeps_tokens() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        store.save(&credentials("A1", "R1", None)).await.unwrap();
        store.save_user(&serde_json::json!({"id": 7})).await.unwrap();

        store.clear_user().await.unwrap();
        assert!(store.user().await.unwrap().is_none());
        assert_eq!(store.load().await.unwrap().unwrap().access.expose(), "A1");
    }

    #[tokio::test]
    async fn user_round_trips_through_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileStore::open(dir.path().join("session.json"))
            .await
            .unwrap();
        let store = SessionStore::new(Arc::new(backend));
        store
            .save_user(&serde_json::json!({"id": 7, "first_name": "Ada"}))
            .await
            .unwrap();

        let user = store.user().await.unwrap().unwrap();
        assert_eq!(user["first_name"], "Ada");
    }

    #[test]
    fn debug_output_never_contains_tokens() {
        let debug = format!("{:?}", credentials("A1-secret", "R1-secret", None));
        assert!(!debug.contains("A1-secret"));
        assert!(!debug.contains("R1-secret"));
    }
}
