//! Account flows
//!
//! Sign-in and sign-out change the session owned by `TokenManager`; the
//! other flows are plain calls to public endpoints.

use common::Secret;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use session_auth::{
    Credentials, LOGOUT_PATH, PASSWORD_RESET_CONFIRM_PATH, PASSWORD_RESET_PATH, SIGN_IN_PATH,
    SIGN_UP_PATH, TokenResponse, VERIFY_EMAIL_PATH, now_millis,
};
use tracing::{info, instrument, warn};

use crate::client::{AuthenticatedHttpClient, Outgoing, RequestOptions};
use crate::endpoints::UserProfile;
use crate::error::{HttpError, Result};

/// New-account details for `sign_up`.
#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub password: Secret<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl Registration {
    fn to_body(&self) -> serde_json::Value {
        let mut body = json!({
            "email": self.email,
            "password": self.password.expose(),
        });
        if let Some(first) = &self.first_name {
            body["first_name"] = json!(first);
        }
        if let Some(last) = &self.last_name {
            body["last_name"] = json!(last);
        }
        body
    }
}

#[derive(Deserialize)]
struct SignInResponse {
    #[serde(flatten)]
    tokens: TokenResponse,
    #[serde(default)]
    user: Option<serde_json::Value>,
}

impl AuthenticatedHttpClient {
    /// Exchange email and password for a session.
    ///
    /// Replaces any current session. Wrong credentials come back as the
    /// backend's `Status` error, since the sign-in path never refreshes.
    #[instrument(skip_all)]
    pub async fn sign_in(&self, email: &str, password: &Secret<String>) -> Result<Option<UserProfile>> {
        let body = json!({ "email": email, "password": password.expose() });
        let response = self.post(SIGN_IN_PATH, &body).await?;
        let SignInResponse { tokens, user } = response.json()?;

        let credentials = Credentials::from_token_response(tokens, None, now_millis())?;
        self.tokens().establish(credentials).await?;

        let profile = match user {
            Some(user) => {
                self.tokens().store().save_user(&user).await?;
                match serde_json::from_value::<UserProfile>(user) {
                    Ok(profile) => Some(profile),
                    Err(e) => {
                        warn!(error = %e, "sign-in response user has unexpected shape");
                        None
                    }
                }
            }
            None => None,
        };

        info!(user_id = profile.as_ref().map(|p| p.id), "signed in");
        Ok(profile)
    }

    /// Create an account. Does not sign in.
    pub async fn sign_up(&self, registration: &Registration) -> Result<serde_json::Value> {
        self.post(SIGN_UP_PATH, &registration.to_body())
            .await?
            .json()
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        self.post(PASSWORD_RESET_PATH, &json!({ "email": email }))
            .await?;
        Ok(())
    }

    pub async fn confirm_password_reset(
        &self,
        uid: &str,
        token: &str,
        new_password: &Secret<String>,
    ) -> Result<()> {
        let body = json!({
            "uid": uid,
            "token": token,
            "new_password": new_password.expose(),
        });
        self.post(PASSWORD_RESET_CONFIRM_PATH, &body).await?;
        Ok(())
    }

    pub async fn verify_email(&self, key: &str) -> Result<()> {
        self.post(VERIFY_EMAIL_PATH, &json!({ "key": key })).await?;
        Ok(())
    }

    /// End the session.
    ///
    /// The backend is told to blacklist the refresh token, but local state
    /// is cleared whatever it answers. The logout call uses the current
    /// token once and never refreshes. Returns whether a session existed.
    #[instrument(skip_all)]
    pub async fn sign_out(&self) -> Result<bool> {
        if let Some(refresh) = self.tokens().refresh_token() {
            let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
            let body = json!({ "refresh": refresh.expose() });
            let options = RequestOptions::default();
            let outgoing = Outgoing {
                method: &Method::POST,
                path: LOGOUT_PATH,
                body: Some(&body),
                options: &options,
                request_id: &request_id,
            };
            let access = self.tokens().current_access();
            match self.send_once(&outgoing, access.as_ref(), 1).await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    warn!(status = response.status().as_u16(), "backend logout refused, clearing locally")
                }
                Err(e) => warn!(error = %e, "backend logout failed, clearing locally"),
            }
        }

        let had_session = self
            .tokens()
            .end_session()
            .await
            .map_err(HttpError::from)?;
        info!(had_session, "signed out");
        Ok(had_session)
    }
}
