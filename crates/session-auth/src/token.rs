//! Token endpoint interaction
//!
//! The refresh call goes straight through `reqwest` rather than the
//! authenticated client: it is the one request that must never itself enter
//! the refresh protocol.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::TOKEN_REFRESH_PATH;
use crate::error::{Error, Result};

/// Tokens returned by sign-in and refresh.
///
/// Accepts both `access_token`/`refresh_token` and the shorter
/// `access`/`refresh` field names. `expires_in` is a delta in seconds.
#[derive(Deserialize, Serialize)]
pub struct TokenResponse {
    #[serde(alias = "access")]
    pub access_token: String,
    #[serde(alias = "refresh", default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// Exchange a refresh token for a new access token.
///
/// 401/403 from the token endpoint means the refresh token is revoked or
/// expired and maps to `InvalidCredentials`. Anything else non-2xx is
/// `TokenRefresh`; no response at all is `Http`.
pub async fn refresh_token(
    client: &reqwest::Client,
    base_url: &str,
    refresh: &Secret<String>,
) -> Result<TokenResponse> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), TOKEN_REFRESH_PATH);
    debug!(url = %url, "requesting token refresh");

    let response = client
        .post(&url)
        .json(&RefreshRequest {
            refresh: refresh.expose(),
        })
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenRefresh(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::InvalidResponse(format!("invalid refresh response: {e}")))
}

#[derive(Deserialize)]
struct JwtClaims {
    exp: Option<u64>,
}

/// Read the `exp` claim (seconds) from a JWT access token and return it as
/// unix milliseconds. Opaque tokens and malformed JWTs yield `None`.
pub fn expiry_from_jwt(token: &str) -> Option<u64> {
    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: JwtClaims = serde_json::from_slice(&bytes).ok()?;
    claims.exp.map(|secs| secs.saturating_mul(1000))
}
