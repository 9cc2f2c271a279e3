//! Authenticated request path
//!
//! Builds each request against the configured base URL, attaches the bearer
//! token for non-public paths, and applies the one-retry recovery rule on
//! 401. Responses are read fully into memory so a 401 can be discarded and
//! the request replayed with the same body.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use common::Secret;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use session_auth::{KeyValueStore, SessionStore, is_public_path};
use tracing::{debug, info, instrument, warn};

use crate::error::{HttpError, Result};
use crate::metrics::record_request;
use crate::navigation::Navigator;
use crate::refresh::TokenManager;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_REFRESH_SKEW: Duration = Duration::from_secs(30);
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend root, e.g. `https://api.careerdesk.example`
    pub base_url: String,
    /// Per-request timeout unless overridden in `RequestOptions`
    pub timeout: Duration,
    /// Refresh before sending when the token's known expiry is this close
    pub refresh_skew: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            refresh_skew: DEFAULT_REFRESH_SKEW,
        }
    }
}

/// Per-call extras: query parameters, headers, timeout override.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A fully-read backend response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ApiResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| HttpError::Decode(e.to_string()))
    }

    /// Non-2xx becomes `HttpError::Status` with the body untouched.
    fn into_result(self) -> Result<Self> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(HttpError::Status {
                status: self.status.as_u16(),
                body: self.text(),
            })
        }
    }
}

/// One logical request, replayable across attempts.
pub(crate) struct Outgoing<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub body: Option<&'a serde_json::Value>,
    pub options: &'a RequestOptions,
    pub request_id: &'a str,
}

/// HTTP client that owns the session tokens.
#[derive(Clone)]
pub struct AuthenticatedHttpClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    tokens: TokenManager,
}

impl AuthenticatedHttpClient {
    /// Build a client and restore any session persisted in `storage`.
    pub async fn new(
        config: ClientConfig,
        storage: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            return Err(HttpError::InvalidRequest(format!(
                "base_url must start with http:// or https://, got: {}",
                config.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| HttpError::InvalidRequest(format!("building HTTP client: {e}")))?;
        let base_url = config.base_url.trim_end_matches('/').to_string();

        let tokens = TokenManager::restore(
            SessionStore::new(storage),
            http.clone(),
            base_url.clone(),
            navigator,
            config.refresh_skew,
        )
        .await?;

        info!(base_url = %base_url, signed_in = tokens.has_session(), "api client ready");
        Ok(Self {
            http,
            base_url,
            timeout: config.timeout,
            tokens,
        })
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.request(Method::GET, path, None, &RequestOptions::default())
            .await
    }

    pub async fn post(&self, path: &str, body: &serde_json::Value) -> Result<ApiResponse> {
        self.request(Method::POST, path, Some(body), &RequestOptions::default())
            .await
    }

    pub async fn put(&self, path: &str, body: &serde_json::Value) -> Result<ApiResponse> {
        self.request(Method::PUT, path, Some(body), &RequestOptions::default())
            .await
    }

    pub async fn patch(&self, path: &str, body: &serde_json::Value) -> Result<ApiResponse> {
        self.request(Method::PATCH, path, Some(body), &RequestOptions::default())
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.request(Method::DELETE, path, None, &RequestOptions::default())
            .await
    }

    /// Send a request, recovering from one 401 via the refresh protocol.
    ///
    /// Public allow-list paths go out without a token and any 401 they get
    /// is returned as-is. For everything else a 401 starts (or joins) a
    /// refresh and the request is replayed exactly once with the new token.
    /// If the replay is rejected too and its token is still the current one,
    /// the session is ended. A replay token that another request has already
    /// refreshed past gets its 401 passed through instead.
    #[instrument(skip_all, fields(request_id = tracing::field::Empty, method = %method, path = %path))]
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        options: &RequestOptions,
    ) -> Result<ApiResponse> {
        if !path.starts_with('/') {
            return Err(HttpError::InvalidRequest(format!(
                "path must start with '/', got: {path}"
            )));
        }

        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        tracing::Span::current().record("request_id", request_id.as_str());

        let outgoing = Outgoing {
            method: &method,
            path,
            body,
            options,
            request_id: &request_id,
        };

        let authenticated = !is_public_path(path);
        let token = if authenticated {
            self.tokens.access_token().await?
        } else {
            None
        };

        let response = self.send_once(&outgoing, token.as_ref(), 1).await?;
        if !authenticated || response.status() != StatusCode::UNAUTHORIZED {
            return response.into_result();
        }

        debug!("access token rejected, recovering session");
        let fresh = self.tokens.recover(token.as_ref()).await?;

        let replay = self.send_once(&outgoing, Some(&fresh), 2).await?;
        if replay.status() == StatusCode::UNAUTHORIZED
            && self
                .tokens
                .expire(&fresh, "request rejected after token refresh")
                .await
        {
            return Err(HttpError::SessionExpired(
                "request rejected after token refresh".into(),
            ));
        }
        replay.into_result()
    }

    /// One attempt, no recovery. `Err` only when no response arrived or the
    /// request couldn't be built.
    pub(crate) async fn send_once(
        &self,
        outgoing: &Outgoing<'_>,
        token: Option<&Secret<String>>,
        attempt: u32,
    ) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, outgoing.path);
        let mut request = self
            .http
            .request(outgoing.method.clone(), &url)
            .timeout(outgoing.options.timeout.unwrap_or(self.timeout))
            .header(REQUEST_ID_HEADER, outgoing.request_id);

        if !outgoing.options.query.is_empty() {
            request = request.query(&outgoing.options.query);
        }

        for (name, value) in &outgoing.options.headers {
            if name.eq_ignore_ascii_case(AUTHORIZATION.as_str()) {
                warn!("ignoring caller-supplied authorization header");
                continue;
            }
            request = request.header(name.as_str(), value.as_str());
        }

        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
                .map_err(|_| HttpError::InvalidRequest("access token is not a valid header value".into()))?;
            value.set_sensitive(true);
            request = request.header(AUTHORIZATION, value);
        }

        if let Some(body) = outgoing.body {
            request = request.json(body);
        }

        let started = Instant::now();
        let response = request.send().await.map_err(|e| {
            if e.is_builder() {
                HttpError::InvalidRequest(e.to_string())
            } else {
                warn!(error = %e, attempt, "request failed without a response");
                HttpError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| HttpError::Network(format!("reading response body: {e}")))?;

        record_request(outgoing.method.as_str(), status.as_u16());
        debug!(
            status = status.as_u16(),
            attempt,
            authenticated = token.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "response received"
        );

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}
