//! Single-flight token refresh
//!
//! `TokenManager` owns the in-memory session, the refresh-in-progress flag,
//! and the list of requests parked behind a refresh. All three sit behind
//! one std `Mutex` that is never held across an `.await`.
//!
//! The refresh itself runs in a spawned task. Every caller, including the
//! one that started it, parks on a oneshot channel and is woken in arrival
//! order with the same outcome. A caller that goes away mid-refresh does not
//! cancel the refresh for the others.
//!
//! Store writes (refresh results, sign-in, sign-out) are serialized by a
//! tokio `Mutex` and stamped with a session generation, so a refresh that
//! completes after a sign-out or a new sign-in is discarded instead of
//! resurrecting the old session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use common::Secret;
use session_auth::{Credentials, SessionStore, now_millis};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::error::RefreshFailure;
use crate::metrics::{record_parked, record_refresh};
use crate::navigation::{NavigationTarget, Navigator};

type RefreshOutcome = std::result::Result<Secret<String>, RefreshFailure>;

struct RefreshState {
    credentials: Option<Credentials>,
    refreshing: bool,
    generation: u64,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

struct Inner {
    state: Mutex<RefreshState>,
    writes: tokio::sync::Mutex<()>,
    store: SessionStore,
    http: reqwest::Client,
    base_url: String,
    navigator: Arc<dyn Navigator>,
    refresh_skew: Duration,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Step {
    Ready(Secret<String>),
    Parked(oneshot::Receiver<RefreshOutcome>),
}

/// Shared owner of the session tokens. Cheap to clone.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    /// Build a manager and load whatever session `store` already holds.
    pub async fn restore(
        store: SessionStore,
        http: reqwest::Client,
        base_url: String,
        navigator: Arc<dyn Navigator>,
        refresh_skew: Duration,
    ) -> session_auth::Result<Self> {
        let credentials = store.load().await?;
        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RefreshState {
                    credentials,
                    refreshing: false,
                    generation: 0,
                    waiters: Vec::new(),
                }),
                writes: tokio::sync::Mutex::new(()),
                store,
                http,
                base_url,
                navigator,
                refresh_skew,
            }),
        })
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub fn has_session(&self) -> bool {
        self.inner.lock().credentials.is_some()
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.lock().refreshing
    }

    /// Requests currently waiting on the in-flight refresh.
    pub fn parked(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    /// Current refresh token, for the logout call.
    pub fn refresh_token(&self) -> Option<Secret<String>> {
        self.inner
            .lock()
            .credentials
            .as_ref()
            .map(|c| c.refresh.clone())
    }

    /// Current access token as-is, without any refresh.
    pub fn current_access(&self) -> Option<Secret<String>> {
        self.inner
            .lock()
            .credentials
            .as_ref()
            .map(|c| c.access.clone())
    }

    /// Token to attach to an outgoing request.
    ///
    /// `None` when signed out. If the token's known expiry falls inside the
    /// refresh skew, or a refresh is already running, waits for the refreshed
    /// token instead of sending one that is about to be rejected.
    pub async fn access_token(&self) -> Result<Option<Secret<String>>, RefreshFailure> {
        let now = now_millis();
        let skew = self.inner.refresh_skew.as_millis() as u64;
        let step = match self.step(|current| current.expires_within(now, skew)) {
            Ok(step) => step,
            Err(RefreshFailure::NoSession) => return Ok(None),
            Err(e) => return Err(e),
        };
        settle(step).await.map(Some)
    }

    /// Recover from a 401 for a request sent with `rejected`.
    ///
    /// Starts a refresh, or joins the one in flight. If the session has
    /// already moved past `rejected` (an earlier refresh finished while this
    /// request was on the wire), the current token is returned without
    /// another refresh call.
    pub async fn recover(
        &self,
        rejected: Option<&Secret<String>>,
    ) -> Result<Secret<String>, RefreshFailure> {
        let step = self.step(|current| match rejected {
            Some(token) => current.access.matches(token.expose()),
            None => false,
        })?;
        settle(step).await
    }

    /// Decide under the lock whether to hand out the current token, start a
    /// refresh, or park behind the running one.
    fn step(&self, needs_refresh: impl FnOnce(&Credentials) -> bool) -> Result<Step, RefreshFailure> {
        let mut state = self.inner.lock();

        if state.refreshing {
            record_parked();
            debug!(parked = state.waiters.len() + 1, "refresh in flight, parking request");
        } else {
            let Some(current) = state.credentials.as_ref() else {
                return Err(RefreshFailure::NoSession);
            };
            if !needs_refresh(current) {
                return Ok(Step::Ready(current.access.clone()));
            }
            let refresh = current.refresh.clone();
            let generation = state.generation;
            state.refreshing = true;
            info!("starting token refresh");
            tokio::spawn(run_refresh(self.inner.clone(), refresh, generation));
        }

        let (tx, rx) = oneshot::channel();
        state.waiters.push(tx);
        Ok(Step::Parked(rx))
    }

    /// Install credentials from a successful sign-in.
    pub async fn establish(&self, credentials: Credentials) -> session_auth::Result<()> {
        let _writes = self.inner.writes.lock().await;
        self.inner.store.clear_user().await?;
        self.inner.store.save(&credentials).await?;
        {
            let mut state = self.inner.lock();
            state.generation += 1;
            state.credentials = Some(credentials);
        }
        info!("session established");
        Ok(())
    }

    /// Drop the session from memory and storage.
    ///
    /// Returns whether there was a session to end. The in-memory session is
    /// gone even if clearing storage fails.
    pub async fn end_session(&self) -> session_auth::Result<bool> {
        let _writes = self.inner.writes.lock().await;
        let had_session = {
            let mut state = self.inner.lock();
            state.generation += 1;
            state.credentials.take().is_some()
        };
        self.inner.store.clear().await?;
        Ok(had_session)
    }

    /// End the session because `rejected` was refused even after a refresh,
    /// and send the host to the login view.
    ///
    /// Returns `false`, touching nothing, when the session has already moved
    /// on to another token. Returns `true` when there is no session left;
    /// only the caller that actually ended it navigates.
    pub(crate) async fn expire(&self, rejected: &Secret<String>, reason: &str) -> bool {
        let _writes = self.inner.writes.lock().await;
        {
            let mut state = self.inner.lock();
            match state.credentials.as_ref() {
                None => return true,
                Some(current) if !current.access.matches(rejected.expose()) => {
                    debug!(reason, "rejected token already replaced, keeping session");
                    return false;
                }
                Some(_) => {
                    state.generation += 1;
                    state.credentials = None;
                }
            }
        }
        warn!(reason, "session expired");
        if let Err(e) = self.inner.store.clear().await {
            error!(reason, error = %e, "session expired but clearing storage failed");
        }
        self.navigate_to_login();
        true
    }

    fn navigate_to_login(&self) {
        self.inner.navigator.navigate(NavigationTarget::Login {
            session_expired: true,
        });
    }
}

async fn settle(step: Step) -> Result<Secret<String>, RefreshFailure> {
    match step {
        Step::Ready(token) => Ok(token),
        Step::Parked(rx) => rx.await.unwrap_or(Err(RefreshFailure::Abandoned)),
    }
}

/// Perform one refresh and wake every parked request with its outcome.
///
/// On failure storage is cleared before anyone is woken, so no caller can
/// observe the rejected session afterwards.
async fn run_refresh(inner: Arc<Inner>, refresh: Secret<String>, generation: u64) {
    let started = Instant::now();
    let result = session_auth::refresh_token(&inner.http, &inner.base_url, &refresh)
        .await
        .and_then(|response| {
            Credentials::from_token_response(response, Some(&refresh), now_millis())
        });

    let writes = inner.writes.lock().await;
    let live = inner.lock().generation == generation;

    let outcome = match (result, live) {
        (_, false) => {
            info!("session changed during refresh, discarding result");
            record_refresh("discarded");
            Err(RefreshFailure::SessionEnded)
        }
        (Ok(credentials), true) => match inner.store.save(&credentials).await {
            Ok(()) => {
                record_refresh("success");
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    has_expiry = credentials.expires_at.is_some(),
                    "token refresh succeeded"
                );
                Ok(credentials)
            }
            Err(e) => {
                record_refresh("error");
                Err(abandon_session(
                    &inner,
                    RefreshFailure::Transport(format!("persisting refreshed credentials: {e}")),
                )
                .await)
            }
        },
        (Err(e), true) => {
            let failure = match e {
                session_auth::Error::InvalidCredentials(msg) => {
                    record_refresh("rejected");
                    RefreshFailure::Rejected(msg)
                }
                other => {
                    record_refresh("error");
                    RefreshFailure::Transport(other.to_string())
                }
            };
            Err(abandon_session(&inner, failure).await)
        }
    };

    let waiters = {
        let mut state = inner.lock();
        state.refreshing = false;
        if live {
            state.credentials = outcome.as_ref().ok().cloned();
        }
        std::mem::take(&mut state.waiters)
    };
    drop(writes);

    if live && outcome.is_err() {
        inner.navigator.navigate(NavigationTarget::Login {
            session_expired: true,
        });
    }

    let outcome: RefreshOutcome = outcome.map(|credentials| credentials.access);
    debug!(waiters = waiters.len(), ok = outcome.is_ok(), "waking parked requests");
    for waiter in waiters {
        let _ = waiter.send(outcome.clone());
    }
}

/// Clear storage after a failed refresh. Caller holds the write lock.
async fn abandon_session(inner: &Inner, failure: RefreshFailure) -> RefreshFailure {
    warn!(error = %failure, "token refresh failed, ending session");
    if let Err(e) = inner.store.clear().await {
        error!(error = %e, "failed to clear session storage after refresh failure");
    }
    failure
}
