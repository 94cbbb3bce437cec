/*!
 * Bearer tokens and the refresh state machine
 *
 * [`TokenRefresher`] guarantees at most one refresh request in flight.
 * Callers that need a token while a refresh is running are queued and all
 * receive that refresh's outcome: the new token on success, the same
 * failure on failure.
 */

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::AuthError;

/// A bearer token and its expiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { value: value.into(), expires_at }
    }

    /// Expired, or expiring within 30 seconds of `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .map(|at| at - Duration::seconds(30) <= now)
            .unwrap_or(false)
    }

    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

/// Access token plus the refresh token that renews it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: AccessToken,
    pub refresh_token: String,
}

/// Client-held token storage
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<TokenPair>;
    fn save(&self, pair: TokenPair);
    fn clear(&self);
}

/// Token storage that lives as long as the process
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    pair: RwLock<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: TokenPair) -> Self {
        Self { pair: RwLock::new(Some(pair)) }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<TokenPair> {
        self.pair.read().clone()
    }

    fn save(&self, pair: TokenPair) {
        *self.pair.write() = Some(pair);
    }

    fn clear(&self) {
        *self.pair.write() = None;
    }
}

/// Exchanges a refresh token for a new token pair
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError>;
}

/// Where the refresher is in its cycle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RefreshState {
    #[default]
    Idle,
    Refreshing,
    Succeeded,
    Failed(AuthError),
}

type Waiter = oneshot::Sender<Result<AccessToken, AuthError>>;

#[derive(Default)]
struct Inner {
    state: RefreshState,
    waiters: Vec<Waiter>,
    refreshes: u64,
}

pub struct TokenRefresher<S> {
    source: S,
    store: Arc<dyn TokenStore>,
    inner: Mutex<Inner>,
}

impl<S: TokenSource> TokenRefresher<S> {
    pub fn new(source: S, store: Arc<dyn TokenStore>) -> Self {
        Self {
            source,
            store,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn state(&self) -> RefreshState {
        self.inner.lock().state.clone()
    }

    /// Number of refresh requests actually sent
    pub fn refresh_count(&self) -> u64 {
        self.inner.lock().refreshes
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// The stored access token if still valid, otherwise a refreshed one
    pub async fn valid_token(&self) -> Result<AccessToken, AuthError> {
        if let Some(pair) = self.store.load() {
            if !pair.access.is_expired(Utc::now()) {
                return Ok(pair.access);
            }
        }
        self.fresh_token().await
    }

    /// Refresh the access token, joining a refresh already in flight
    pub async fn fresh_token(&self) -> Result<AccessToken, AuthError> {
        let queued = {
            let mut inner = self.inner.lock();
            if inner.state == RefreshState::Refreshing {
                let (tx, rx) = oneshot::channel();
                inner.waiters.push(tx);
                debug!(queued = inner.waiters.len(), "request queued behind token refresh");
                Some(rx)
            } else {
                inner.state = RefreshState::Refreshing;
                inner.refreshes += 1;
                None
            }
        };

        if let Some(rx) = queued {
            return rx.await.unwrap_or(Err(AuthError::Abandoned));
        }

        let mut guard = RefreshGuard { inner: &self.inner, finished: false };
        let outcome = self.run_refresh().await;
        guard.finish(&outcome);
        outcome
    }

    async fn run_refresh(&self) -> Result<AccessToken, AuthError> {
        let refresh_token = self
            .store
            .load()
            .map(|pair| pair.refresh_token)
            .ok_or(AuthError::MissingRefreshToken)?;

        match self.source.refresh(&refresh_token).await {
            Ok(pair) => {
                info!("access token refreshed");
                let access = pair.access.clone();
                self.store.save(pair);
                Ok(access)
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                if matches!(e, AuthError::Rejected(_)) {
                    self.store.clear();
                }
                Err(e)
            }
        }
    }
}

/// Settles the state machine even if the refreshing future is dropped
struct RefreshGuard<'a> {
    inner: &'a Mutex<Inner>,
    finished: bool,
}

impl RefreshGuard<'_> {
    fn finish(&mut self, outcome: &Result<AccessToken, AuthError>) {
        self.finished = true;
        let waiters = {
            let mut inner = self.inner.lock();
            inner.state = match outcome {
                Ok(_) => RefreshState::Succeeded,
                Err(e) => RefreshState::Failed(e.clone()),
            };
            std::mem::take(&mut inner.waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(&Err(AuthError::Abandoned));
        }
    }
}
