//! Single-flight access token refresh.
//!
//! The first caller that needs a refresh spawns it as a task and publishes a
//! shared handle to it; every caller arriving while it is pending awaits that
//! same handle. The task runs to completion even if every waiter is dropped,
//! and clears the slot itself once the credential store has been updated, so
//! a late caller either joins the pending refresh or observes the rotated
//! token.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tradewire_core::{AuthConfig, CredentialStore};

use crate::auth::TokenPair;
use crate::error::RefreshError;
use crate::pipeline::apply_default_headers;
use crate::transport::{HttpRequest, HttpTransport};

type SharedRefresh = Shared<BoxFuture<'static, Result<String, RefreshError>>>;

struct InFlight {
    generation: u64,
    waiters: usize,
    handle: SharedRefresh,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

struct Inner {
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<CredentialStore>,
    refresh_path: String,
    client_id: String,
    timeout: Duration,
    in_flight: Mutex<Option<InFlight>>,
    generation: AtomicU64,
    refresh_calls: AtomicU64,
}

/// Coordinates token refreshes for every request sharing a credential store.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<CredentialStore>,
        auth: &AuthConfig,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                credentials,
                refresh_path: auth.refresh_path.clone(),
                client_id: client_id.into(),
                timeout: auth.refresh_timeout(),
                in_flight: Mutex::new(None),
                generation: AtomicU64::new(0),
                refresh_calls: AtomicU64::new(0),
            }),
        }
    }

    /// Obtain an access token newer than `stale_token`.
    ///
    /// Returns immediately when the store already holds a different token,
    /// joins the pending refresh if there is one, and otherwise starts one.
    /// Must be called from within a Tokio runtime.
    pub async fn refresh(&self, stale_token: Option<&str>) -> Result<String, RefreshError> {
        let handle = {
            let mut slot = self.inner.lock_in_flight();
            match slot.as_mut() {
                Some(in_flight) => {
                    in_flight.waiters += 1;
                    tracing::debug!(
                        generation = in_flight.generation,
                        waiters = in_flight.waiters,
                        "Joining in-flight token refresh"
                    );
                    in_flight.handle.clone()
                }
                None => {
                    if let Some(current) = self.inner.newer_token(stale_token) {
                        return Ok(current);
                    }
                    let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let inner = Arc::clone(&self.inner);
                    let task = tokio::spawn(async move {
                        let result = inner.perform_refresh().await;
                        inner.finish(generation);
                        result
                    });
                    let inner = Arc::clone(&self.inner);
                    let handle = async move {
                        match task.await {
                            Ok(result) => result,
                            Err(err) => {
                                tracing::error!(generation, error = %err, "Token refresh task failed");
                                inner.finish(generation);
                                Err(RefreshError::Aborted(err.to_string()))
                            }
                        }
                    }
                    .boxed()
                    .shared();
                    *slot = Some(InFlight {
                        generation,
                        waiters: 1,
                        handle: handle.clone(),
                    });
                    handle
                }
            }
        };
        handle.await
    }

    /// Whether a refresh is currently pending.
    pub fn is_refreshing(&self) -> bool {
        self.inner.lock_in_flight().is_some()
    }

    /// Number of refresh calls sent to the backend since construction.
    pub fn refresh_calls(&self) -> u64 {
        self.inner.refresh_calls.load(Ordering::Relaxed)
    }
}

impl Inner {
    fn lock_in_flight(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn newer_token(&self, stale_token: Option<&str>) -> Option<String> {
        let current = self.credentials.access_token()?;
        if current.trim().is_empty() || Some(current.as_str()) == stale_token {
            return None;
        }
        Some(current)
    }

    fn finish(&self, generation: u64) {
        let mut slot = self.lock_in_flight();
        if slot.as_ref().map(|f| f.generation) == Some(generation) {
            if let Some(done) = slot.take() {
                tracing::debug!(generation, waiters = done.waiters, "Token refresh settled");
            }
        }
    }

    async fn perform_refresh(&self) -> Result<String, RefreshError> {
        let Some(refresh_token) = self.credentials.refresh_token() else {
            return Err(RefreshError::MissingRefreshToken);
        };

        let result = self.call_refresh_endpoint(&refresh_token).await;
        match result {
            Ok(tokens) => {
                let rotated = self
                    .credentials
                    .rotate_tokens(
                        &refresh_token,
                        tokens.access_token.clone(),
                        tokens.refresh_token,
                    )
                    .await;
                if rotated {
                    tracing::info!("Access token refreshed");
                    Ok(tokens.access_token)
                } else {
                    tracing::warn!("Session changed during refresh; discarding new tokens");
                    Err(RefreshError::Superseded)
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "Token refresh failed; clearing session");
                self.credentials.clear().await;
                Err(err)
            }
        }
    }

    async fn call_refresh_endpoint(&self, refresh_token: &str) -> Result<TokenPair, RefreshError> {
        let mut request = HttpRequest::post(self.refresh_path.as_str())
            .json(&RefreshRequest { refresh_token })
            .map_err(|err| RefreshError::Malformed(err.to_string()))?;
        apply_default_headers(&mut request, &self.client_id);

        self.refresh_calls.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(path = %self.refresh_path, "Calling refresh endpoint");

        let response = match tokio::time::timeout(self.timeout, self.transport.execute(request)).await {
            Err(_) => {
                return Err(RefreshError::Timeout {
                    after_ms: self.timeout.as_millis() as u64,
                })
            }
            Ok(Err(err)) => return Err(RefreshError::Transport(err)),
            Ok(Ok(response)) => response,
        };
        if !response.is_success() {
            return Err(RefreshError::Rejected {
                status: response.status,
            });
        }
        TokenPair::from_body(&response.body)
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refresh_path", &self.inner.refresh_path)
            .field("refreshing", &self.is_refreshing())
            .field("refresh_calls", &self.refresh_calls())
            .finish()
    }
}
