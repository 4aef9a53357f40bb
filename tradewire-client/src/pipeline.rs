//! Request pipeline: auth step, retry step, transport.
//!
//! Every outbound call is stamped with default headers and the current bearer
//! token, then sent through the retry step. A 401 on a protected endpoint
//! hands over to the [`RefreshCoordinator`] and the call is replayed at most
//! once with the refreshed token.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tradewire_core::{AuthConfig, BackoffPolicy, CredentialStore, RuntimeConfig, Sleeper};
use uuid::Uuid;

use crate::error::{ClientError, ClientResult};
use crate::refresh::RefreshCoordinator;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

pub const HEADER_AUTHORIZATION: &str = "Authorization";
pub const HEADER_CLIENT: &str = "X-Client";
pub const HEADER_REQUEST_ID: &str = "X-Request-Id";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Replays granted per call after a successful refresh.
pub const MAX_REFRESH_REPLAYS: u32 = 1;

/// Statuses the retry step treats as transient.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 502..=504)
}

/// Per-call bookkeeping carried through the pipeline.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    refresh_replays: u32,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::now_v7(),
            refresh_replays: 0,
        }
    }

    pub fn refresh_replays(&self) -> u32 {
        self.refresh_replays
    }

    pub fn can_replay(&self) -> bool {
        self.refresh_replays < MAX_REFRESH_REPLAYS
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn apply_default_headers(request: &mut HttpRequest, client_id: &str) {
    request.set_header("Content-Type", JSON_CONTENT_TYPE);
    request.set_header("Accept", JSON_CONTENT_TYPE);
    request.set_header(HEADER_CLIENT, client_id);
}

/// Stamps default headers and the bearer token.
#[derive(Debug, Clone)]
pub struct AuthStep {
    credentials: Arc<CredentialStore>,
    client_id: String,
}

impl AuthStep {
    pub fn new(credentials: Arc<CredentialStore>, client_id: impl Into<String>) -> Self {
        Self {
            credentials,
            client_id: client_id.into(),
        }
    }

    /// Returns the token that was attached, if any. Never blocks.
    pub fn apply(&self, request: &mut HttpRequest) -> Option<String> {
        apply_default_headers(request, &self.client_id);
        let token = self
            .credentials
            .access_token()
            .filter(|token| !token.trim().is_empty())?;
        request.set_header(HEADER_AUTHORIZATION, format!("Bearer {}", token));
        Some(token)
    }
}

/// Retries transient failures with capped exponential backoff.
pub struct RetryStep {
    transport: Arc<dyn HttpTransport>,
    policy: BackoffPolicy,
    sleeper: Arc<dyn Sleeper>,
    permits: Arc<Semaphore>,
}

impl RetryStep {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        policy: BackoffPolicy,
        sleeper: Arc<dyn Sleeper>,
        max_concurrent_requests: usize,
    ) -> Self {
        Self {
            transport,
            policy,
            sleeper,
            permits: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
        }
    }

    pub fn policy(&self) -> BackoffPolicy {
        self.policy
    }

    /// Send `request` up to `max_attempts` times.
    ///
    /// Any response that is not 502/503/504 is returned as is, including
    /// 4xx. A concurrency permit is held only while the transport call runs.
    pub async fn execute(
        &self,
        request: &HttpRequest,
        ctx: &RequestContext,
    ) -> ClientResult<HttpResponse> {
        let max_attempts = self.policy.max_attempts().max(1);
        let mut attempt = 1;
        loop {
            let outcome = {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|_| ClientError::InvalidRequest("request pipeline closed".to_string()))?;
                self.transport.execute(request.clone()).await
            };

            let last_error = match outcome {
                Ok(response) if !is_retryable_status(response.status) => return Ok(response),
                Ok(response) => format!("HTTP {}", response.status),
                Err(err) if err.is_retryable() => err.to_string(),
                Err(err) => return Err(err.into()),
            };

            if attempt >= max_attempts {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    path = %request.path,
                    attempts = attempt,
                    error = %last_error,
                    "Retries exhausted"
                );
                return Err(ClientError::Connectivity {
                    attempts: attempt,
                    reason: last_error,
                });
            }

            let delay = self.policy.delay(attempt);
            tracing::debug!(
                request_id = %ctx.request_id,
                path = %request.path,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "Transient failure, retrying"
            );
            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Ordered chain applied to every outbound request.
pub struct RequestPipeline {
    auth: AuthStep,
    retry: RetryStep,
    refresh: RefreshCoordinator,
    credentials: Arc<CredentialStore>,
    auth_config: AuthConfig,
}

impl RequestPipeline {
    pub fn new(
        config: &RuntimeConfig,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<CredentialStore>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let refresh = RefreshCoordinator::new(
            Arc::clone(&transport),
            Arc::clone(&credentials),
            &config.auth,
            config.client_id.clone(),
        );
        Self {
            auth: AuthStep::new(Arc::clone(&credentials), config.client_id.clone()),
            retry: RetryStep::new(
                transport,
                config.retry.policy(),
                sleeper,
                config.max_concurrent_requests,
            ),
            refresh,
            credentials,
            auth_config: config.auth.clone(),
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.refresh
    }

    pub fn auth_config(&self) -> &AuthConfig {
        &self.auth_config
    }

    /// Execute `request`, returning the 2xx response or a classified error.
    pub async fn execute(&self, request: HttpRequest) -> ClientResult<HttpResponse> {
        let mut ctx = RequestContext::new();
        tracing::debug!(
            request_id = %ctx.request_id,
            method = %request.method,
            path = %request.path,
            "Sending request"
        );

        loop {
            let mut outbound = request.clone();
            let sent_token = self.auth.apply(&mut outbound);
            outbound.set_header(HEADER_REQUEST_ID, ctx.request_id.to_string());

            let response = self.retry.execute(&outbound, &ctx).await?;
            if response.is_success() {
                return Ok(response);
            }

            if response.status == 401 && self.should_refresh(&request.path, &ctx) {
                ctx.refresh_replays += 1;
                match self.refresh.refresh(sent_token.as_deref()).await {
                    Ok(_) => {
                        tracing::debug!(
                            request_id = %ctx.request_id,
                            path = %request.path,
                            "Replaying request with refreshed token"
                        );
                        continue;
                    }
                    Err(err) => {
                        tracing::info!(
                            request_id = %ctx.request_id,
                            path = %request.path,
                            error = %err,
                            "Session expired"
                        );
                        return Err(ClientError::SessionExpired(err));
                    }
                }
            }

            tracing::debug!(
                request_id = %ctx.request_id,
                path = %request.path,
                status = response.status,
                "Request failed"
            );
            return Err(ClientError::Http {
                status: response.status,
                detail: response.detail(),
            });
        }
    }

    /// [`execute`](Self::execute) bounded by `deadline`, including retry
    /// sleeps and refresh waits.
    pub async fn execute_with_timeout(
        &self,
        request: HttpRequest,
        deadline: Duration,
    ) -> ClientResult<HttpResponse> {
        tokio::time::timeout(deadline, self.execute(request))
            .await
            .map_err(|_| ClientError::Timeout {
                after_ms: deadline.as_millis() as u64,
            })?
    }

    pub async fn execute_json<T: DeserializeOwned>(&self, request: HttpRequest) -> ClientResult<T> {
        self.execute(request).await?.json()
    }

    fn should_refresh(&self, path: &str, ctx: &RequestContext) -> bool {
        ctx.can_replay()
            && !self.auth_config.is_exempt(path)
            && self.credentials.refresh_token().is_some()
    }
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("retry_policy", &self.retry.policy)
            .field("refresh", &self.refresh)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradewire_core::MemoryStore;

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(502));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(504));
        assert!(!is_retryable_status(500));
        assert!(!is_retryable_status(401));
        assert!(!is_retryable_status(429));
    }

    #[test]
    fn test_context_allows_one_replay() {
        let mut ctx = RequestContext::new();
        assert!(ctx.can_replay());
        ctx.refresh_replays += 1;
        assert!(!ctx.can_replay());
        assert_eq!(ctx.refresh_replays(), 1);
    }

    #[tokio::test]
    async fn test_auth_step_headers() {
        let credentials = Arc::new(CredentialStore::new(Arc::new(MemoryStore::new())));
        let step = AuthStep::new(Arc::clone(&credentials), "tradewire/0.3");

        let mut anonymous = HttpRequest::get("/api/market/overview");
        assert_eq!(step.apply(&mut anonymous), None);
        assert_eq!(anonymous.header_value(HEADER_AUTHORIZATION), None);
        assert_eq!(anonymous.header_value("x-client"), Some("tradewire/0.3"));
        assert_eq!(anonymous.header_value("accept"), Some(JSON_CONTENT_TYPE));

        credentials
            .save_session("abc".to_string(), Some("def".to_string()), None)
            .await;
        let mut authed = HttpRequest::get("/api/portfolio");
        assert_eq!(step.apply(&mut authed).as_deref(), Some("abc"));
        assert_eq!(authed.header_value(HEADER_AUTHORIZATION), Some("Bearer abc"));
    }
}
