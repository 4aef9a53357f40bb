//! Tradewire Test Utilities
//!
//! Shared test infrastructure for the tradewire workspace:
//! - Scriptable HTTP transport and socket connector
//! - Recording sleeper and manual clock for time-free tests
//! - Failing durable store
//! - Fixtures and proptest generators

pub use tradewire_client::streaming::{InboundFrame, SocketConnection, SocketConnector, SocketHandle};
pub use tradewire_client::{
    ClientError, HttpRequest, HttpResponse, HttpTransport, SocketError, TransportError,
};
pub use tradewire_core::{
    Clock, CredentialStore, DurableStore, MemoryStore, RuntimeConfig, Sleeper, StorageError,
};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};

fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

type Responder = dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync;

/// HTTP transport answering from a closure and recording every request.
pub struct MockTransport {
    responder: Box<Responder>,
    calls: Mutex<Vec<HttpRequest>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Transport that answers every request with `status` and `body`.
    pub fn always(status: u16, body: serde_json::Value) -> Self {
        Self::new(move |_| Ok(json_response(status, &body)))
    }

    /// Hold every call for `delay` (real time) before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        locked(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        locked(&self.calls).len()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        locked(&self.calls)
            .iter()
            .filter(|request| request.path == path)
            .count()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        locked(&self.calls).push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(&request)
    }
}

// ============================================================================
// MOCK SOCKET
// ============================================================================

/// Scripted result of one `connect` call.
#[derive(Debug, Clone)]
pub enum ConnectOutcome {
    Fail(String),
    Open,
}

/// Socket handle that records outbound text.
#[derive(Debug, Default)]
pub struct MockSocket {
    sent: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MockSocket {
    pub fn sent(&self) -> Vec<String> {
        locked(&self.sent).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl SocketHandle for MockSocket {
    fn send(&self, text: String) -> Result<(), SocketError> {
        if self.is_closed() {
            return Err(SocketError::Closed);
        }
        locked(&self.sent).push(text);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct OpenSocket {
    socket: Arc<MockSocket>,
    inbound: mpsc::UnboundedSender<InboundFrame>,
}

/// Socket connector following a script; fails once the script runs out.
#[derive(Default)]
pub struct MockConnector {
    script: Mutex<VecDeque<ConnectOutcome>>,
    sockets: Mutex<Vec<OpenSocket>>,
    headers: Mutex<Vec<Vec<(String, String)>>>,
    attempts: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_fail(&self, reason: impl Into<String>) {
        locked(&self.script).push_back(ConnectOutcome::Fail(reason.into()));
    }

    pub fn push_open(&self) {
        locked(&self.script).push_back(ConnectOutcome::Open);
    }

    /// Number of `connect` calls so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Handshake headers of the most recent `connect` call.
    pub fn last_headers(&self) -> Option<Vec<(String, String)>> {
        locked(&self.headers).last().cloned()
    }

    pub fn latest_socket(&self) -> Option<Arc<MockSocket>> {
        locked(&self.sockets).last().map(|open| Arc::clone(&open.socket))
    }

    /// Text sent on the most recent connection.
    pub fn sent_on_latest(&self) -> Vec<String> {
        self.latest_socket().map(|s| s.sent()).unwrap_or_default()
    }

    /// Deliver a frame on the most recent connection.
    pub fn inject(&self, frame: InboundFrame) -> bool {
        locked(&self.sockets)
            .last()
            .map(|open| open.inbound.send(frame).is_ok())
            .unwrap_or(false)
    }

    pub fn inject_text(&self, text: &str) -> bool {
        self.inject(InboundFrame::Text(text.to_string()))
    }
}

#[async_trait]
impl SocketConnector for MockConnector {
    async fn connect(
        &self,
        _url: &str,
        headers: &[(String, String)],
    ) -> Result<SocketConnection, SocketError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        locked(&self.headers).push(headers.to_vec());
        let outcome = locked(&self.script)
            .pop_front()
            .unwrap_or_else(|| ConnectOutcome::Fail("script exhausted".to_string()));
        match outcome {
            ConnectOutcome::Fail(reason) => Err(SocketError::Connect(reason)),
            ConnectOutcome::Open => {
                let socket = Arc::new(MockSocket::default());
                let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
                locked(&self.sockets).push(OpenSocket {
                    socket: Arc::clone(&socket),
                    inbound: inbound_tx,
                });
                Ok(SocketConnection {
                    handle: socket,
                    inbound: inbound_rx,
                })
            }
        }
    }
}

// ============================================================================
// TIME
// ============================================================================

/// Sleeper that records requested delays instead of waiting.
///
/// A gated sleeper additionally parks each sleep until [`release`] hands out
/// a permit, which lets tests observe intermediate states.
///
/// [`release`]: RecordingSleeper::release
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
    gate: Option<Semaphore>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            delays: Mutex::new(Vec::new()),
            gate: Some(Semaphore::new(0)),
        }
    }

    pub fn release(&self, sleeps: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(sleeps);
        }
    }

    pub fn delays(&self) -> Vec<Duration> {
        locked(&self.delays).clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        locked(&self.delays).push(duration);
        match &self.gate {
            Some(gate) => {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            None => tokio::task::yield_now().await,
        }
    }
}

/// Clock advanced by hand.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *locked(&self.now) += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *locked(&self.now)
    }
}

// ============================================================================
// STORAGE
// ============================================================================

/// Durable store whose every operation fails.
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl DurableStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable {
            reason: "keystore locked".to_string(),
        })
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable {
            reason: "keystore locked".to_string(),
        })
    }

    async fn clear(&self) -> Result<(), StorageError> {
        Err(StorageError::Unavailable {
            reason: "keystore locked".to_string(),
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;

    pub const ACCESS_TOKEN: &str = "access-1";
    pub const REFRESH_TOKEN: &str = "refresh-1";
    pub const NEW_ACCESS_TOKEN: &str = "access-2";
    pub const NEW_REFRESH_TOKEN: &str = "refresh-2";

    pub fn test_config() -> RuntimeConfig {
        RuntimeConfig::new(
            "http://localhost:8000",
            "ws://localhost:8000/ws",
            "tradewire-test/0.3",
        )
    }

    /// Credential store holding `ACCESS_TOKEN` / `REFRESH_TOKEN`.
    pub async fn logged_in_store() -> Arc<CredentialStore> {
        let store = Arc::new(CredentialStore::new(Arc::new(MemoryStore::new())));
        store
            .save_session(
                ACCESS_TOKEN.to_string(),
                Some(REFRESH_TOKEN.to_string()),
                None,
            )
            .await;
        store
    }

    pub fn logged_out_store() -> Arc<CredentialStore> {
        Arc::new(CredentialStore::new(Arc::new(MemoryStore::new())))
    }
}

pub fn json_response(status: u16, body: &serde_json::Value) -> HttpResponse {
    HttpResponse {
        status,
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: body.to_string().into_bytes(),
    }
}

pub fn bearer(request: &HttpRequest) -> Option<&str> {
    request
        .header_value("Authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use proptest::prelude::*;

    /// HTTP statuses the retry step must not retry.
    pub fn arb_non_retryable_status() -> impl Strategy<Value = u16> {
        prop_oneof![200u16..300, 400u16..502, 505u16..600]
    }

    pub fn arb_topic() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,15}"
    }
}
