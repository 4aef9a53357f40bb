//! Reconnecting streaming client.
//!
//! One driver task owns the connection lifecycle for a given generation.
//! `connect()` and `disconnect()` bump the generation and abort the previous
//! driver, so a pending backoff wait is cancelled together with its task and
//! a stale driver can never publish state.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tradewire_core::{BackoffPolicy, CredentialStore, RuntimeConfig, Sleeper};

use super::events::{ConnectionStatus, ControlMessage, StreamEvent};
use super::socket::{InboundFrame, SocketConnection, SocketConnector, SocketHandle};
use crate::pipeline::{HEADER_AUTHORIZATION, HEADER_CLIENT};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct StreamingOptions {
    pub url: String,
    pub client_id: String,
    pub reconnect: BackoffPolicy,
    pub default_topics: Vec<String>,
}

impl StreamingOptions {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            url: config.ws_url.clone(),
            client_id: config.client_id.clone(),
            reconnect: config.reconnect.policy(),
            default_topics: config.default_topics.clone(),
        }
    }
}

struct ConnectionState {
    status: ConnectionStatus,
    attempts: u32,
    topics: BTreeSet<String>,
    socket: Option<Arc<dyn SocketHandle>>,
    driver: Option<JoinHandle<()>>,
    generation: u64,
}

struct Inner {
    options: StreamingOptions,
    connector: Arc<dyn SocketConnector>,
    credentials: Arc<CredentialStore>,
    sleeper: Arc<dyn Sleeper>,
    state: Mutex<ConnectionState>,
    events: broadcast::Sender<StreamEvent>,
    status: watch::Sender<ConnectionStatus>,
}

enum RunOutcome {
    Lost(String),
    Superseded,
}

/// Handle to the single streaming connection. Clones share the connection.
#[derive(Clone)]
pub struct StreamingClient {
    inner: Arc<Inner>,
}

impl StreamingClient {
    pub fn new(
        options: StreamingOptions,
        connector: Arc<dyn SocketConnector>,
        credentials: Arc<CredentialStore>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let topics = options.default_topics.iter().cloned().collect();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            inner: Arc::new(Inner {
                options,
                connector,
                credentials,
                sleeper,
                state: Mutex::new(ConnectionState {
                    status: ConnectionStatus::Disconnected,
                    attempts: 0,
                    topics,
                    socket: None,
                    driver: None,
                    generation: 0,
                }),
                events,
                status,
            }),
        }
    }

    /// Start connecting. No-op while Connected or Connecting.
    ///
    /// From Backoff or Disconnected this cancels any pending reconnect wait
    /// and starts over with a fresh attempt budget. Must be called from
    /// within a Tokio runtime.
    pub fn connect(&self) {
        let mut state = self.inner.lock();
        if matches!(
            state.status,
            ConnectionStatus::Connected | ConnectionStatus::Connecting
        ) {
            tracing::debug!(status = ?state.status, "Connect ignored");
            return;
        }
        state.generation += 1;
        if let Some(driver) = state.driver.take() {
            driver.abort();
        }
        state.attempts = 0;
        let generation = state.generation;
        self.inner.set_status(&mut state, ConnectionStatus::Connecting);
        state.driver = Some(tokio::spawn(Inner::drive(Arc::clone(&self.inner), generation)));
    }

    /// Cancel any scheduled reconnect, close the socket and reset the
    /// attempt count. Subscriptions are kept for the next `connect()`.
    pub fn disconnect(&self) {
        let mut state = self.inner.lock();
        state.generation += 1;
        if let Some(driver) = state.driver.take() {
            driver.abort();
        }
        if let Some(socket) = state.socket.take() {
            socket.close();
        }
        state.attempts = 0;
        self.inner.set_status(&mut state, ConnectionStatus::Disconnected);
        tracing::info!("Streaming client disconnected");
    }

    pub fn shutdown(&self) {
        self.disconnect();
    }

    /// Add `topic` to the subscription set, sending the control message now
    /// if connected.
    pub fn subscribe(&self, topic: impl Into<String>) {
        let topic = topic.into();
        let mut state = self.inner.lock();
        state.topics.insert(topic.clone());
        if state.status.is_connected() {
            if let Some(socket) = &state.socket {
                self.inner.send_control(socket.as_ref(), ControlMessage::subscribe(topic));
            }
        }
    }

    pub fn unsubscribe(&self, topic: &str) {
        let mut state = self.inner.lock();
        state.topics.remove(topic);
        if state.status.is_connected() {
            if let Some(socket) = &state.socket {
                self.inner.send_control(socket.as_ref(), ControlMessage::unsubscribe(topic));
            }
        }
    }

    /// Independent receiver of every decoded event.
    pub fn subscribe_events(&self) -> broadcast::Receiver<StreamEvent> {
        self.inner.events.subscribe()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.lock().status
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    pub fn attempts(&self) -> u32 {
        self.inner.lock().attempts
    }

    pub fn topics(&self) -> Vec<String> {
        self.inner.lock().topics.iter().cloned().collect()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_status(&self, state: &mut ConnectionState, status: ConnectionStatus) {
        if state.status != status {
            tracing::debug!(from = ?state.status, to = ?status, "Streaming status changed");
        }
        state.status = status;
        self.status.send_replace(status);
    }

    fn send_control(&self, socket: &dyn SocketHandle, message: ControlMessage) {
        let text = match message.encode() {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(error = %err, "Failed to encode control message");
                return;
            }
        };
        if let Err(err) = socket.send(text) {
            tracing::debug!(topic = %message.channel, error = %err, "Control message not sent");
        }
    }

    fn handshake_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![(HEADER_CLIENT.to_string(), self.options.client_id.clone())];
        if let Some(token) = self
            .credentials
            .access_token()
            .filter(|token| !token.trim().is_empty())
        {
            headers.push((HEADER_AUTHORIZATION.to_string(), format!("Bearer {}", token)));
        }
        headers
    }

    async fn drive(self: Arc<Self>, generation: u64) {
        loop {
            let reason = match self.run_once(generation).await {
                RunOutcome::Lost(reason) => reason,
                RunOutcome::Superseded => return,
            };
            let Some(delay) = self.after_failure(generation, &reason) else {
                return;
            };
            self.sleeper.sleep(delay).await;
            if !self.begin_reconnect(generation) {
                return;
            }
        }
    }

    async fn run_once(&self, generation: u64) -> RunOutcome {
        let headers = self.handshake_headers();
        let connection = match self.connector.connect(&self.options.url, &headers).await {
            Ok(connection) => connection,
            Err(err) => return RunOutcome::Lost(err.to_string()),
        };
        let SocketConnection { handle, mut inbound } = connection;
        if !self.on_open(generation, Arc::clone(&handle)) {
            handle.close();
            return RunOutcome::Superseded;
        }

        while let Some(frame) = inbound.recv().await {
            match frame {
                InboundFrame::Text(text) => self.dispatch(&text),
                InboundFrame::Binary(_) => {}
                InboundFrame::Closed { reason } => {
                    return RunOutcome::Lost(reason.unwrap_or_else(|| "closed by server".to_string()))
                }
                InboundFrame::Failed { error } => return RunOutcome::Lost(error),
            }
        }
        RunOutcome::Lost("connection dropped".to_string())
    }

    fn on_open(&self, generation: u64, handle: Arc<dyn SocketHandle>) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        state.attempts = 0;
        for topic in &state.topics {
            self.send_control(handle.as_ref(), ControlMessage::subscribe(topic.as_str()));
        }
        state.socket = Some(handle);
        self.set_status(&mut state, ConnectionStatus::Connected);
        tracing::info!(topics = state.topics.len(), "Streaming connection established");
        true
    }

    fn dispatch(&self, text: &str) {
        match StreamEvent::decode(text) {
            Some(event) => {
                tracing::trace!(kind = event.kind(), "Stream event");
                let _ = self.events.send(event);
            }
            None => tracing::trace!("Dropping unrecognised stream message"),
        }
    }

    /// Tear down the lost connection and decide whether to retry.
    fn after_failure(&self, generation: u64, reason: &str) -> Option<Duration> {
        let mut state = self.lock();
        if state.generation != generation {
            return None;
        }
        if let Some(socket) = state.socket.take() {
            socket.close();
        }
        if state.attempts >= self.options.reconnect.max_attempts() {
            self.set_status(&mut state, ConnectionStatus::Disconnected);
            tracing::warn!(
                attempts = state.attempts,
                error = %reason,
                "Reconnect attempts exhausted; staying disconnected"
            );
            return None;
        }
        state.attempts += 1;
        let delay = self.options.reconnect.delay(state.attempts);
        self.set_status(&mut state, ConnectionStatus::Backoff);
        tracing::info!(
            attempt = state.attempts,
            delay_ms = delay.as_millis() as u64,
            error = %reason,
            "Streaming connection lost; reconnecting"
        );
        Some(delay)
    }

    fn begin_reconnect(&self, generation: u64) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        self.set_status(&mut state, ConnectionStatus::Connecting);
        true
    }
}

impl std::fmt::Debug for StreamingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("StreamingClient")
            .field("url", &self.inner.options.url)
            .field("status", &state.status)
            .field("attempts", &state.attempts)
            .field("topics", &state.topics)
            .finish()
    }
}
