//! Session credential store.
//!
//! The current tokens live in an immutable snapshot swapped atomically on
//! every write, so the request path reads them without locks or I/O. Writes
//! update the snapshot first and then persist to the durable store; a durable
//! failure is logged and counted but never rolls back the in-memory session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};

use super::durable::DurableStore;
use crate::error::StorageError;

pub const KEY_ACCESS_TOKEN: &str = "auth_token";
pub const KEY_REFRESH_TOKEN: &str = "refresh_token";
pub const KEY_USER_EMAIL: &str = "user_email";
pub const KEY_USER_NAME: &str = "user_name";

/// Signed-in user details shown by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub email: String,
    pub name: String,
}

/// Immutable view of the current session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<UserProfile>,
}

impl Credentials {
    /// A session counts as logged in when it carries a non-blank access token.
    pub fn is_logged_in(&self) -> bool {
        self.access_token
            .as_deref()
            .map(|token| !token.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Holds the session tokens in memory and mirrors them to durable storage.
pub struct CredentialStore {
    snapshot: ArcSwap<Credentials>,
    durable: Arc<dyn DurableStore>,
    login_state: watch::Sender<bool>,
    write_lock: Mutex<()>,
    persistence_failures: AtomicU64,
}

impl CredentialStore {
    /// Create an empty store on top of `durable` without reading it.
    pub fn new(durable: Arc<dyn DurableStore>) -> Self {
        Self::with_credentials(durable, Credentials::default())
    }

    fn with_credentials(durable: Arc<dyn DurableStore>, credentials: Credentials) -> Self {
        let (login_state, _) = watch::channel(credentials.is_logged_in());
        Self {
            snapshot: ArcSwap::from_pointee(credentials),
            durable,
            login_state,
            write_lock: Mutex::new(()),
            persistence_failures: AtomicU64::new(0),
        }
    }

    /// Hydrate the snapshot from durable storage.
    ///
    /// This is the only read of the durable store. Unreadable values are
    /// treated as absent so a damaged store yields a logged-out session.
    pub async fn load(durable: Arc<dyn DurableStore>) -> Self {
        let access_token = read_or_log(durable.as_ref(), KEY_ACCESS_TOKEN).await;
        let refresh_token = read_or_log(durable.as_ref(), KEY_REFRESH_TOKEN).await;
        let email = read_or_log(durable.as_ref(), KEY_USER_EMAIL).await;
        let name = read_or_log(durable.as_ref(), KEY_USER_NAME).await;

        let user = match (email, name) {
            (Some(email), Some(name)) => Some(UserProfile { email, name }),
            _ => None,
        };
        let credentials = Credentials {
            access_token,
            refresh_token,
            user,
        };
        tracing::debug!(
            logged_in = credentials.is_logged_in(),
            has_refresh_token = credentials.refresh_token.is_some(),
            "Credentials loaded"
        );
        Self::with_credentials(durable, credentials)
    }

    /// Current snapshot. Lock-free, never blocks on I/O.
    pub fn snapshot(&self) -> Arc<Credentials> {
        self.snapshot.load_full()
    }

    /// Current access token. Lock-free, never blocks on I/O.
    pub fn access_token(&self) -> Option<String> {
        self.snapshot.load().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.snapshot.load().refresh_token.clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.snapshot.load().user.clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.snapshot.load().is_logged_in()
    }

    /// Reactive login state; the receiver sees every logged-in/out flip.
    pub fn subscribe_login_state(&self) -> watch::Receiver<bool> {
        self.login_state.subscribe()
    }

    /// Number of durable writes that failed since construction.
    pub fn persistence_failures(&self) -> u64 {
        self.persistence_failures.load(Ordering::Relaxed)
    }

    /// Record a fresh session after login or registration.
    pub async fn save_session(
        &self,
        access_token: String,
        refresh_token: Option<String>,
        user: Option<UserProfile>,
    ) {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot.load_full();
        let next = Credentials {
            access_token: Some(access_token.clone()),
            refresh_token: refresh_token.clone().or_else(|| current.refresh_token.clone()),
            user: user.clone().or_else(|| current.user.clone()),
        };
        self.publish(next);

        self.persist(KEY_ACCESS_TOKEN, &access_token).await;
        if let Some(refresh_token) = refresh_token {
            self.persist(KEY_REFRESH_TOKEN, &refresh_token).await;
        }
        if let Some(user) = user {
            self.persist(KEY_USER_EMAIL, &user.email).await;
            self.persist(KEY_USER_NAME, &user.name).await;
        }
    }

    /// Replace the tokens, keeping the old refresh token when none is supplied.
    pub async fn update_tokens(&self, access_token: String, refresh_token: Option<String>) {
        let _guard = self.write_lock.lock().await;
        self.apply_tokens(access_token, refresh_token).await;
    }

    /// Replace the tokens only if the session still holds `used_refresh_token`.
    ///
    /// Returns false when the session was cleared or rotated by someone else
    /// in the meantime; nothing is written in that case.
    pub async fn rotate_tokens(
        &self,
        used_refresh_token: &str,
        access_token: String,
        refresh_token: Option<String>,
    ) -> bool {
        let _guard = self.write_lock.lock().await;
        if self.snapshot.load().refresh_token.as_deref() != Some(used_refresh_token) {
            return false;
        }
        self.apply_tokens(access_token, refresh_token).await;
        true
    }

    pub async fn save_user(&self, user: UserProfile) {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot.load_full();
        self.publish(Credentials {
            user: Some(user.clone()),
            ..(*current).clone()
        });
        self.persist(KEY_USER_EMAIL, &user.email).await;
        self.persist(KEY_USER_NAME, &user.name).await;
    }

    /// Drop the session entirely (logout or irrecoverable refresh failure).
    pub async fn clear(&self) {
        let _guard = self.write_lock.lock().await;
        self.publish(Credentials::default());
        if let Err(err) = self.durable.clear().await {
            self.record_failure("clear", &err);
        }
    }

    async fn apply_tokens(&self, access_token: String, refresh_token: Option<String>) {
        let current = self.snapshot.load_full();
        self.publish(Credentials {
            access_token: Some(access_token.clone()),
            refresh_token: refresh_token.clone().or_else(|| current.refresh_token.clone()),
            user: current.user.clone(),
        });
        self.persist(KEY_ACCESS_TOKEN, &access_token).await;
        if let Some(refresh_token) = refresh_token {
            self.persist(KEY_REFRESH_TOKEN, &refresh_token).await;
        }
    }

    fn publish(&self, next: Credentials) {
        let logged_in = next.is_logged_in();
        self.snapshot.store(Arc::new(next));
        self.login_state.send_if_modified(|state| {
            if *state == logged_in {
                false
            } else {
                *state = logged_in;
                true
            }
        });
    }

    async fn persist(&self, key: &str, value: &str) {
        if let Err(err) = self.durable.set(key, value).await {
            self.record_failure(key, &err);
        }
    }

    fn record_failure(&self, operation: &str, err: &StorageError) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            operation = operation,
            error = %err,
            "Credential persistence failed; in-memory session stays authoritative"
        );
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot.load();
        f.debug_struct("CredentialStore")
            .field("logged_in", &snapshot.is_logged_in())
            .field("has_refresh_token", &snapshot.refresh_token.is_some())
            .field("persistence_failures", &self.persistence_failures())
            .finish()
    }
}

async fn read_or_log(durable: &dyn DurableStore, key: &str) -> Option<String> {
    match durable.get(key).await {
        Ok(value) => value.filter(|v| !v.is_empty()),
        Err(err) => {
            tracing::warn!(key = key, error = %err, "Failed to read credential from durable store");
            None
        }
    }
}
