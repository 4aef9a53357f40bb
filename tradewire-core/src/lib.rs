//! Tradewire Core
//!
//! Building blocks of the network-access runtime that do not touch the
//! network themselves: the TTL response cache, the backoff policy, the
//! credential store, configuration and tracing setup.

pub mod backoff;
pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod error;
pub mod telemetry;
pub mod time;

pub use backoff::BackoffPolicy;
pub use bootstrap::{bootstrap, bootstrap_from_path};
pub use cache::{CacheStats, TtlCache};
pub use config::{AuthConfig, BackoffConfig, RuntimeConfig};
pub use credentials::{
    CredentialStore, Credentials, DurableStore, JsonFileStore, MemoryStore, UserProfile,
};
pub use error::{ConfigError, CoreError, CoreResult, StorageError, TelemetryError};
pub use telemetry::{init_tracing, TelemetryConfig};
pub use time::{Clock, Sleeper, SystemClock, TokioSleeper};
