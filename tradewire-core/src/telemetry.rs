//! Tracing subscriber setup.
//!
//! The runtime only emits `tracing` events; the host application decides
//! whether and how to install a subscriber. This helper installs the stock
//! one: an env-filtered fmt layer, plain or JSON.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::TelemetryError;

pub const LOG_ENV: &str = "TRADEWIRE_LOG";
pub const DEFAULT_FILTER: &str = "tradewire=info,tradewire_core=info,tradewire_client=info,warn";

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Directive string, e.g. `tradewire_client=debug,info`.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: std::env::var(LOG_ENV).unwrap_or_else(|_| DEFAULT_FILTER.to_string()),
            json: std::env::var("TRADEWIRE_LOG_JSON")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(false),
        }
    }
}

/// Build the filter for `config`, rejecting malformed directives.
pub fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(&config.filter).map_err(|e| TelemetryError::InvalidFilter {
        filter: config.filter.clone(),
        reason: e.to_string(),
    })
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.map_err(|_| TelemetryError::AlreadyInstalled)?;

    tracing::info!(filter = %config.filter, json = config.json, "Tracing initialized");
    Ok(())
}
