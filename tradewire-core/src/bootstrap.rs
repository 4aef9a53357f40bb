//! Process start-up: tracing first, then configuration.

use std::path::Path;

use crate::config::RuntimeConfig;
use crate::error::{CoreResult, TelemetryError};
use crate::telemetry::{init_tracing, TelemetryConfig};

/// Install tracing and load the configuration named on the command line or
/// in `TRADEWIRE_CONFIG`.
pub fn bootstrap(telemetry: &TelemetryConfig) -> CoreResult<RuntimeConfig> {
    install_tracing(telemetry)?;
    let path = RuntimeConfig::locate()?;
    load_logged(&path)
}

/// Same as [`bootstrap`] with an explicit config file.
pub fn bootstrap_from_path(path: &Path, telemetry: &TelemetryConfig) -> CoreResult<RuntimeConfig> {
    install_tracing(telemetry)?;
    load_logged(path)
}

/// A subscriber installed by the host application is kept.
fn install_tracing(telemetry: &TelemetryConfig) -> CoreResult<()> {
    match init_tracing(telemetry) {
        Ok(()) | Err(TelemetryError::AlreadyInstalled) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn load_logged(path: &Path) -> CoreResult<RuntimeConfig> {
    match RuntimeConfig::load_from(path) {
        Ok(config) => {
            tracing::info!(
                path = %path.display(),
                api_base_url = %config.api_base_url,
                "Configuration loaded"
            );
            Ok(config)
        }
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "Configuration rejected");
            Err(err.into())
        }
    }
}
