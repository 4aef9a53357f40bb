//! Runtime configuration.
//!
//! Loaded from TOML via `--config <path>` or `TRADEWIRE_CONFIG`. Every field
//! in a file is required; [`RuntimeConfig::new`] is the programmatic entry
//! point and fills in the documented policy values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::error::ConfigError;

pub const CONFIG_ENV: &str = "TRADEWIRE_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    pub api_base_url: String,
    pub ws_url: String,
    /// Sent as `X-Client` on every request.
    pub client_id: String,
    pub request_timeout_ms: u64,
    pub max_concurrent_requests: usize,
    pub credentials_path: Option<PathBuf>,
    pub auth: AuthConfig,
    pub retry: BackoffConfig,
    pub reconnect: BackoffConfig,
    pub default_topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub login_path: String,
    pub register_path: String,
    pub refresh_path: String,
    pub logout_path: String,
    pub me_path: String,
    /// Paths that never trigger a token refresh when they return 401.
    pub exempt_paths: Vec<String>,
    pub refresh_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub cap_ms: u64,
    pub max_attempts: u32,
}

impl BackoffConfig {
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.base_ms),
            Duration::from_millis(self.cap_ms),
            self.max_attempts,
        )
    }

    fn from_policy(policy: BackoffPolicy) -> Self {
        Self {
            base_ms: policy.base().as_millis() as u64,
            cap_ms: policy.cap().as_millis() as u64,
            max_attempts: policy.max_attempts(),
        }
    }

    /// `fields` names base, cap and max attempts for error reporting.
    fn validate(&self, fields: [&'static str; 3]) -> Result<(), ConfigError> {
        let [base_field, cap_field, attempts_field] = fields;
        if self.base_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: base_field,
                reason: "must be > 0".to_string(),
            });
        }
        if self.cap_ms < self.base_ms {
            return Err(ConfigError::InvalidValue {
                field: cap_field,
                reason: "must be >= base_ms".to_string(),
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: attempts_field,
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

impl AuthConfig {
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    /// Whether a 401 on `path` must not trigger a refresh.
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.iter().any(|exempt| path.contains(exempt.as_str()))
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_path: "/api/auth/login".to_string(),
            register_path: "/api/auth/register".to_string(),
            refresh_path: "/api/auth/refresh".to_string(),
            logout_path: "/api/auth/logout".to_string(),
            me_path: "/api/auth/me".to_string(),
            exempt_paths: vec![
                "/api/auth/login".to_string(),
                "/api/auth/register".to_string(),
                "/api/auth/refresh".to_string(),
            ],
            refresh_timeout_ms: 10_000,
        }
    }
}

impl RuntimeConfig {
    /// Configuration with the standard retry, reconnect and auth policy.
    pub fn new(
        api_base_url: impl Into<String>,
        ws_url: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ws_url: ws_url.into(),
            client_id: client_id.into(),
            request_timeout_ms: 30_000,
            max_concurrent_requests: 16,
            credentials_path: None,
            auth: AuthConfig::default(),
            retry: BackoffConfig::from_policy(BackoffPolicy::request_retry()),
            reconnect: BackoffConfig::from_policy(BackoffPolicy::reconnect()),
            default_topics: vec!["market_overview".to_string(), "bist30_prices".to_string()],
        }
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::locate()?)
    }

    /// Resolve the config file from `--config <path>` or `TRADEWIRE_CONFIG`.
    pub fn locate() -> Result<PathBuf, ConfigError> {
        config_path_from_args()
            .or_else(config_path_from_env)
            .ok_or(ConfigError::MissingConfigPath)
    }

    /// Read, parse and validate the file at `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::from_path(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must be an http(s) URL".to_string(),
            });
        }
        if !self.ws_url.starts_with("ws://") && !self.ws_url.starts_with("wss://") {
            return Err(ConfigError::InvalidValue {
                field: "ws_url",
                reason: "must be a ws(s) URL".to_string(),
            });
        }
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "client_id",
                reason: "must not be empty".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrent_requests",
                reason: "must be > 0".to_string(),
            });
        }
        if let Some(path) = &self.credentials_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "credentials_path",
                    reason: "must not be empty when set".to_string(),
                });
            }
        }
        if !self.auth.refresh_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "auth.refresh_path",
                reason: "must start with '/'".to_string(),
            });
        }
        if !self.auth.is_exempt(&self.auth.refresh_path) {
            return Err(ConfigError::InvalidValue {
                field: "auth.exempt_paths",
                reason: "must cover auth.refresh_path".to_string(),
            });
        }
        if self.auth.refresh_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "auth.refresh_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        self.retry
            .validate(["retry.base_ms", "retry.cap_ms", "retry.max_attempts"])?;
        self.reconnect.validate([
            "reconnect.base_ms",
            "reconnect.cap_ms",
            "reconnect.max_attempts",
        ])?;
        if self.default_topics.iter().any(|topic| topic.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "default_topics",
                reason: "topics must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV).ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> RuntimeConfig {
        RuntimeConfig::new("https://api.example.com", "wss://api.example.com/ws", "tradewire/0.3")
    }

    #[test]
    fn test_defaults_match_policy() {
        let config = base_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.policy(), BackoffPolicy::request_retry());
        assert_eq!(config.reconnect.policy(), BackoffPolicy::reconnect());
        assert!(config.auth.is_exempt("/api/auth/login"));
        assert!(!config.auth.is_exempt("/api/signals/daily-picks"));
    }

    #[test]
    fn test_config_requires_ws_scheme() {
        let mut config = base_config();
        config.ws_url = "https://api.example.com/ws".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "ws_url", .. }));
    }

    #[test]
    fn test_config_rejects_cap_below_base() {
        let mut config = base_config();
        config.reconnect.cap_ms = 1;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "reconnect.cap_ms",
                ..
            }
        ));
    }

    #[test]
    fn test_refresh_path_must_be_exempt() {
        let mut config = base_config();
        config.auth.exempt_paths.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_roundtrip() {
        let config = base_config();
        let text = toml::to_string(&config).unwrap();
        let parsed = RuntimeConfig::from_toml(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_from_toml_rejects_unknown_fields() {
        let text = r#"
            api_base_url = "https://api.example.com"
            ws_url = "wss://api.example.com/ws"
            client_id = "x"
            request_timeout_ms = 1000
            max_concurrent_requests = 4
            default_topics = []
            surprise = true

            [auth]
            login_path = "/api/auth/login"
            register_path = "/api/auth/register"
            refresh_path = "/api/auth/refresh"
            logout_path = "/api/auth/logout"
            me_path = "/api/auth/me"
            exempt_paths = ["/api/auth/"]
            refresh_timeout_ms = 1000

            [retry]
            base_ms = 1000
            cap_ms = 4000
            max_attempts = 3

            [reconnect]
            base_ms = 2000
            cap_ms = 32000
            max_attempts = 5
        "#;
        assert!(matches!(
            RuntimeConfig::from_toml(text),
            Err(ConfigError::Parse(_))
        ));
    }
}
