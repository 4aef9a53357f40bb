//! Error types for the network-access runtime.

use thiserror::Error;
use tradewire_core::ConfigError;

/// Failure of a single transport call, before any retry policy applies.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Transport timed out")]
    Timeout,

    #[error("Request could not be built: {0}")]
    Request(String),
}

impl TransportError {
    /// Connectivity failures are retried; malformed requests are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_builder() {
            Self::Request(err.to_string())
        } else {
            Self::Connect(err.to_string())
        }
    }
}

/// Streaming socket errors. Never surfaced to callers of the streaming
/// client; they only drive reconnect decisions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SocketError {
    #[error("Socket connect failed: {0}")]
    Connect(String),

    #[error("Invalid socket request: {0}")]
    InvalidRequest(String),

    #[error("Socket closed")]
    Closed,
}

/// Outcome of a failed token refresh. Cloned to every waiter of the
/// in-flight refresh.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Refresh rejected with status {status}")]
    Rejected { status: u16 },

    #[error("Refresh transport failed: {0}")]
    Transport(TransportError),

    #[error("Refresh timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Malformed refresh response: {0}")]
    Malformed(String),

    #[error("Session changed while the refresh was in flight")]
    Superseded,

    #[error("Refresh task ended abnormally: {0}")]
    Aborted(String),
}

/// Coarse classification used by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connectivity or 5xx, already retried.
    Transient,
    /// The session is gone; the user has to sign in again.
    AuthExpired,
    /// 4xx other than 401.
    Client,
    /// 5xx that was not retried.
    Server,
    /// Failure inside this process (encoding, config).
    Local,
}

/// Errors returned by the request pipeline and the APIs built on it.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Connection failed after {attempts} attempt(s): {reason}")]
    Connectivity { attempts: u32, reason: String },

    #[error("Session expired: {0}")]
    SessionExpired(#[from] RefreshError),

    #[error("HTTP {status}: {detail}")]
    Http { status: u16, detail: String },

    #[error("Request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("JSON encoding error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Request(reason) => Self::InvalidRequest(reason),
            other => Self::Connectivity {
                attempts: 1,
                reason: other.to_string(),
            },
        }
    }
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connectivity { .. } | Self::Timeout { .. } => ErrorKind::Transient,
            Self::SessionExpired(_) => ErrorKind::AuthExpired,
            Self::Http { status: 401, .. } => ErrorKind::AuthExpired,
            Self::Http { status, .. } if *status >= 500 => ErrorKind::Server,
            Self::Http { .. } => ErrorKind::Client,
            Self::Decode(_) | Self::InvalidRequest(_) | Self::Config(_) => ErrorKind::Local,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short message suitable for a toast or inline error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Connectivity { .. } => "Check your internet connection".to_string(),
            Self::Timeout { .. } => "The server did not respond, try again".to_string(),
            Self::SessionExpired(_) => "Your session has expired".to_string(),
            Self::Http { status, .. } => match status {
                401 => "Your session has expired".to_string(),
                403 => "You are not allowed to do this".to_string(),
                404 => "The requested data was not found".to_string(),
                429 => "Too many requests, please wait".to_string(),
                500..=599 => format!("Server error ({})", status),
                _ => format!("Error: {}", status),
            },
            Self::Decode(_) | Self::InvalidRequest(_) | Self::Config(_) => {
                "An unexpected error occurred".to_string()
            }
        }
    }
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let expired = ClientError::SessionExpired(RefreshError::Rejected { status: 401 });
        assert_eq!(expired.kind(), ErrorKind::AuthExpired);

        let not_found = ClientError::Http {
            status: 404,
            detail: "missing".to_string(),
        };
        assert_eq!(not_found.kind(), ErrorKind::Client);
        assert_eq!(not_found.status(), Some(404));

        let server = ClientError::Http {
            status: 500,
            detail: String::new(),
        };
        assert_eq!(server.kind(), ErrorKind::Server);

        let offline = ClientError::Connectivity {
            attempts: 3,
            reason: "HTTP 503".to_string(),
        };
        assert_eq!(offline.kind(), ErrorKind::Transient);
    }

    #[test]
    fn test_user_messages() {
        let forbidden = ClientError::Http {
            status: 403,
            detail: String::new(),
        };
        assert_eq!(forbidden.user_message(), "You are not allowed to do this");

        let bad_gateway = ClientError::Http {
            status: 502,
            detail: String::new(),
        };
        assert_eq!(bad_gateway.user_message(), "Server error (502)");
    }

    #[test]
    fn test_transport_error_conversion() {
        let err: ClientError = TransportError::Request("bad header".to_string()).into();
        assert!(matches!(err, ClientError::InvalidRequest(_)));

        let err: ClientError = TransportError::Timeout.into();
        assert!(matches!(err, ClientError::Connectivity { attempts: 1, .. }));
        assert!(TransportError::Timeout.is_retryable());
        assert!(!TransportError::Request(String::new()).is_retryable());
    }
}
