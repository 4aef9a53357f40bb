//! Tradewire Client
//!
//! Resilient access to the trading backend: an authenticated, retrying HTTP
//! pipeline with single-flight token refresh, read-through cached queries and
//! a reconnecting streaming client.

pub mod auth;
pub mod error;
pub mod pipeline;
pub mod query;
pub mod refresh;
pub mod runtime;
pub mod streaming;
pub mod transport;

pub use auth::{AuthApi, AuthResponse};
pub use error::{ClientError, ClientResult, ErrorKind, RefreshError, SocketError, TransportError};
pub use pipeline::{AuthStep, RequestContext, RequestPipeline, RetryStep};
pub use query::CachedQuery;
pub use refresh::RefreshCoordinator;
pub use runtime::NetworkRuntime;
pub use streaming::{ConnectionStatus, StreamEvent, StreamingClient, StreamingOptions};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};
