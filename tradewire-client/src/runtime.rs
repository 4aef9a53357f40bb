//! Wiring of the runtime components from a [`RuntimeConfig`].

use std::sync::Arc;

use serde_json::Value;
use tradewire_core::{
    CredentialStore, DurableStore, JsonFileStore, MemoryStore, RuntimeConfig, Sleeper,
    TokioSleeper, TtlCache,
};

use crate::auth::AuthApi;
use crate::error::ClientResult;
use crate::pipeline::RequestPipeline;
use crate::query::CachedQuery;
use crate::streaming::{SocketConnector, StreamingClient, StreamingOptions, TungsteniteConnector};
use crate::transport::{HttpTransport, ReqwestTransport};

/// Everything a presentation layer needs, sharing one credential store.
#[derive(Debug, Clone)]
pub struct NetworkRuntime {
    config: RuntimeConfig,
    credentials: Arc<CredentialStore>,
    cache: Arc<TtlCache<Value>>,
    pipeline: Arc<RequestPipeline>,
    auth: AuthApi,
    queries: CachedQuery,
    streaming: StreamingClient,
}

impl NetworkRuntime {
    /// Build the production runtime: reqwest transport, WebSocket connector,
    /// JSON file credentials when `credentials_path` is set.
    pub async fn from_config(config: RuntimeConfig) -> ClientResult<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(&config.api_base_url, config.request_timeout())?;
        let durable: Arc<dyn DurableStore> = match &config.credentials_path {
            Some(path) => Arc::new(JsonFileStore::new(path)),
            None => Arc::new(MemoryStore::new()),
        };
        Self::with_parts(
            config,
            Arc::new(transport),
            Arc::new(TungsteniteConnector),
            durable,
            Arc::new(TokioSleeper),
        )
        .await
    }

    /// Build a runtime on explicit collaborators.
    pub async fn with_parts(
        config: RuntimeConfig,
        transport: Arc<dyn HttpTransport>,
        connector: Arc<dyn SocketConnector>,
        durable: Arc<dyn DurableStore>,
        sleeper: Arc<dyn Sleeper>,
    ) -> ClientResult<Self> {
        config.validate()?;
        let credentials = Arc::new(CredentialStore::load(durable).await);
        let cache = Arc::new(TtlCache::new());
        let pipeline = Arc::new(RequestPipeline::new(
            &config,
            transport,
            Arc::clone(&credentials),
            Arc::clone(&sleeper),
        ));
        let streaming = StreamingClient::new(
            StreamingOptions::from_config(&config),
            connector,
            Arc::clone(&credentials),
            sleeper,
        );

        tracing::info!(
            api_base_url = %config.api_base_url,
            ws_url = %config.ws_url,
            logged_in = credentials.is_logged_in(),
            "Network runtime ready"
        );

        Ok(Self {
            auth: AuthApi::new(Arc::clone(&pipeline)),
            queries: CachedQuery::new(Arc::clone(&pipeline), Arc::clone(&cache)),
            config,
            credentials,
            cache,
            pipeline,
            streaming,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn cache(&self) -> &Arc<TtlCache<Value>> {
        &self.cache
    }

    pub fn pipeline(&self) -> &Arc<RequestPipeline> {
        &self.pipeline
    }

    pub fn auth(&self) -> &AuthApi {
        &self.auth
    }

    pub fn queries(&self) -> &CachedQuery {
        &self.queries
    }

    pub fn streaming(&self) -> &StreamingClient {
        &self.streaming
    }

    /// Log out and drop the streaming connection and every cached payload.
    pub async fn sign_out(&self) {
        self.streaming.disconnect();
        self.auth.logout().await;
        self.cache.clear();
    }
}
