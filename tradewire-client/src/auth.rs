//! Login, registration, logout and profile calls.
//!
//! The backend has shipped several envelope shapes over time. Tokens may sit
//! at the top level (`token` or `access_token`) or under `data`; errors carry
//! `message` or `detail`. Parsing accepts all of them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tradewire_core::{CredentialStore, UserProfile};

use crate::error::{ClientError, ClientResult, RefreshError};
use crate::pipeline::RequestPipeline;
use crate::transport::HttpRequest;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserPayload {
    email: Option<String>,
    full_name: Option<String>,
    #[serde(rename = "fullName")]
    full_name_camel: Option<String>,
    name: Option<String>,
}

impl UserPayload {
    fn into_profile(self) -> Option<UserProfile> {
        let email = non_blank(self.email)?;
        let name = [self.full_name_camel, self.full_name, self.name]
            .into_iter()
            .find_map(non_blank)
            .unwrap_or_default();
        Some(UserProfile { email, name })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AuthData {
    access_token: Option<String>,
    refresh_token: Option<String>,
    user: Option<UserPayload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AuthEnvelope {
    success: Option<bool>,
    token: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    user: Option<UserPayload>,
    data: Option<AuthData>,
    message: Option<String>,
    detail: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl AuthEnvelope {
    fn into_response(self) -> AuthResponse {
        let data = self.data.unwrap_or_default();
        let access_token = non_blank(self.token)
            .or_else(|| non_blank(data.access_token))
            .or_else(|| non_blank(self.access_token));
        let refresh_token = non_blank(data.refresh_token).or_else(|| non_blank(self.refresh_token));
        let user = data.user.or(self.user).and_then(UserPayload::into_profile);
        let message = non_blank(self.message)
            .or_else(|| non_blank(self.detail))
            .unwrap_or_default();
        AuthResponse {
            success: self.success.unwrap_or(false),
            access_token,
            refresh_token,
            user,
            message,
        }
    }
}

/// Parsed login/register response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub success: bool,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<UserProfile>,
    pub message: String,
}

impl AuthResponse {
    pub fn from_body(body: &[u8]) -> ClientResult<Self> {
        let envelope: AuthEnvelope = serde_json::from_slice(body)?;
        Ok(envelope.into_response())
    }

    /// A response establishes a session only when it reports success and
    /// carries a non-blank token.
    pub fn is_authenticated(&self) -> bool {
        self.success && self.access_token.is_some()
    }
}

/// Tokens returned by the refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl TokenPair {
    pub(crate) fn from_body(body: &[u8]) -> Result<Self, RefreshError> {
        let envelope: AuthEnvelope =
            serde_json::from_slice(body).map_err(|err| RefreshError::Malformed(err.to_string()))?;
        let response = envelope.into_response();
        let access_token = response
            .access_token
            .ok_or_else(|| RefreshError::Malformed("missing access token".to_string()))?;
        Ok(Self {
            access_token,
            refresh_token: response.refresh_token,
        })
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
    password: &'a str,
    full_name: &'a str,
}

/// Session lifecycle calls on top of the request pipeline.
#[derive(Debug, Clone)]
pub struct AuthApi {
    pipeline: Arc<RequestPipeline>,
}

impl AuthApi {
    pub fn new(pipeline: Arc<RequestPipeline>) -> Self {
        Self { pipeline }
    }

    fn credentials(&self) -> &Arc<CredentialStore> {
        self.pipeline.credentials()
    }

    pub async fn login(&self, email: &str, password: &str) -> ClientResult<AuthResponse> {
        let path = self.pipeline.auth_config().login_path.clone();
        let request = HttpRequest::post(path).json(&LoginRequest { email, password })?;
        self.authenticate(request).await
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> ClientResult<AuthResponse> {
        let path = self.pipeline.auth_config().register_path.clone();
        let request = HttpRequest::post(path).json(&RegisterRequest {
            email,
            password,
            full_name,
        })?;
        self.authenticate(request).await
    }

    async fn authenticate(&self, request: HttpRequest) -> ClientResult<AuthResponse> {
        let response = self.pipeline.execute(request).await?;
        let parsed = AuthResponse::from_body(&response.body)?;
        if let (true, Some(access_token)) = (parsed.success, parsed.access_token.clone()) {
            self.credentials()
                .save_session(access_token, parsed.refresh_token.clone(), parsed.user.clone())
                .await;
            tracing::info!(has_user = parsed.user.is_some(), "Session established");
        } else {
            tracing::debug!(message = %parsed.message, "Authentication response without session");
        }
        Ok(parsed)
    }

    /// Server-side logout is best effort; local credentials are always cleared.
    pub async fn logout(&self) {
        let path = self.pipeline.auth_config().logout_path.clone();
        if let Err(err) = self.pipeline.execute(HttpRequest::post(path)).await {
            tracing::warn!(error = %err, "Server logout failed; clearing local session anyway");
        }
        self.credentials().clear().await;
        tracing::info!("Logged out");
    }

    /// Fetch the signed-in user's profile and remember it.
    pub async fn current_user(&self) -> ClientResult<UserProfile> {
        let path = self.pipeline.auth_config().me_path.clone();
        let response = self.pipeline.execute(HttpRequest::get(path)).await?;
        let value: serde_json::Value = response.json()?;
        let profile = extract_profile(value).ok_or_else(|| ClientError::Http {
            status: response.status,
            detail: "profile response without user".to_string(),
        })?;
        self.credentials().save_user(profile.clone()).await;
        Ok(profile)
    }
}

fn extract_profile(value: serde_json::Value) -> Option<UserProfile> {
    let candidates = [
        value.pointer("/data/user").cloned(),
        value.get("user").cloned(),
        value.get("data").cloned(),
        Some(value),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter_map(|candidate| serde_json::from_value::<UserPayload>(candidate).ok())
        .find_map(UserPayload::into_profile)
}
