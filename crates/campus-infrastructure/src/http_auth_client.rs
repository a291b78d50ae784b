//! HttpAuthClient - REST implementation of the campus auth backend port.
//!
//! Routes, relative to the configured base URL:
//! - `POST login`, `POST signup` with `{role, email|phone, password, name?}`
//! - `GET profile`, `GET sessions` with `Authorization: Bearer <token>`

use std::time::Duration;

use async_trait::async_trait;
use campus_core::auth::{AuthClient, AuthError, Credentials, DeviceSession, SignupRequest, UserProfile};
use campus_core::config::ClientConfig;
use campus_core::session::{Identity, IdentityError, Role};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const NOT_JSON: &str = "Backend did not return JSON. Check server response.";

/// Auth client that talks to the campus REST backend.
#[derive(Clone)]
pub struct HttpAuthClient {
    client: Client,
    base_url: String,
}

impl HttpAuthClient {
    /// Creates a client with the default request timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("auth client: falling back to default HTTP client: {}", e);
                Client::new()
            });
        Self::with_client(client, base_url)
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.api_base_url.clone())
    }

    /// Uses a preconfigured reqwest client.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        fallback: &str,
    ) -> Result<Value, AuthError> {
        let response = self
            .client
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        let text = response.text().await.map_err(network_error)?;
        tracing::debug!(%status, path, "auth backend responded");
        interpret_response(status, &text, fallback)
    }

    async fn get_authorized(&self, path: &str, token: &str, fallback: &str) -> Result<Value, AuthError> {
        let response = self
            .client
            .get(self.endpoint(path))
            .bearer_auth(token)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        let text = response.text().await.map_err(network_error)?;
        tracing::debug!(%status, path, "auth backend responded");
        interpret_response(status, &text, fallback)
    }
}

#[async_trait]
impl AuthClient for HttpAuthClient {
    async fn login(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        let data = self
            .post_json("login", &credentials.to_payload(None), "Login failed")
            .await?;
        identity_from_login(data, credentials.role)
    }

    async fn signup(&self, request: &SignupRequest) -> Result<(), AuthError> {
        self.post_json("signup", &request.to_payload(), "Signup failed")
            .await?;
        Ok(())
    }

    async fn profile(&self, token: &str) -> Result<UserProfile, AuthError> {
        let data = self
            .get_authorized("profile", token, "Failed to fetch profile")
            .await?;
        profile_from_body(data)
    }

    async fn sessions(&self, token: &str) -> Result<Vec<DeviceSession>, AuthError> {
        let data = self
            .get_authorized("sessions", token, "Failed to fetch sessions")
            .await?;
        sessions_from_body(data)
    }
}

fn network_error(err: reqwest::Error) -> AuthError {
    AuthError::Network(err.to_string())
}

/// Parses the body as JSON first, then checks the status.
///
/// A non-JSON body is an error regardless of status; on non-2xx the body's
/// `error` field (or `fallback`) becomes the message.
fn interpret_response(status: StatusCode, body: &str, fallback: &str) -> Result<Value, AuthError> {
    let data: Value = serde_json::from_str(body).map_err(|_| AuthError::invalid_response(NOT_JSON))?;

    if !status.is_success() {
        let message = data
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or(fallback)
            .to_string();
        return Err(AuthError::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    Ok(data)
}

#[derive(Deserialize)]
struct LoginBody {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Builds the session identity from `{token, role}`.
///
/// Older backends omit `role`; the requested role is used then.
fn identity_from_login(data: Value, requested: Role) -> Result<Identity, AuthError> {
    let body: LoginBody = serde_json::from_value(data)
        .map_err(|e| AuthError::invalid_response(format!("Unexpected login response: {e}")))?;

    let token = body
        .token
        .ok_or_else(|| AuthError::invalid_response("Login response is missing a token"))?;
    let identity = match body.role.as_deref() {
        Some(role) => Identity::parse(token, role),
        None => Identity::new(token, requested),
    }
    .map_err(|e| match e {
        IdentityError::EmptyToken => AuthError::invalid_response("Login response has an empty token"),
        IdentityError::Role(e) => AuthError::invalid_response(e.to_string()),
    })?;

    Ok(match body.name {
        Some(name) => identity.with_display_name(name),
        None => identity,
    })
}

fn profile_from_body(mut data: Value) -> Result<UserProfile, AuthError> {
    let user = data
        .get_mut("user")
        .map(Value::take)
        .ok_or_else(|| AuthError::invalid_response("Profile response is missing 'user'"))?;
    serde_json::from_value(user)
        .map_err(|e| AuthError::invalid_response(format!("Unexpected profile: {e}")))
}

fn sessions_from_body(mut data: Value) -> Result<Vec<DeviceSession>, AuthError> {
    match data.get_mut("sessions").map(Value::take) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(list) => serde_json::from_value(list)
            .map_err(|e| AuthError::invalid_response(format!("Unexpected sessions list: {e}"))),
    }
}
