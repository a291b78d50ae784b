use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use campus_application::SessionRuntime;
use campus_core::auth::{AuthError, Contact, Credentials};
use campus_core::session::Role;
use campus_infrastructure::{ChannelIdentityProvider, ConfigService};

/// Loads the configuration and starts the session runtime.
///
/// The CLI has no external identity SDK, so the provider never publishes and
/// the session comes from the stored token/role pair. The runtime owns the
/// provider, keeping the subscription open until shutdown.
pub async fn start_runtime(config_path: Option<PathBuf>) -> Result<SessionRuntime> {
    let service = match config_path {
        Some(path) => ConfigService::with_path(path),
        None => ConfigService::new(),
    };
    let config = service.get_config().context("Failed to load configuration")?;

    let provider = Arc::new(ChannelIdentityProvider::new());
    SessionRuntime::from_config(&config, provider)
        .await
        .context("Failed to start session runtime")
}

pub fn credentials(role: Role, contact: String, password: String) -> Credentials {
    let contact = if role.signs_in_with_phone() {
        Contact::Phone(contact)
    } else {
        Contact::Email(contact)
    };
    Credentials::new(role, contact, password)
}

/// Turns an auth error into the message a user should see.
pub fn user_facing(err: AuthError) -> anyhow::Error {
    tracing::debug!("auth error: {}", err);
    anyhow::anyhow!(err.user_message())
}
