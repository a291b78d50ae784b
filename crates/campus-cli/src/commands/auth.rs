use anyhow::Result;
use campus_application::SessionRuntime;
use campus_core::auth::SignupRequest;
use campus_core::session::Role;

use super::utils::{credentials, user_facing};

pub async fn login(runtime: &SessionRuntime, role: Role, contact: String, password: String) -> Result<()> {
    let identity = runtime
        .auth()
        .login(&credentials(role, contact, password))
        .await
        .map_err(user_facing)?;

    println!("✅ Login successful ({})", identity.role());
    Ok(())
}

pub async fn signup(
    runtime: &SessionRuntime,
    name: String,
    role: Role,
    contact: String,
    password: String,
) -> Result<()> {
    let request = SignupRequest::new(name, credentials(role, contact, password));
    runtime.auth().signup(&request).await.map_err(user_facing)?;

    println!("✅ Account created. Please login.");
    Ok(())
}

pub async fn logout(runtime: &SessionRuntime) {
    runtime.auth().logout().await;
    println!("👋 Logged out");
}
