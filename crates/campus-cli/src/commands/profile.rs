use anyhow::Result;
use campus_application::SessionRuntime;

use super::utils::user_facing;

pub async fn show(runtime: &SessionRuntime, with_sessions: bool) -> Result<()> {
    let auth = runtime.auth();
    let profile = auth.profile().await.map_err(user_facing)?;

    println!("👤 {}", profile.name);
    println!("   role: {}", profile.role);
    if let Some(contact) = profile.contact() {
        println!("   contact: {}", contact);
    }
    if let Some(created_at) = profile.created_at {
        println!("   member since: {}", created_at.format("%Y-%m-%d"));
    }

    if with_sessions {
        let sessions = auth.sessions().await.map_err(user_facing)?;
        println!("\n📱 Active sessions ({})", sessions.len());
        for session in sessions {
            let last_active = session
                .last_active
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  - {} ({}) last active {}",
                session.device.as_deref().unwrap_or("Unknown device"),
                session.ip.as_deref().unwrap_or("?"),
                last_active
            );
        }
    }

    Ok(())
}
