use std::path::PathBuf;

use anyhow::Result;
use campus_core::session::Role;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

/// Log filter, e.g. `CAMPUS_LOG=campus_application=debug`.
const LOG_ENV: &str = "CAMPUS_LOG";

#[derive(Parser)]
#[command(name = "campus")]
#[command(about = "Campus CLI - sign in to the campus backend and inspect the session", long_about = None)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current session
    Status,
    /// Log in with email (student, admin) or phone (driver)
    Login {
        #[arg(long)]
        role: Role,
        /// Email or phone number, depending on the role
        #[arg(long)]
        contact: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        role: Role,
        #[arg(long)]
        contact: String,
        #[arg(long)]
        password: String,
    },
    /// Log out and forget the stored token
    Logout,
    /// Show the account profile
    Profile {
        /// Also list signed-in devices
        #[arg(long)]
        sessions: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let runtime = commands::utils::start_runtime(cli.config).await?;

    let outcome = match cli.command {
        Commands::Status => {
            commands::status::show(&runtime);
            Ok(())
        }
        Commands::Login {
            role,
            contact,
            password,
        } => commands::auth::login(&runtime, role, contact, password).await,
        Commands::Signup {
            name,
            role,
            contact,
            password,
        } => commands::auth::signup(&runtime, name, role, contact, password).await,
        Commands::Logout => {
            commands::auth::logout(&runtime).await;
            Ok(())
        }
        Commands::Profile { sessions } => commands::profile::show(&runtime, sessions).await,
    };

    runtime.shutdown().await;
    outcome
}
