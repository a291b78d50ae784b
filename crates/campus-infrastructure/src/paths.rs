//! Path management for campus client files.
//!
//! ```text
//! ~/.config/campus/            # Config directory
//! └── config.toml              # Client configuration
//!
//! ~/.local/share/campus/       # Data directory
//! └── session.toml             # Durable token/role pair
//! ```

use std::path::PathBuf;

const APP_DIR: &str = "campus";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Home directory could not be determined.
    HomeDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::HomeDirNotFound => write!(f, "Cannot find home directory"),
        }
    }
}

impl std::error::Error for PathError {}

/// Platform path resolution (XDG on Linux, the usual locations elsewhere).
pub struct CampusPaths;

impl CampusPaths {
    /// Returns the campus configuration directory, e.g. `~/.config/campus/`.
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::HomeDirNotFound)
    }

    /// Returns the campus data directory, e.g. `~/.local/share/campus/`.
    pub fn data_dir() -> Result<PathBuf, PathError> {
        dirs::data_local_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::HomeDirNotFound)
    }

    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Returns the path to the durable session file.
    pub fn session_file() -> Result<PathBuf, PathError> {
        Ok(Self::data_dir()?.join("session.toml"))
    }
}
