//! Centralized path resolution for fnship
//!
//! # Environment Variables
//!
//! - `FNSHIP_STATE_DIR` - Override state directory
//! - `FNSHIP_CLOUD_DIR` - Override the local cloud directory
//!
//! # Path Resolution Priority
//!
//! For state_dir():
//! 1. `FNSHIP_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/fnship` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\fnship`
//!    - macOS/Linux: `~/.local/state/fnship`
//!
//! For cloud_dir():
//! 1. `FNSHIP_CLOUD_DIR` environment variable
//! 2. `[provider].root` from the project configuration
//! 3. `~/.local/share/fnship/cloud`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "FNSHIP_STATE_DIR";

/// Environment variable for local cloud directory override
pub const ENV_CLOUD_DIR: &str = "FNSHIP_CLOUD_DIR";

/// Get the fnship state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join("fnship");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(local_app_data) = dirs::data_local_dir() {
            let path = local_app_data.join("fnship");
            log::debug!("Using Windows state dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join("fnship");
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Get the local cloud directory, preferring the environment over `configured`
pub fn cloud_dir(configured: Option<&Path>) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CLOUD_DIR) {
        let path = expand(&dir);
        log::debug!("Using cloud dir from {}: {}", ENV_CLOUD_DIR, path.display());
        return Ok(path);
    }

    if let Some(path) = configured {
        log::debug!("Using cloud dir from config: {}", path.display());
        return Ok(path.to_path_buf());
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("share").join("fnship").join("cloud");
    log::debug!("Using default cloud dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Expand `path` and anchor it at `base` when relative
pub fn resolve(base: &Path, path: &str) -> PathBuf {
    let expanded = expand(path);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

// ============================================================================
// Tests
// ============================================================================
