//! Persisted deployment state
//!
//! One TOML document per stack, read whole at the start of a run and
//! written whole after a successful one.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::PersistedState;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// On-disk state document
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StateFile {
    /// Last time the state was written
    pub last_updated: DateTime<Utc>,
    /// The function as deployed by the last successful run
    pub function: PersistedState,
}

/// State store for one stack
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
    stack: String,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>, stack: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stack: stack.into(),
        }
    }

    /// Store for `stack` under the configured state directory
    pub fn open(stack: &str) -> Result<Self> {
        Ok(Self::new(crate::paths::state_dir()?, stack))
    }

    /// Get the state file path
    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.toml", self.stack))
    }

    /// Load state, or `None` if nothing has been deployed
    pub fn load(&self) -> Result<Option<StateFile>> {
        let path = self.path();

        if !path.exists() {
            log::debug!("State file does not exist: {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: StateFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state from {}", path.display());
        Ok(Some(state))
    }

    /// Save state, stamping the update time
    pub fn save(&self, function: &PersistedState) -> Result<StateFile> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create state directory: {}", self.dir.display()))?;

        let state = StateFile {
            last_updated: Utc::now(),
            function: function.clone(),
        };
        let path = self.path();
        let content = toml::to_string_pretty(&state).context("Failed to serialize state to TOML")?;

        // Write then rename: the state file is never half-written
        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, &content)
            .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(state)
    }

    /// Delete the state file, returning whether one existed
    pub fn remove(&self) -> Result<bool> {
        let path = self.path();
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .with_context(|| format!("Failed to remove state file: {}", path.display()))?;
        log::debug!("Removed state file {}", path.display());
        Ok(true)
    }
}
