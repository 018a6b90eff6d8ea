//! Project configuration (`fnship.toml`)
//!
//! ```toml
//! [function]
//! name = "hello"
//! runtime = "python3.12"
//! handler = "app.handler"
//! code = "src"
//! memory = 256
//! exclude = ["__pycache__", "*.pyc"]
//!
//! [function.environment]
//! STAGE = "prod"
//!
//! [provider]
//! region = "eu-west-1"
//! ```

use crate::paths;
use anyhow::{Context, Result};
use declarative::{DesiredConfig, EnvVars, ProviderSettings};
use packager::ArchiveFormat;
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

const MEMORY_RANGE: std::ops::RangeInclusive<u32> = 128..=10_240;
const TIMEOUT_RANGE: std::ops::RangeInclusive<u32> = 1..=900;

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("function name pattern is valid")
});

/// Configuration values that parse but cannot be deployed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid function name '{0}': use 1-64 letters, digits, '-' or '_'")]
    InvalidName(String),

    #[error("memory must be between {min} and {max} MB, got {value}")]
    MemoryOutOfRange { value: u32, min: u32, max: u32 },

    #[error("timeout must be between {min} and {max} seconds, got {value}")]
    TimeoutOutOfRange { value: u32, min: u32, max: u32 },

    #[error("runtime must not be empty")]
    MissingRuntime,

    #[error("handler must not be empty")]
    MissingHandler,
}

/// Parsed `fnship.toml`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    pub function: FunctionSection,
    #[serde(default)]
    pub provider: ProviderSection,
}

/// `[function]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionSection {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub runtime: String,
    pub handler: String,
    /// Memory in MB
    #[serde(default = "default_memory")]
    pub memory: u32,
    /// Timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u32,
    /// Explicit execution role ARN
    pub role: Option<String>,
    /// Source directory
    #[serde(default = "default_code")]
    pub code: String,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    pub prefix: Option<String>,
    #[serde(default)]
    pub format: ArchiveFormat,
    pub bucket: Option<String>,
    /// Pre-built layer reference
    pub layer: Option<String>,
    /// Directory packaged as a dependency layer
    pub dependencies: Option<String>,
    #[serde(default)]
    pub publish: bool,
    #[serde(default)]
    pub environment: EnvVars,
}

/// `[provider]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSection {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_account")]
    pub account_id: String,
    /// Local cloud directory
    pub root: Option<String>,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            region: default_region(),
            account_id: default_account(),
            root: None,
        }
    }
}

fn default_memory() -> u32 {
    declarative::types::DEFAULT_MEMORY_MB
}

fn default_timeout() -> u32 {
    declarative::types::DEFAULT_TIMEOUT_SEC
}

fn default_code() -> String {
    ".".to_string()
}

fn default_region() -> String {
    ProviderSettings::default().region
}

fn default_account() -> String {
    ProviderSettings::default().account_id
}

/// A loaded configuration plus the directory its relative paths are anchored to
#[derive(Debug, Clone)]
pub struct Project {
    pub config: ProjectConfig,
    pub base_dir: PathBuf,
}

impl Project {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = ProjectConfig::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        log::debug!("Loaded config from {}", path.display());

        Ok(Self { config, base_dir })
    }

    /// Desired configuration with paths resolved against the config directory
    pub fn desired(&self) -> DesiredConfig {
        let f = &self.config.function;
        let resolve = |p: &str| paths::resolve(&self.base_dir, p);

        let mut desired = DesiredConfig::new(&f.name, &f.runtime, &f.handler, resolve(&f.code));
        desired.description = f.description.clone();
        desired.memory_mb = f.memory;
        desired.timeout_sec = f.timeout;
        desired.env_vars = f.environment.clone();
        desired.role_arn = f.role.clone();
        desired.include = f.include.iter().map(|p| resolve(p)).collect();
        desired.exclude = f.exclude.clone();
        desired.prefix = f.prefix.clone();
        desired.format = f.format;
        desired.bucket = f.bucket.clone();
        desired.layer_ref = f.layer.clone();
        desired.dependencies = f.dependencies.as_deref().map(resolve);
        desired.publish = f.publish;
        desired
    }

    pub fn settings(&self) -> ProviderSettings {
        ProviderSettings {
            region: self.config.provider.region.clone(),
            account_id: self.config.provider.account_id.clone(),
        }
    }

    /// Configured local cloud directory, resolved
    pub fn cloud_root(&self) -> Option<PathBuf> {
        self.config
            .provider
            .root
            .as_deref()
            .map(|p| paths::resolve(&self.base_dir, p))
    }
}

impl ProjectConfig {
    /// Parse and validate TOML content
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let f = &self.function;

        if !NAME_PATTERN.is_match(&f.name) {
            return Err(ConfigError::InvalidName(f.name.clone()));
        }
        if f.runtime.trim().is_empty() {
            return Err(ConfigError::MissingRuntime);
        }
        if f.handler.trim().is_empty() {
            return Err(ConfigError::MissingHandler);
        }
        if !MEMORY_RANGE.contains(&f.memory) {
            return Err(ConfigError::MemoryOutOfRange {
                value: f.memory,
                min: *MEMORY_RANGE.start(),
                max: *MEMORY_RANGE.end(),
            });
        }
        if !TIMEOUT_RANGE.contains(&f.timeout) {
            return Err(ConfigError::TimeoutOutOfRange {
                value: f.timeout,
                min: *TIMEOUT_RANGE.start(),
                max: *TIMEOUT_RANGE.end(),
            });
        }
        Ok(())
    }
}
