//! Core types for function reconciliation

use packager::{ArchiveFormat, PackOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Environment variables, ordered so comparisons are structural
pub type EnvVars = BTreeMap<String, String>;

/// Default memory size in MB
pub const DEFAULT_MEMORY_MB: u32 = 128;

/// Default timeout in seconds
pub const DEFAULT_TIMEOUT_SEC: u32 = 3;

/// Region and account the reconciler operates in
///
/// Passed in explicitly; nothing in the engine reads the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub region: String,
    pub account_id: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            account_id: "000000000000".to_string(),
        }
    }
}

impl ProviderSettings {
    /// ARN of a function with this name
    pub fn function_arn(&self, name: &str) -> String {
        format!(
            "arn:aws:lambda:{}:{}:function:{}",
            self.region, self.account_id, name
        )
    }

    /// ARN of a role with this name
    pub fn role_arn(&self, name: &str) -> String {
        format!("arn:aws:iam::{}:role/{}", self.account_id, name)
    }

    /// ARN pattern covering the function's log group and streams
    pub fn log_group_arn(&self, function_name: &str) -> String {
        format!(
            "arn:aws:logs:{}:{}:log-group:/aws/lambda/{}:*",
            self.region, self.account_id, function_name
        )
    }
}

/// What the caller wants deployed, supplied fresh on every run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub memory_mb: u32,
    pub timeout_sec: u32,
    pub runtime: String,
    pub handler: String,
    #[serde(default)]
    pub env_vars: EnvVars,
    /// Explicit execution role; an execution role is managed when unset
    #[serde(default)]
    pub role_arn: Option<String>,
    /// Root of the source tree to package
    pub code_path: PathBuf,
    /// Extra files appended under their base name
    #[serde(default)]
    pub include: Vec<PathBuf>,
    /// Glob patterns left out of the archive
    #[serde(default)]
    pub exclude: Vec<String>,
    /// In-archive directory prefix
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub format: ArchiveFormat,
    /// Where to keep the archive; a temporary file removed after the run when unset
    #[serde(default)]
    pub artifact_path: Option<PathBuf>,
    /// Upload code through this bucket instead of inline
    #[serde(default)]
    pub bucket: Option<String>,
    /// Pre-built dependency layer to attach
    #[serde(default)]
    pub layer_ref: Option<String>,
    /// Directory packaged as a dependency layer (needs a bucket)
    #[serde(default)]
    pub dependencies: Option<PathBuf>,
    /// Publish a version after any change
    #[serde(default)]
    pub publish: bool,
}

impl DesiredConfig {
    /// Create a config with default memory and timeout
    pub fn new(
        name: impl Into<String>,
        runtime: impl Into<String>,
        handler: impl Into<String>,
        code_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            memory_mb: DEFAULT_MEMORY_MB,
            timeout_sec: DEFAULT_TIMEOUT_SEC,
            runtime: runtime.into(),
            handler: handler.into(),
            env_vars: EnvVars::new(),
            role_arn: None,
            code_path: code_path.into(),
            include: Vec::new(),
            exclude: Vec::new(),
            prefix: None,
            format: ArchiveFormat::default(),
            artifact_path: None,
            bucket: None,
            layer_ref: None,
            dependencies: None,
            publish: false,
        }
    }

    /// Archiver options for the main code artifact
    pub fn pack_options(&self) -> PackOptions {
        let mut options = PackOptions::new(&self.code_path)
            .exclude(self.exclude.iter().cloned())
            .format(self.format);
        for include in &self.include {
            options = options.include(include);
        }
        if let Some(prefix) = &self.prefix {
            options = options.prefix(prefix);
        }
        if let Some(path) = &self.artifact_path {
            options = options.destination(path);
        }
        options
    }

    /// Combine with the resolved role and artifact into the comparable set
    pub fn resolve(&self, role_arn: &str, content_hash: &str, layers: Vec<String>) -> FunctionConfig {
        FunctionConfig {
            name: self.name.clone(),
            description: normalize(&self.description),
            runtime: normalize(&self.runtime),
            role_arn: normalize(role_arn),
            handler: normalize(&self.handler),
            memory_mb: self.memory_mb,
            timeout_sec: self.timeout_sec,
            env_vars: self.env_vars.clone(),
            content_hash: content_hash.to_string(),
            layers,
        }
    }
}

/// Fully resolved function configuration, as sent to the provider
///
/// Every field except `name` and `layers` takes part in change detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionConfig {
    pub name: String,
    pub description: String,
    pub runtime: String,
    pub role_arn: String,
    pub handler: String,
    pub memory_mb: u32,
    pub timeout_sec: u32,
    pub env_vars: EnvVars,
    pub content_hash: String,
    #[serde(default)]
    pub layers: Vec<String>,
}

/// The deployed function as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub timeout_sec: u32,
    pub runtime: String,
    pub role_arn: String,
    pub handler: String,
    pub memory_mb: u32,
    pub content_hash: String,
    #[serde(default)]
    pub env_vars: EnvVars,
    pub arn: String,
    #[serde(default)]
    pub layers: Vec<String>,
}

impl RemoteRecord {
    /// Build the record a provider would report for `config`
    pub fn from_config(config: &FunctionConfig, arn: impl Into<String>) -> Self {
        Self {
            name: config.name.clone(),
            description: config.description.clone(),
            timeout_sec: config.timeout_sec,
            runtime: config.runtime.clone(),
            role_arn: config.role_arn.clone(),
            handler: config.handler.clone(),
            memory_mb: config.memory_mb,
            content_hash: config.content_hash.clone(),
            env_vars: config.env_vars.clone(),
            arn: arn.into(),
            layers: config.layers.clone(),
        }
    }

    /// Trim provider noise so records compare structurally
    pub fn normalized(mut self) -> Self {
        self.description = normalize(&self.description);
        self.runtime = normalize(&self.runtime);
        self.handler = normalize(&self.handler);
        self.role_arn = normalize(&self.role_arn);
        self
    }
}

/// Canonical form of a compared text field, applied to desired and remote alike
pub fn normalize(value: &str) -> String {
    value.trim().to_string()
}

/// What a successful run leaves behind for the next one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub memory_mb: u32,
    pub timeout_sec: u32,
    pub runtime: String,
    pub handler: String,
    /// Role the function runs under
    pub role_arn: String,
    /// Set when the role was created by the reconciler
    #[serde(default)]
    pub auto_role_arn: Option<String>,
    pub arn: String,
    /// Hash of the deployed code as reported by the provider
    pub content_hash: String,
    #[serde(default)]
    pub layers: Vec<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub object_key: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Hash of the dependency tree behind `dependency_layer`
    #[serde(default)]
    pub dependencies_hash: Option<String>,
    /// Layer last built from the dependency tree
    #[serde(default)]
    pub dependency_layer: Option<String>,
    /// Must stay last: TOML emits tables after plain values
    #[serde(default)]
    pub env_vars: EnvVars,
}

/// How code reaches the provider
#[derive(Clone, PartialEq, Eq)]
pub enum CodeSource {
    /// Archive bytes sent with the request
    Inline(Vec<u8>),
    /// Archive previously uploaded to object storage
    Object { bucket: String, key: String },
}

impl fmt::Debug for CodeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(bytes) => write!(f, "Inline({} bytes)", bytes.len()),
            Self::Object { bucket, key } => write!(f, "Object(s3://{}/{})", bucket, key),
        }
    }
}

/// An execution role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub arn: String,
}

/// Action chosen by the diff engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Function does not exist yet
    Create,
    /// Remote already matches desired
    NoOp,
    /// Code hash differs: replace code, then update configuration if needed
    UpdateCodeAndConfig,
    /// Only configuration fields differ
    UpdateConfigOnly,
    /// The function name changed: converge under the new name, then delete the old one
    Replace { old_name: String, then: Box<Action> },
}

impl Action {
    /// Short name for logging/display
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::NoOp => "no-op",
            Self::UpdateCodeAndConfig => "update-code-and-config",
            Self::UpdateConfigOnly => "update-config-only",
            Self::Replace { .. } => "replace",
        }
    }

    /// The action applied to the function under its desired name
    pub fn base(&self) -> &Action {
        match self {
            Self::Replace { then, .. } => then.base(),
            other => other,
        }
    }

    /// Name of the function being superseded, if any
    pub fn superseded(&self) -> Option<&str> {
        match self {
            Self::Replace { old_name, .. } => Some(old_name),
            _ => None,
        }
    }

    /// Whether artifact bytes must reach the provider
    pub fn needs_code(&self) -> bool {
        matches!(self.base(), Self::Create | Self::UpdateCodeAndConfig)
    }

    /// Whether the run issues no mutation calls at all
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp)
    }

    /// The same action, with a configuration update where it had none
    pub fn with_config_update(self) -> Action {
        match self {
            Self::NoOp => Self::UpdateConfigOnly,
            Self::Replace { old_name, then } => Self::Replace {
                old_name,
                then: Box::new(then.with_config_update()),
            },
            other => other,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace { old_name, then } => write!(f, "replace '{}' ({})", old_name, then),
            other => f.write_str(other.name()),
        }
    }
}

/// Reconciliation stages, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    NotDeployed,
    RoleReady,
    Packaged,
    CodePlaced,
    Configured,
    Published,
    Removed,
}

impl Stage {
    /// Human-readable stage name for logging/display
    pub fn name(&self) -> &'static str {
        match self {
            Self::NotDeployed => "not-deployed",
            Self::RoleReady => "role-ready",
            Self::Packaged => "packaged",
            Self::CodePlaced => "code-placed",
            Self::Configured => "configured",
            Self::Published => "published",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A side effect issued during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    RoleCreated { arn: String },
    RoleRemoved { arn: String },
    Packaged { content_hash: String, entries: usize },
    LayerPackaged { layer: String },
    Uploaded { bucket: String, key: String },
    Created { arn: String },
    CodeUpdated { content_hash: String },
    ConfigurationUpdated { fields: Vec<String> },
    VersionPublished { version: String },
    Deleted { name: String },
}

impl Operation {
    /// Whether this only touched the local filesystem
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Packaged { .. })
    }

    /// Whether this changed anything on the compute provider
    pub fn is_function_mutation(&self) -> bool {
        matches!(
            self,
            Self::Created { .. }
                | Self::CodeUpdated { .. }
                | Self::ConfigurationUpdated { .. }
                | Self::VersionPublished { .. }
                | Self::Deleted { .. }
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoleCreated { arn } => write!(f, "created execution role {}", arn),
            Self::RoleRemoved { arn } => write!(f, "removed execution role {}", arn),
            Self::Packaged {
                content_hash,
                entries,
            } => write!(f, "packaged {} entries ({})", entries, short(content_hash)),
            Self::LayerPackaged { layer } => write!(f, "dependency layer {}", layer),
            Self::Uploaded { bucket, key } => write!(f, "uploaded s3://{}/{}", bucket, key),
            Self::Created { arn } => write!(f, "created {}", arn),
            Self::CodeUpdated { content_hash } => {
                write!(f, "updated code ({})", short(content_hash))
            }
            Self::ConfigurationUpdated { fields } => {
                write!(f, "updated configuration: {}", fields.join(", "))
            }
            Self::VersionPublished { version } => write!(f, "published version {}", version),
            Self::Deleted { name } => write!(f, "deleted function {}", name),
        }
    }
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_arns() {
        let settings = ProviderSettings::default();
        assert_eq!(
            settings.function_arn("fn1"),
            "arn:aws:lambda:us-east-1:000000000000:function:fn1"
        );
        assert_eq!(
            settings.role_arn("fn1-execution-role"),
            "arn:aws:iam::000000000000:role/fn1-execution-role"
        );
        assert_eq!(
            settings.log_group_arn("fn1"),
            "arn:aws:logs:us-east-1:000000000000:log-group:/aws/lambda/fn1:*"
        );
    }

    #[test]
    fn test_action_base_and_superseded() {
        let action = Action::Replace {
            old_name: "old".into(),
            then: Box::new(Action::Create),
        };
        assert_eq!(action.base(), &Action::Create);
        assert_eq!(action.superseded(), Some("old"));
        assert!(action.needs_code());
        assert!(!action.is_noop());
        assert!(!Action::UpdateConfigOnly.needs_code());
        assert_eq!(action.to_string(), "replace 'old' (create)");
    }

    #[test]
    fn test_stage_order() {
        assert!(Stage::NotDeployed < Stage::RoleReady);
        assert!(Stage::Configured < Stage::Published);
    }

    #[test]
    fn test_pack_options_from_config() {
        let mut config = DesiredConfig::new("fn1", "python3.12", "app.handler", "./src");
        config.exclude = vec!["*.pyc".into()];
        config.prefix = Some("python".into());
        config.include = vec!["shim.py".into()];

        let options = config.pack_options();
        assert_eq!(options.exclude, vec!["*.pyc".to_string()]);
        assert_eq!(options.prefix.as_deref(), Some("python"));
        assert_eq!(options.include, vec![PathBuf::from("shim.py")]);
        assert!(options.destination.is_none());
    }

    #[test]
    fn test_resolve_normalizes_like_remote() {
        let mut desired = DesiredConfig::new("fn1", " python3.12", "app.handler ", ".");
        desired.description = "my function ".into();
        let config = desired.resolve(" arn:role", "h", Vec::new());

        assert_eq!(config.description, "my function");
        assert_eq!(config.runtime, "python3.12");
        assert_eq!(config.handler, "app.handler");
        assert_eq!(config.role_arn, "arn:role");

        let remote = RemoteRecord::from_config(&config, "arn").normalized();
        assert_eq!(remote.description, config.description);
    }

    #[test]
    fn test_remote_record_normalized() {
        let config = DesiredConfig::new("fn1", "python3.12", "app.handler", "./src")
            .resolve("arn:role", "H1", Vec::new());
        let mut record = RemoteRecord::from_config(&config, "arn:fn");
        record.description = "  hello ".into();
        assert_eq!(record.normalized().description, "hello");
    }

    #[test]
    fn test_code_source_debug_hides_bytes() {
        let code = CodeSource::Inline(vec![0; 2048]);
        assert_eq!(format!("{:?}", code), "Inline(2048 bytes)");
    }
}
