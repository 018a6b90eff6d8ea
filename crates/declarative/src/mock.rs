//! In-memory cloud for testing without a provider
//!
//! [`MockCloud`] implements every collaborator trait, records each call
//! and can be told to fail specific operations:
//!
//! ```
//! use declarative::mock::MockCloud;
//! use declarative::ProviderError;
//!
//! let cloud = MockCloud::new();
//! cloud.fail_on("create_function", ProviderError::throttled("slow down"));
//! assert_eq!(cloud.mutation_count(), 0);
//! ```

use crate::context::{ComputeProvider, IdentityProvider, LayerPackager, ObjectStorage};
use crate::error::{ProviderError, ProviderResult};
use crate::types::{CodeSource, FunctionConfig, ProviderSettings, RemoteRecord, Role};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A recorded collaborator call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateFunction { name: String },
    UpdateFunctionCode { name: String },
    UpdateFunctionConfiguration { name: String },
    GetFunctionConfiguration { name: String },
    DeleteFunction { name: String },
    PublishVersion { name: String },
    CreateRole { name: String },
    GetRole { name: String },
    AttachRolePolicy { role: String, policy: String },
    DetachRolePolicy { role: String, policy: String },
    DeleteRole { name: String },
    Upload { bucket: String, path: PathBuf },
    PackageLayer { name: String },
}

impl Call {
    /// Operation name used with [`MockCloud::fail_on`]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::CreateFunction { .. } => "create_function",
            Self::UpdateFunctionCode { .. } => "update_function_code",
            Self::UpdateFunctionConfiguration { .. } => "update_function_configuration",
            Self::GetFunctionConfiguration { .. } => "get_function_configuration",
            Self::DeleteFunction { .. } => "delete_function",
            Self::PublishVersion { .. } => "publish_version",
            Self::CreateRole { .. } => "create_role",
            Self::GetRole { .. } => "get_role",
            Self::AttachRolePolicy { .. } => "attach_role_policy",
            Self::DetachRolePolicy { .. } => "detach_role_policy",
            Self::DeleteRole { .. } => "delete_role",
            Self::Upload { .. } => "upload",
            Self::PackageLayer { .. } => "package_layer",
        }
    }

    /// Whether the call changes anything
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Self::GetFunctionConfiguration { .. } | Self::GetRole { .. }
        )
    }
}

#[derive(Debug)]
struct StoredRole {
    role: Role,
    policies: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct MockState {
    functions: BTreeMap<String, RemoteRecord>,
    versions: HashMap<String, u32>,
    roles: BTreeMap<String, StoredRole>,
    objects: BTreeMap<(String, String), Vec<u8>>,
    layer_versions: HashMap<String, u32>,
    calls: Vec<Call>,
    failures: HashMap<String, ProviderError>,
    hash_override: Option<String>,
}

/// In-memory compute, identity, storage and layer provider
#[derive(Clone, Default)]
pub struct MockCloud {
    state: Arc<Mutex<MockState>>,
    settings: ProviderSettings,
}

impl MockCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `operation` fail with `error`
    pub fn fail_on(&self, operation: &str, error: ProviderError) {
        let mut state = self.state.lock().unwrap();
        state.failures.insert(operation.to_string(), error);
    }

    /// Stop injecting failures
    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    /// Report this hash for code instead of the hash of the received bytes
    pub fn set_hash_override(&self, hash: Option<&str>) {
        self.state.lock().unwrap().hash_override = hash.map(String::from);
    }

    /// Every call recorded so far
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Number of recorded calls matching `predicate`
    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| predicate(c))
            .count()
    }

    /// Number of recorded calls that changed something
    pub fn mutation_count(&self) -> usize {
        self.count(Call::is_mutation)
    }

    /// Current record of a function
    pub fn function(&self, name: &str) -> Option<RemoteRecord> {
        self.state.lock().unwrap().functions.get(name).cloned()
    }

    /// Overwrite a function record directly, bypassing call recording
    pub fn put_function(&self, record: RemoteRecord) {
        let mut state = self.state.lock().unwrap();
        state.functions.insert(record.name.clone(), record);
    }

    /// Whether a role exists
    pub fn has_role(&self, name: &str) -> bool {
        self.state.lock().unwrap().roles.contains_key(name)
    }

    /// Inline policy document attached to a role
    pub fn role_policy(&self, role: &str, policy: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.roles.get(role)?.policies.get(policy).cloned()
    }

    /// Stored object bytes
    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    fn record(&self, call: Call) -> ProviderResult<std::sync::MutexGuard<'_, MockState>> {
        let mut state = self.state.lock().unwrap();
        let operation = call.operation();
        state.calls.push(call);
        if let Some(error) = state.failures.get(operation).cloned() {
            return Err(error);
        }
        Ok(state)
    }
}

impl MockState {
    fn code_hash(&self, code: &CodeSource) -> ProviderResult<String> {
        if let Some(hash) = &self.hash_override {
            return Ok(hash.clone());
        }
        match code {
            CodeSource::Inline(bytes) => Ok(packager::hash_bytes(bytes)),
            CodeSource::Object { bucket, key } => self
                .objects
                .get(&(bucket.clone(), key.clone()))
                .map(|bytes| packager::hash_bytes(bytes))
                .ok_or_else(|| ProviderError::not_found(format!("s3://{}/{}", bucket, key))),
        }
    }

    fn existing(&mut self, name: &str) -> ProviderResult<&mut RemoteRecord> {
        self.functions
            .get_mut(name)
            .ok_or_else(|| ProviderError::not_found(format!("Function not found: {}", name)))
    }
}

impl ComputeProvider for MockCloud {
    fn create_function(&self, config: &FunctionConfig, code: &CodeSource) -> ProviderResult<RemoteRecord> {
        let mut state = self.record(Call::CreateFunction {
            name: config.name.clone(),
        })?;
        if state.functions.contains_key(&config.name) {
            return Err(ProviderError::conflict(format!(
                "Function already exists: {}",
                config.name
            )));
        }

        let mut record = RemoteRecord::from_config(config, self.settings.function_arn(&config.name));
        record.content_hash = state.code_hash(code)?;
        state.functions.insert(config.name.clone(), record.clone());
        Ok(record)
    }

    fn update_function_code(&self, name: &str, code: &CodeSource) -> ProviderResult<RemoteRecord> {
        let mut state = self.record(Call::UpdateFunctionCode {
            name: name.to_string(),
        })?;
        let hash = state.code_hash(code)?;
        let record = state.existing(name)?;
        record.content_hash = hash;
        Ok(record.clone())
    }

    fn update_function_configuration(&self, config: &FunctionConfig) -> ProviderResult<RemoteRecord> {
        let mut state = self.record(Call::UpdateFunctionConfiguration {
            name: config.name.clone(),
        })?;
        let record = state.existing(&config.name)?;
        record.description = config.description.clone();
        record.runtime = config.runtime.clone();
        record.role_arn = config.role_arn.clone();
        record.handler = config.handler.clone();
        record.memory_mb = config.memory_mb;
        record.timeout_sec = config.timeout_sec;
        record.env_vars = config.env_vars.clone();
        record.layers = config.layers.clone();
        Ok(record.clone())
    }

    fn get_function_configuration(&self, name: &str) -> ProviderResult<RemoteRecord> {
        let mut state = self.record(Call::GetFunctionConfiguration {
            name: name.to_string(),
        })?;
        state.existing(name).map(|r| r.clone())
    }

    fn delete_function(&self, name: &str) -> ProviderResult<()> {
        let mut state = self.record(Call::DeleteFunction {
            name: name.to_string(),
        })?;
        state.versions.remove(name);
        state
            .functions
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ProviderError::not_found(format!("Function not found: {}", name)))
    }

    fn publish_version(&self, name: &str) -> ProviderResult<String> {
        let mut state = self.record(Call::PublishVersion {
            name: name.to_string(),
        })?;
        state.existing(name)?;
        let version = state.versions.entry(name.to_string()).or_insert(0);
        *version += 1;
        Ok(version.to_string())
    }
}

impl IdentityProvider for MockCloud {
    fn create_role(&self, name: &str, _trust_policy: &str) -> ProviderResult<Role> {
        let mut state = self.record(Call::CreateRole {
            name: name.to_string(),
        })?;
        if state.roles.contains_key(name) {
            return Err(ProviderError::conflict(format!("Role already exists: {}", name)));
        }
        let role = Role {
            name: name.to_string(),
            arn: self.settings.role_arn(name),
        };
        state.roles.insert(
            name.to_string(),
            StoredRole {
                role: role.clone(),
                policies: BTreeMap::new(),
            },
        );
        Ok(role)
    }

    fn get_role(&self, name: &str) -> ProviderResult<Role> {
        let state = self.record(Call::GetRole {
            name: name.to_string(),
        })?;
        state
            .roles
            .get(name)
            .map(|stored| stored.role.clone())
            .ok_or_else(|| ProviderError::not_found(format!("Role not found: {}", name)))
    }

    fn attach_role_policy(&self, role_name: &str, policy_name: &str, document: &str) -> ProviderResult<()> {
        let mut state = self.record(Call::AttachRolePolicy {
            role: role_name.to_string(),
            policy: policy_name.to_string(),
        })?;
        let stored = state
            .roles
            .get_mut(role_name)
            .ok_or_else(|| ProviderError::not_found(format!("Role not found: {}", role_name)))?;
        stored
            .policies
            .insert(policy_name.to_string(), document.to_string());
        Ok(())
    }

    fn detach_role_policy(&self, role_name: &str, policy_name: &str) -> ProviderResult<()> {
        let mut state = self.record(Call::DetachRolePolicy {
            role: role_name.to_string(),
            policy: policy_name.to_string(),
        })?;
        state
            .roles
            .get_mut(role_name)
            .and_then(|stored| stored.policies.remove(policy_name))
            .map(|_| ())
            .ok_or_else(|| {
                ProviderError::not_found(format!("Policy {} not attached to {}", policy_name, role_name))
            })
    }

    fn delete_role(&self, name: &str) -> ProviderResult<()> {
        let mut state = self.record(Call::DeleteRole {
            name: name.to_string(),
        })?;
        match state.roles.get(name) {
            None => Err(ProviderError::not_found(format!("Role not found: {}", name))),
            Some(stored) if !stored.policies.is_empty() => Err(ProviderError::conflict(format!(
                "Role {} still has policies attached",
                name
            ))),
            Some(_) => {
                state.roles.remove(name);
                Ok(())
            }
        }
    }
}

impl ObjectStorage for MockCloud {
    fn upload(&self, bucket: &str, local_path: &Path) -> ProviderResult<String> {
        let mut state = self.record(Call::Upload {
            bucket: bucket.to_string(),
            path: local_path.to_path_buf(),
        })?;
        let bytes = std::fs::read(local_path)
            .map_err(|e| ProviderError::other(format!("{}: {}", local_path.display(), e)))?;
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let key = format!("{}/{}", packager::hash_bytes(&bytes), file_name);
        state.objects.insert((bucket.to_string(), key.clone()), bytes);
        Ok(key)
    }
}

impl LayerPackager for MockCloud {
    fn package_layer(&self, layer_name: &str, dir: &Path) -> ProviderResult<String> {
        let mut state = self.record(Call::PackageLayer {
            name: layer_name.to_string(),
        })?;
        if !dir.is_dir() {
            return Err(ProviderError::not_found(format!(
                "Layer source not found: {}",
                dir.display()
            )));
        }
        let version = state
            .layer_versions
            .entry(layer_name.to_string())
            .or_insert(0);
        *version += 1;
        Ok(format!(
            "arn:aws:lambda:{}:{}:layer:{}:{}",
            self.settings.region, self.settings.account_id, layer_name, version
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DesiredConfig;

    fn config(name: &str) -> FunctionConfig {
        DesiredConfig::new(name, "python3.12", "app.handler", ".").resolve("arn:role", "", Vec::new())
    }

    #[test]
    fn test_create_and_get() {
        let cloud = MockCloud::new();
        let record = cloud
            .create_function(&config("fn1"), &CodeSource::Inline(b"abc".to_vec()))
            .unwrap();
        assert_eq!(record.content_hash, packager::hash_bytes(b"abc"));
        assert_eq!(cloud.get_function_configuration("fn1").unwrap(), record);
        assert_eq!(cloud.mutation_count(), 1);
    }

    #[test]
    fn test_missing_function_is_not_found() {
        let cloud = MockCloud::new();
        assert!(cloud.get_function_configuration("nope").unwrap_err().is_not_found());
        assert!(cloud.delete_function("nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_hash_override() {
        let cloud = MockCloud::new();
        cloud.set_hash_override(Some("provider-hash"));
        let record = cloud
            .create_function(&config("fn1"), &CodeSource::Inline(b"abc".to_vec()))
            .unwrap();
        assert_eq!(record.content_hash, "provider-hash");
    }

    #[test]
    fn test_failure_injection() {
        let cloud = MockCloud::new();
        cloud.fail_on("publish_version", ProviderError::throttled("slow"));
        let err = cloud.publish_version("fn1").unwrap_err();
        assert!(err.is_retryable());

        cloud.clear_failures();
        assert!(cloud.publish_version("fn1").unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_role_requires_detach() {
        let cloud = MockCloud::new();
        cloud.create_role("r", "{}").unwrap();
        cloud.attach_role_policy("r", "p", "{}").unwrap();
        assert_eq!(
            cloud.delete_role("r").unwrap_err().category,
            crate::ErrorCategory::Conflict
        );
        cloud.detach_role_policy("r", "p").unwrap();
        cloud.delete_role("r").unwrap();
        assert!(!cloud.has_role("r"));
    }

    #[test]
    fn test_upload_and_object_code() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("code.zip");
        std::fs::write(&path, b"zipbytes").unwrap();

        let cloud = MockCloud::new();
        let key = cloud.upload("bucket", &path).unwrap();
        assert_eq!(cloud.object("bucket", &key).unwrap(), b"zipbytes");

        let record = cloud
            .create_function(
                &config("fn1"),
                &CodeSource::Object {
                    bucket: "bucket".into(),
                    key,
                },
            )
            .unwrap();
        assert_eq!(record.content_hash, packager::hash_bytes(b"zipbytes"));
    }
}
