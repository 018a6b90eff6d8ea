//! Directory-backed local cloud
//!
//! Implements every collaborator the reconciler needs on top of a plain
//! directory, so deployments can be exercised end to end offline:
//!
//! ```text
//! <root>/functions/<name>.json      function record
//! <root>/functions/<name>.code      deployed archive bytes
//! <root>/roles/<name>.json          role, trust policy and inline policies
//! <root>/buckets/<bucket>/<key>     uploaded objects
//! <root>/layers/<name>/<n>.zip      dependency layer versions
//! ```

use declarative::{
    CodeSource, ComputeProvider, FunctionConfig, IdentityProvider, LayerPackager, ObjectStorage,
    ProviderError, ProviderResult, ProviderSettings, RemoteRecord, Role,
};
use packager::{ArchiveFormat, PackOptions};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct StoredFunction {
    record: RemoteRecord,
    #[serde(default)]
    versions: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredRole {
    role: Role,
    trust_policy: String,
    #[serde(default)]
    policies: BTreeMap<String, String>,
}

/// A cloud provider rooted at a local directory
pub struct LocalCloud {
    root: PathBuf,
    settings: ProviderSettings,
}

impl LocalCloud {
    pub fn new(root: impl Into<PathBuf>, settings: ProviderSettings) -> Self {
        Self {
            root: root.into(),
            settings,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn function_path(&self, name: &str) -> PathBuf {
        self.root.join("functions").join(format!("{}.json", name))
    }

    fn code_path(&self, name: &str) -> PathBuf {
        self.root.join("functions").join(format!("{}.code", name))
    }

    fn role_path(&self, name: &str) -> PathBuf {
        self.root.join("roles").join(format!("{}.json", name))
    }

    fn load_function(&self, name: &str) -> ProviderResult<StoredFunction> {
        read_json(&self.function_path(name))?
            .ok_or_else(|| ProviderError::not_found(format!("Function not found: {}", name)))
    }

    fn load_role(&self, name: &str) -> ProviderResult<StoredRole> {
        read_json(&self.role_path(name))?
            .ok_or_else(|| ProviderError::not_found(format!("Role not found: {}", name)))
    }

    /// Resolve code to bytes, store them and return their hash
    fn store_code(&self, name: &str, code: &CodeSource) -> ProviderResult<String> {
        let bytes = match code {
            CodeSource::Inline(bytes) => bytes.clone(),
            CodeSource::Object { bucket, key } => {
                let path = self.root.join("buckets").join(bucket).join(key);
                match fs::read(&path) {
                    Ok(bytes) => bytes,
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        return Err(ProviderError::not_found(format!(
                            "Object not found: s3://{}/{}",
                            bucket, key
                        )));
                    }
                    Err(e) => return Err(io_error(&path, &e)),
                }
            }
        };

        let path = self.code_path(name);
        write_bytes(&path, &bytes)?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }
}

impl ComputeProvider for LocalCloud {
    fn create_function(&self, config: &FunctionConfig, code: &CodeSource) -> ProviderResult<RemoteRecord> {
        if self.function_path(&config.name).exists() {
            return Err(ProviderError::conflict(format!(
                "Function already exists: {}",
                config.name
            )));
        }

        let mut record = RemoteRecord::from_config(config, self.settings.function_arn(&config.name));
        record.content_hash = self.store_code(&config.name, code)?;
        write_json(
            &self.function_path(&config.name),
            &StoredFunction {
                record: record.clone(),
                versions: 0,
            },
        )?;
        log::debug!("Local cloud: created {}", config.name);
        Ok(record)
    }

    fn update_function_code(&self, name: &str, code: &CodeSource) -> ProviderResult<RemoteRecord> {
        let mut stored = self.load_function(name)?;
        stored.record.content_hash = self.store_code(name, code)?;
        write_json(&self.function_path(name), &stored)?;
        Ok(stored.record)
    }

    fn update_function_configuration(&self, config: &FunctionConfig) -> ProviderResult<RemoteRecord> {
        let mut stored = self.load_function(&config.name)?;
        let hash = stored.record.content_hash.clone();
        let arn = stored.record.arn.clone();

        stored.record = RemoteRecord::from_config(config, arn);
        stored.record.content_hash = hash;
        write_json(&self.function_path(&config.name), &stored)?;
        Ok(stored.record)
    }

    fn get_function_configuration(&self, name: &str) -> ProviderResult<RemoteRecord> {
        self.load_function(name).map(|stored| stored.record)
    }

    fn delete_function(&self, name: &str) -> ProviderResult<()> {
        remove_file(&self.function_path(name))?;
        // Code goes with the record; its absence is fine
        if let Err(e) = remove_file(&self.code_path(name)) {
            if !e.is_not_found() {
                return Err(e);
            }
        }
        log::debug!("Local cloud: deleted {}", name);
        Ok(())
    }

    fn publish_version(&self, name: &str) -> ProviderResult<String> {
        let mut stored = self.load_function(name)?;
        stored.versions += 1;
        write_json(&self.function_path(name), &stored)?;
        Ok(stored.versions.to_string())
    }
}

impl IdentityProvider for LocalCloud {
    fn create_role(&self, name: &str, trust_policy: &str) -> ProviderResult<Role> {
        let path = self.role_path(name);
        if path.exists() {
            return Err(ProviderError::conflict(format!("Role already exists: {}", name)));
        }
        let role = Role {
            name: name.to_string(),
            arn: self.settings.role_arn(name),
        };
        write_json(
            &path,
            &StoredRole {
                role: role.clone(),
                trust_policy: trust_policy.to_string(),
                policies: BTreeMap::new(),
            },
        )?;
        Ok(role)
    }

    fn get_role(&self, name: &str) -> ProviderResult<Role> {
        self.load_role(name).map(|stored| stored.role)
    }

    fn attach_role_policy(&self, role_name: &str, policy_name: &str, document: &str) -> ProviderResult<()> {
        let mut stored = self.load_role(role_name)?;
        stored
            .policies
            .insert(policy_name.to_string(), document.to_string());
        write_json(&self.role_path(role_name), &stored)
    }

    fn detach_role_policy(&self, role_name: &str, policy_name: &str) -> ProviderResult<()> {
        let mut stored = self.load_role(role_name)?;
        if stored.policies.remove(policy_name).is_none() {
            return Err(ProviderError::not_found(format!(
                "Policy {} not attached to {}",
                policy_name, role_name
            )));
        }
        write_json(&self.role_path(role_name), &stored)
    }

    fn delete_role(&self, name: &str) -> ProviderResult<()> {
        let stored = self.load_role(name)?;
        if !stored.policies.is_empty() {
            return Err(ProviderError::conflict(format!(
                "Role {} still has policies attached",
                name
            )));
        }
        remove_file(&self.role_path(name))
    }
}

impl ObjectStorage for LocalCloud {
    fn upload(&self, bucket: &str, local_path: &Path) -> ProviderResult<String> {
        let bytes = fs::read(local_path).map_err(|e| io_error(local_path, &e))?;
        let hash = blake3::hash(&bytes).to_hex().to_string();
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());

        let key = format!("{}-{}", &hash[..16], file_name);
        write_bytes(&self.root.join("buckets").join(bucket).join(&key), &bytes)?;
        log::debug!("Local cloud: uploaded s3://{}/{}", bucket, key);
        Ok(key)
    }
}

impl LayerPackager for LocalCloud {
    fn package_layer(&self, layer_name: &str, dir: &Path) -> ProviderResult<String> {
        if !dir.is_dir() {
            return Err(ProviderError::not_found(format!(
                "Layer source not found: {}",
                dir.display()
            )));
        }

        let layer_dir = self.root.join("layers").join(layer_name);
        fs::create_dir_all(&layer_dir).map_err(|e| io_error(&layer_dir, &e))?;
        let version = next_layer_version(&layer_dir)?;

        let options = PackOptions::new(dir)
            .format(ArchiveFormat::Zip)
            .destination(layer_dir.join(format!("{}.zip", version)));
        packager::pack(&options).map_err(|e| ProviderError::other(e.to_string()))?;

        Ok(format!(
            "arn:aws:lambda:{}:{}:layer:{}:{}",
            self.settings.region, self.settings.account_id, layer_name, version
        ))
    }
}

fn next_layer_version(layer_dir: &Path) -> ProviderResult<u32> {
    let entries = fs::read_dir(layer_dir).map_err(|e| io_error(layer_dir, &e))?;
    let latest = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            entry
                .path()
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u32>().ok())
        })
        .max()
        .unwrap_or(0);
    Ok(latest + 1)
}

fn io_error(path: &Path, err: &std::io::Error) -> ProviderError {
    if err.kind() == ErrorKind::NotFound {
        ProviderError::not_found(format!("{}: {}", path.display(), err))
    } else if err.kind() == ErrorKind::PermissionDenied {
        ProviderError::access_denied(format!("{}: {}", path.display(), err))
    } else {
        ProviderError::other(format!("{}: {}", path.display(), err))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> ProviderResult<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(path, &e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| ProviderError::other(format!("{}: {}", path.display(), e)))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> ProviderResult<()> {
    let content = serde_json::to_string_pretty(value)
        .map_err(|e| ProviderError::other(format!("{}: {}", path.display(), e)))?;
    write_bytes(path, content.as_bytes())
}

fn write_bytes(path: &Path, bytes: &[u8]) -> ProviderResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, &e))?;
    }
    fs::write(path, bytes).map_err(|e| io_error(path, &e))
}

fn remove_file(path: &Path) -> ProviderResult<()> {
    fs::remove_file(path).map_err(|e| io_error(path, &e))
}
