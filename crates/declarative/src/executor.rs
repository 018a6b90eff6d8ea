//! Reconciliation engine - converges one function to its desired state
//!
//! A run walks `NotDeployed → RoleReady → Packaged → CodePlaced →
//! Configured → Published`, stopping at the first error. Nothing is
//! persisted here: the caller stores [`ReconcileOutcome::state`] only when
//! the run succeeds.

use crate::context::{Clients, ProgressCallback};
use crate::diff::{self, Decision};
use crate::error::{Error, ProviderError, Result, tolerate_missing};
use crate::remote::get_remote;
use crate::role::RoleManager;
use crate::types::{
    Action, CodeSource, DesiredConfig, FunctionConfig, Operation, PersistedState, ProviderSettings,
    Stage,
};
use packager::{Artifact, PackOptions};
use std::path::Path;

/// Result of a successful reconciliation
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// State to persist for the next run
    pub state: PersistedState,
    pub decision: Decision,
    /// Terminal stage reached
    pub stage: Stage,
    /// Every side-effecting call issued, in order
    pub log: Vec<Operation>,
}

impl ReconcileOutcome {
    /// Whether the run changed anything remotely
    pub fn changed(&self) -> bool {
        self.log.iter().any(|op| !op.is_local())
    }
}

/// Result of a dry run
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub decision: Decision,
    /// Configuration that would be applied
    pub config: FunctionConfig,
}

/// Result of a teardown
#[derive(Debug, Clone)]
pub struct TeardownOutcome {
    pub stage: Stage,
    pub log: Vec<Operation>,
}

/// Dependency layer attached on this run
#[derive(Debug, Clone)]
struct DependencyLayer {
    /// Content hash of the dependency tree
    hash: String,
    layer: String,
    /// Published during this run rather than carried over
    built: bool,
}

/// Stage tracking and operation log for one run
struct Journal<'p, P: ProgressCallback> {
    stage: Stage,
    log: Vec<Operation>,
    progress: &'p mut P,
}

impl<'p, P: ProgressCallback> Journal<'p, P> {
    fn new(progress: &'p mut P) -> Self {
        Self {
            stage: Stage::NotDeployed,
            log: Vec::new(),
            progress,
        }
    }

    fn advance(&mut self, stage: Stage) {
        log::debug!("Stage {} -> {}", self.stage, stage);
        self.stage = stage;
        self.progress.on_stage(stage);
    }

    fn record(&mut self, operation: Operation) {
        log::info!("{}", operation);
        self.progress.on_operation(&operation);
        self.log.push(operation);
    }

    fn decided(&mut self, decision: &Decision) {
        log::info!("Decision: {}", decision.action);
        for change in &decision.changes {
            log::debug!("  {}: {} -> {}", change.field, change.from, change.to);
        }
        self.progress.on_decision(decision);
    }

    fn mutated_function(&self) -> bool {
        self.log.iter().any(Operation::is_function_mutation)
    }
}

/// Converges deployed functions to desired configuration
pub struct Reconciler<'a> {
    clients: Clients<'a>,
    settings: ProviderSettings,
}

impl<'a> Reconciler<'a> {
    pub fn new(clients: Clients<'a>, settings: ProviderSettings) -> Self {
        Self { clients, settings }
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    fn roles(&self) -> RoleManager<'_> {
        RoleManager::new(self.clients.identity, &self.settings)
    }

    /// Decide what a run would do without issuing any mutation
    ///
    /// The managed role is predicted rather than looked up or created, and
    /// no dependency layer is built. A changed dependency tree shows up as a
    /// placeholder layer.
    pub fn plan(&self, previous: Option<&PersistedState>, desired: &DesiredConfig) -> Result<PlanOutcome> {
        self.validate(desired)?;

        let role_arn = desired
            .role_arn
            .clone()
            .unwrap_or_else(|| self.roles().predicted_arn(&desired.name));
        let mut layers: Vec<String> = desired.layer_ref.iter().cloned().collect();
        let mut rebuild = false;
        if let Some(deps) = &desired.dependencies {
            let hash = dependency_hash(deps)?;
            match reusable_layer(previous, &hash) {
                Some(layer) => layers.push(layer),
                None => {
                    layers.push(format!("{} (new version)", layer_name(desired)));
                    rebuild = true;
                }
            }
        }
        let artifact = packager::pack(&desired.pack_options())?;
        let config = desired.resolve(&role_arn, &artifact.content_hash, layers);
        discard_artifact(desired, &artifact);

        let remote = get_remote(self.clients.compute, &desired.name)?;
        let mut decision = diff::plan(previous, remote.as_ref(), &config);
        if rebuild {
            decision = decision.with_new_layers(remote.as_ref(), &config);
        }
        log::debug!("Planned {} for '{}'", decision.action, desired.name);

        Ok(PlanOutcome { decision, config })
    }

    /// Run the state machine to `Published`
    pub fn reconcile<P: ProgressCallback>(
        &self,
        previous: Option<&PersistedState>,
        desired: &DesiredConfig,
        progress: &mut P,
    ) -> Result<ReconcileOutcome> {
        self.validate(desired)?;
        let mut journal = Journal::new(progress);

        // NotDeployed -> RoleReady
        let previous_auto = previous.and_then(|s| s.auto_role_arn.clone());
        let (role_arn, auto_role_arn) = match &desired.role_arn {
            Some(arn) => {
                if let Some(stale) = &previous_auto {
                    self.remove_role(stale, &mut journal)?;
                }
                (arn.clone(), None)
            }
            None => {
                let (role, created) = self.roles().ensure_role(&desired.name)?;
                if created {
                    journal.record(Operation::RoleCreated {
                        arn: role.arn.clone(),
                    });
                }
                (role.arn.clone(), Some(role.arn))
            }
        };
        let superseded_role = previous_auto.filter(|old| {
            auto_role_arn.is_some() && auto_role_arn.as_deref() != Some(old.as_str())
        });
        journal.advance(Stage::RoleReady);

        // RoleReady -> Packaged
        let (artifact, dependencies) = self.package(previous, desired)?;
        journal.record(Operation::Packaged {
            content_hash: artifact.content_hash.clone(),
            entries: artifact.entries,
        });
        if let Some(deps) = dependencies.as_ref().filter(|d| d.built) {
            journal.record(Operation::LayerPackaged {
                layer: deps.layer.clone(),
            });
        }
        journal.advance(Stage::Packaged);

        let layers: Vec<String> = desired
            .layer_ref
            .iter()
            .cloned()
            .chain(dependencies.as_ref().map(|d| d.layer.clone()))
            .collect();
        let config = desired.resolve(&role_arn, &artifact.content_hash, layers);
        let new_layer = dependencies.as_ref().is_some_and(|d| d.built);

        let result = self.converge(previous, desired, &config, &artifact, new_layer, &mut journal);
        discard_artifact(desired, &artifact);
        let (decision, state) = result?;

        let state = PersistedState {
            auto_role_arn,
            dependencies_hash: dependencies.as_ref().map(|d| d.hash.clone()),
            dependency_layer: dependencies.map(|d| d.layer),
            ..state
        };

        // Old function is gone by now; its role can follow
        if let Some(old) = &superseded_role {
            self.remove_role(old, &mut journal)?;
        }
        journal.advance(Stage::Published);

        Ok(ReconcileOutcome {
            state,
            decision,
            stage: journal.stage,
            log: journal.log,
        })
    }

    /// Place code, configure, publish and retire a renamed function
    fn converge<P: ProgressCallback>(
        &self,
        previous: Option<&PersistedState>,
        desired: &DesiredConfig,
        config: &FunctionConfig,
        artifact: &Artifact,
        new_layer: bool,
        journal: &mut Journal<'_, P>,
    ) -> Result<(Decision, PersistedState)> {
        let compute = self.clients.compute;
        let name = &config.name;

        let remote = get_remote(compute, name)?;
        let mut decision = diff::plan(previous, remote.as_ref(), config);
        if new_layer {
            decision = decision.with_new_layers(remote.as_ref(), config);
        }
        journal.decided(&decision);

        let mut deployed_hash = remote
            .as_ref()
            .map_or_else(|| config.content_hash.clone(), |r| r.content_hash.clone());
        let mut deployed_layers = remote
            .as_ref()
            .map_or_else(|| config.layers.clone(), |r| r.layers.clone());
        let mut arn = remote.map(|r| r.arn);
        let mut object_key = previous
            .filter(|s| s.bucket == desired.bucket)
            .and_then(|s| s.object_key.clone());

        // Packaged -> CodePlaced
        match decision.action.base() {
            Action::Create => {
                let code = self.place_code(desired, artifact, journal)?;
                let record = compute
                    .create_function(config, &code)
                    .map_err(|e| Error::call("create_function", name, e))?;
                journal.record(Operation::Created {
                    arn: record.arn.clone(),
                });
                deployed_hash = record.content_hash;
                deployed_layers = record.layers;
                arn = Some(record.arn);
                object_key = uploaded_key(code).or(object_key);
            }
            Action::UpdateCodeAndConfig => {
                let code = self.place_code(desired, artifact, journal)?;
                let record = compute
                    .update_function_code(name, &code)
                    .map_err(|e| Error::call("update_function_code", name, e))?;
                journal.record(Operation::CodeUpdated {
                    content_hash: record.content_hash.clone(),
                });
                deployed_hash = record.content_hash;
                deployed_layers = record.layers;
                arn = Some(record.arn);
                object_key = uploaded_key(code).or(object_key);
            }
            _ => {}
        }
        journal.advance(Stage::CodePlaced);

        // CodePlaced -> Configured
        if decision.needs_config_update() {
            let record = compute
                .update_function_configuration(config)
                .map_err(|e| Error::call("update_function_configuration", name, e))?;
            deployed_layers = record.layers;
            journal.record(Operation::ConfigurationUpdated {
                fields: decision
                    .config_changes()
                    .map(|c| c.field.name().to_string())
                    .collect(),
            });
        }
        journal.advance(Stage::Configured);

        // Configured -> Published
        let version = if desired.publish && journal.mutated_function() {
            let version = compute
                .publish_version(name)
                .map_err(|e| Error::call("publish_version", name, e))?;
            journal.record(Operation::VersionPublished {
                version: version.clone(),
            });
            Some(version)
        } else {
            previous
                .filter(|s| &s.name == name)
                .and_then(|s| s.version.clone())
        };

        if let Some(old_name) = decision.action.superseded() {
            self.retire(old_name, name, journal)?;
        }

        let state = PersistedState {
            name: name.clone(),
            description: config.description.clone(),
            memory_mb: config.memory_mb,
            timeout_sec: config.timeout_sec,
            runtime: config.runtime.clone(),
            handler: config.handler.clone(),
            env_vars: config.env_vars.clone(),
            role_arn: config.role_arn.clone(),
            auto_role_arn: None,
            arn: arn.unwrap_or_else(|| self.settings.function_arn(name)),
            content_hash: deployed_hash,
            layers: deployed_layers,
            bucket: desired.bucket.clone(),
            object_key,
            version,
            dependencies_hash: None,
            dependency_layer: None,
        };

        Ok((decision, state))
    }

    /// Delete the function under its old name once the new one answers
    fn retire<P: ProgressCallback>(&self, old_name: &str, new_name: &str, journal: &mut Journal<'_, P>) -> Result<()> {
        let compute = self.clients.compute;

        if get_remote(compute, new_name)?.is_none() {
            return Err(Error::call(
                "get_function_configuration",
                new_name,
                ProviderError::not_found("function missing after deployment"),
            ));
        }

        let deleted = tolerate_missing(compute.delete_function(old_name))
            .map_err(|e| Error::call("delete_function", old_name, e))?;
        if deleted {
            journal.record(Operation::Deleted {
                name: old_name.to_string(),
            });
        } else {
            log::debug!("Superseded function '{}' already gone", old_name);
        }
        Ok(())
    }

    /// Delete the function and its managed role
    pub fn destroy<P: ProgressCallback>(&self, previous: &PersistedState, progress: &mut P) -> Result<TeardownOutcome> {
        let mut journal = Journal::new(progress);

        let deleted = tolerate_missing(self.clients.compute.delete_function(&previous.name))
            .map_err(|e| Error::call("delete_function", &previous.name, e))?;
        if deleted {
            journal.record(Operation::Deleted {
                name: previous.name.clone(),
            });
        } else {
            log::debug!("Function '{}' already gone", previous.name);
        }

        if let Some(arn) = &previous.auto_role_arn {
            self.remove_role(arn, &mut journal)?;
        }
        journal.advance(Stage::Removed);

        Ok(TeardownOutcome {
            stage: journal.stage,
            log: journal.log,
        })
    }

    fn validate(&self, desired: &DesiredConfig) -> Result<()> {
        if desired.name.is_empty() {
            return Err(Error::InvalidConfig("function name is empty".into()));
        }
        if desired.bucket.is_some() && self.clients.storage.is_none() {
            return Err(Error::InvalidConfig(
                "a bucket is configured but no object storage is available".into(),
            ));
        }
        if desired.dependencies.is_some() {
            if desired.bucket.is_none() {
                return Err(Error::InvalidConfig(
                    "a dependency layer needs a bucket".into(),
                ));
            }
            if self.clients.layers.is_none() {
                return Err(Error::InvalidConfig(
                    "dependencies are configured but no layer packager is available".into(),
                ));
            }
        }
        Ok(())
    }

    /// Build the code artifact, and the dependency layer alongside it
    ///
    /// A layer version is only published when the dependency tree hash
    /// differs from the one recorded with the previous layer.
    fn package(
        &self,
        previous: Option<&PersistedState>,
        desired: &DesiredConfig,
    ) -> Result<(Artifact, Option<DependencyLayer>)> {
        let options = desired.pack_options();

        match (&desired.dependencies, self.clients.layers) {
            (Some(deps), Some(layers)) => {
                let layer_name = layer_name(desired);
                log::debug!("Packaging code and layer {} in parallel", layer_name);

                let (artifact, layer) = rayon::join(
                    || packager::pack(&options),
                    || -> Result<DependencyLayer> {
                        let hash = dependency_hash(deps)?;
                        if let Some(layer) = reusable_layer(previous, &hash) {
                            log::debug!("Dependencies unchanged, keeping {}", layer);
                            return Ok(DependencyLayer {
                                hash,
                                layer,
                                built: false,
                            });
                        }
                        let layer = layers
                            .package_layer(&layer_name, deps)
                            .map_err(|e| Error::call("package_layer", &layer_name, e))?;
                        Ok(DependencyLayer {
                            hash,
                            layer,
                            built: true,
                        })
                    },
                );
                let artifact = artifact?;
                match layer {
                    Ok(layer) => Ok((artifact, Some(layer))),
                    Err(e) => {
                        discard_artifact(desired, &artifact);
                        Err(e)
                    }
                }
            }
            _ => Ok((packager::pack(&options)?, None)),
        }
    }

    /// Upload to the bucket when configured, otherwise read bytes for inline upload
    fn place_code<P: ProgressCallback>(
        &self,
        desired: &DesiredConfig,
        artifact: &Artifact,
        journal: &mut Journal<'_, P>,
    ) -> Result<CodeSource> {
        match (&desired.bucket, self.clients.storage) {
            (Some(bucket), Some(storage)) => {
                let key = storage
                    .upload(bucket, &artifact.path)
                    .map_err(|e| Error::call("upload", bucket, e))?;
                journal.record(Operation::Uploaded {
                    bucket: bucket.clone(),
                    key: key.clone(),
                });
                Ok(CodeSource::Object {
                    bucket: bucket.clone(),
                    key,
                })
            }
            _ => {
                let bytes = std::fs::read(&artifact.path).map_err(|source| {
                    Error::PackagingFailed(packager::Error::PackagingFailed {
                        path: artifact.path.clone(),
                        source,
                    })
                })?;
                Ok(CodeSource::Inline(bytes))
            }
        }
    }

    fn remove_role<P: ProgressCallback>(&self, arn: &str, journal: &mut Journal<'_, P>) -> Result<()> {
        if self.roles().remove_role(arn)? {
            journal.record(Operation::RoleRemoved {
                arn: arn.to_string(),
            });
        }
        Ok(())
    }
}

fn layer_name(desired: &DesiredConfig) -> String {
    format!("{}-dependencies", desired.name)
}

/// Content hash of a dependency tree, archived the way code is
fn dependency_hash(dir: &Path) -> Result<String> {
    let artifact = packager::pack(&PackOptions::new(dir))?;
    remove_quietly(&artifact.path);
    Ok(artifact.content_hash)
}

/// Previous layer, when it was built from the same dependency tree
fn reusable_layer(previous: Option<&PersistedState>, hash: &str) -> Option<String> {
    previous
        .filter(|s| s.dependencies_hash.as_deref() == Some(hash))
        .and_then(|s| s.dependency_layer.clone())
}

fn uploaded_key(code: CodeSource) -> Option<String> {
    match code {
        CodeSource::Object { key, .. } => Some(key),
        CodeSource::Inline(_) => None,
    }
}

/// Remove a temporary artifact; caller-chosen paths are kept
fn discard_artifact(desired: &DesiredConfig, artifact: &Artifact) {
    if desired.artifact_path.is_some() {
        return;
    }
    remove_quietly(&artifact.path);
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        log::debug!("Could not remove {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{NoProgress, RecordingProgress};
    use crate::mock::{Call, MockCloud};
    use std::fs;
    use tempfile::TempDir;

    const CUSTOM_ROLE: &str = "arn:aws:iam::000000000000:role/custom";

    fn source() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.py"), "def handler(event, context):\n    return 1\n").unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/util.py"), "X = 1\n").unwrap();
        dir
    }

    fn desired(dir: &Path) -> DesiredConfig {
        let mut config = DesiredConfig::new("fn1", "python3.12", "app.handler", dir);
        config.memory_mb = 512;
        config.timeout_sec = 10;
        config
    }

    fn run(cloud: &MockCloud, previous: Option<&PersistedState>, desired: &DesiredConfig) -> Result<ReconcileOutcome> {
        let clients = Clients::new(cloud, cloud).with_storage(cloud).with_layers(cloud);
        Reconciler::new(clients, ProviderSettings::default()).reconcile(previous, desired, &mut NoProgress)
    }

    fn position(calls: &[Call], wanted: &Call) -> usize {
        calls.iter().position(|c| c == wanted).unwrap()
    }

    #[test]
    fn test_create_then_noop() {
        let src = source();
        let cloud = MockCloud::new();
        let desired = desired(src.path());

        let first = run(&cloud, None, &desired).unwrap();
        assert_eq!(first.decision.action, Action::Create);
        assert_eq!(first.stage, Stage::Published);
        assert_eq!(first.state.memory_mb, 512);
        assert_eq!(
            first.state.auto_role_arn.as_deref(),
            Some("arn:aws:iam::000000000000:role/fn1-execution-role")
        );
        assert_eq!(cloud.count(|c| matches!(c, Call::UpdateFunctionConfiguration { .. })), 0);

        cloud.clear_calls();
        let second = run(&cloud, Some(&first.state), &desired).unwrap();
        assert_eq!(second.decision.action, Action::NoOp);
        assert_eq!(cloud.mutation_count(), 0);
        assert!(!second.changed());
        assert_eq!(second.state, first.state);
    }

    #[test]
    fn test_padded_description_converges() {
        let src = source();
        let cloud = MockCloud::new();
        let mut desired = desired(src.path());
        desired.description = "my function ".into();

        let first = run(&cloud, None, &desired).unwrap();
        assert_eq!(first.state.description, "my function");

        cloud.clear_calls();
        let second = run(&cloud, Some(&first.state), &desired).unwrap();
        assert_eq!(second.decision.action, Action::NoOp);
        assert_eq!(cloud.mutation_count(), 0);
    }

    #[test]
    fn test_stages_reported_in_order() {
        let src = source();
        let cloud = MockCloud::new();
        let clients = Clients::new(&cloud, &cloud);
        let mut progress = RecordingProgress::default();

        Reconciler::new(clients, ProviderSettings::default())
            .reconcile(None, &desired(src.path()), &mut progress)
            .unwrap();

        assert_eq!(
            progress.stages,
            vec![
                Stage::RoleReady,
                Stage::Packaged,
                Stage::CodePlaced,
                Stage::Configured,
                Stage::Published,
            ]
        );
        assert_eq!(progress.decisions.len(), 1);
        assert!(matches!(progress.operations[0], Operation::RoleCreated { .. }));
    }

    #[test]
    fn test_persisted_hash_comes_from_provider() {
        let src = source();
        let cloud = MockCloud::new();
        let desired = desired(src.path());
        let first = run(&cloud, None, &desired).unwrap();

        fs::write(src.path().join("app.py"), "def handler(event, context):\n    return 2\n").unwrap();
        cloud.set_hash_override(Some("provider-computed"));

        let second = run(&cloud, Some(&first.state), &desired).unwrap();
        assert_eq!(second.decision.action, Action::UpdateCodeAndConfig);
        assert_eq!(second.state.content_hash, "provider-computed");
    }

    #[test]
    fn test_code_only_change() {
        let src = source();
        let cloud = MockCloud::new();
        let desired = desired(src.path());
        let first = run(&cloud, None, &desired).unwrap();

        fs::write(src.path().join("lib/util.py"), "X = 2\n").unwrap();
        cloud.clear_calls();
        let second = run(&cloud, Some(&first.state), &desired).unwrap();

        assert_eq!(second.decision.action, Action::UpdateCodeAndConfig);
        assert_eq!(cloud.count(|c| matches!(c, Call::UpdateFunctionCode { .. })), 1);
        assert_eq!(cloud.count(|c| matches!(c, Call::UpdateFunctionConfiguration { .. })), 0);
        assert_ne!(second.state.content_hash, first.state.content_hash);
    }

    #[test]
    fn test_code_update_precedes_config_update() {
        let src = source();
        let cloud = MockCloud::new();
        let mut desired = desired(src.path());
        let first = run(&cloud, None, &desired).unwrap();

        fs::write(src.path().join("lib/util.py"), "X = 2\n").unwrap();
        desired.timeout_sec = 30;
        cloud.clear_calls();
        run(&cloud, Some(&first.state), &desired).unwrap();

        let calls = cloud.calls();
        let code = position(&calls, &Call::UpdateFunctionCode { name: "fn1".into() });
        let config = position(&calls, &Call::UpdateFunctionConfiguration { name: "fn1".into() });
        assert!(code < config);
        assert_eq!(cloud.function("fn1").unwrap().timeout_sec, 30);
    }

    #[test]
    fn test_config_only_change() {
        let src = source();
        let cloud = MockCloud::new();
        let mut desired = desired(src.path());
        let first = run(&cloud, None, &desired).unwrap();

        desired.memory_mb = 1024;
        desired.env_vars.insert("STAGE".into(), "prod".into());
        cloud.clear_calls();
        let second = run(&cloud, Some(&first.state), &desired).unwrap();

        assert_eq!(second.decision.action, Action::UpdateConfigOnly);
        assert_eq!(cloud.count(|c| matches!(c, Call::UpdateFunctionCode { .. })), 0);
        assert_eq!(
            second.log.last(),
            Some(&Operation::ConfigurationUpdated {
                fields: vec!["memory".into(), "environment".into()],
            })
        );
        let remote = cloud.function("fn1").unwrap();
        assert_eq!(remote.memory_mb, 1024);
        assert_eq!(remote.env_vars.get("STAGE").map(String::as_str), Some("prod"));
    }

    #[test]
    fn test_explicit_role_removes_auto_role() {
        let src = source();
        let cloud = MockCloud::new();
        let mut desired = desired(src.path());
        let first = run(&cloud, None, &desired).unwrap();
        assert!(cloud.has_role("fn1-execution-role"));

        desired.role_arn = Some(CUSTOM_ROLE.into());
        cloud.clear_calls();
        let second = run(&cloud, Some(&first.state), &desired).unwrap();

        assert_eq!(cloud.count(|c| matches!(c, Call::DetachRolePolicy { .. })), 1);
        assert_eq!(cloud.count(|c| matches!(c, Call::DeleteRole { .. })), 1);
        assert_eq!(cloud.count(|c| matches!(c, Call::CreateRole { .. })), 0);
        assert!(!cloud.has_role("fn1-execution-role"));
        assert_eq!(second.decision.action, Action::UpdateConfigOnly);
        assert_eq!(second.state.role_arn, CUSTOM_ROLE);
        assert!(second.state.auto_role_arn.is_none());
    }

    #[test]
    fn test_managed_role_policy_scoped_to_function() {
        let src = source();
        let cloud = MockCloud::new();
        run(&cloud, None, &desired(src.path())).unwrap();

        let policy = cloud
            .role_policy("fn1-execution-role", crate::role::POLICY_NAME)
            .unwrap();
        assert!(policy.contains("log-group:/aws/lambda/fn1:*"));
    }

    #[test]
    fn test_rename_creates_before_deleting() {
        let src = source();
        let cloud = MockCloud::new();
        let mut desired = desired(src.path());
        let first = run(&cloud, None, &desired).unwrap();

        desired.name = "fn2".into();
        cloud.clear_calls();
        let second = run(&cloud, Some(&first.state), &desired).unwrap();

        assert_eq!(
            second.decision.action,
            Action::Replace {
                old_name: "fn1".into(),
                then: Box::new(Action::Create),
            }
        );
        let calls = cloud.calls();
        let create = position(&calls, &Call::CreateFunction { name: "fn2".into() });
        let delete = position(&calls, &Call::DeleteFunction { name: "fn1".into() });
        assert!(create < delete);

        assert!(cloud.function("fn1").is_none());
        assert!(cloud.function("fn2").is_some());
        assert!(!cloud.has_role("fn1-execution-role"));
        assert!(cloud.has_role("fn2-execution-role"));
        assert_eq!(second.state.name, "fn2");
    }

    #[test]
    fn test_rename_with_failed_create_keeps_old_function() {
        let src = source();
        let cloud = MockCloud::new();
        let mut desired = desired(src.path());
        let first = run(&cloud, None, &desired).unwrap();

        desired.name = "fn2".into();
        cloud.fail_on("create_function", ProviderError::access_denied("denied"));
        let err = run(&cloud, Some(&first.state), &desired).unwrap_err();

        assert!(matches!(err, Error::ProviderCallFailed { operation: "create_function", .. }));
        assert!(cloud.function("fn1").is_some());
        assert_eq!(cloud.count(|c| matches!(c, Call::DeleteFunction { .. })), 0);
    }

    #[test]
    fn test_remote_read_failure_is_not_absence() {
        let src = source();
        let cloud = MockCloud::new();
        let desired = desired(src.path());
        let first = run(&cloud, None, &desired).unwrap();

        cloud.clear_calls();
        cloud.fail_on("get_function_configuration", ProviderError::throttled("rate exceeded"));
        let err = run(&cloud, Some(&first.state), &desired).unwrap_err();

        assert!(matches!(err, Error::RemoteReadFailed { .. }));
        assert_eq!(cloud.mutation_count(), 0);
    }

    #[test]
    fn test_provider_failure_is_fatal() {
        let src = source();
        let cloud = MockCloud::new();
        cloud.fail_on("create_function", ProviderError::conflict("busy"));

        let err = run(&cloud, None, &desired(src.path())).unwrap_err();
        match err {
            Error::ProviderCallFailed { operation, target, source } => {
                assert_eq!(operation, "create_function");
                assert_eq!(target, "fn1");
                assert_eq!(source.category, crate::ErrorCategory::Conflict);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_partially_updated_remote_converges() {
        let src = source();
        let cloud = MockCloud::new();
        let mut desired = desired(src.path());
        let first = run(&cloud, None, &desired).unwrap();

        // A previous run placed new code, then stopped before configuring
        fs::write(src.path().join("app.py"), "def handler(event, context):\n    return 3\n").unwrap();
        desired.memory_mb = 2048;
        let clients = Clients::new(&cloud, &cloud);
        let planned = Reconciler::new(clients, ProviderSettings::default())
            .plan(Some(&first.state), &desired)
            .unwrap();
        let mut remote = cloud.function("fn1").unwrap();
        remote.content_hash = planned.config.content_hash.clone();
        cloud.put_function(remote);

        let second = run(&cloud, Some(&first.state), &desired).unwrap();
        assert_eq!(second.decision.action, Action::UpdateConfigOnly);
        assert_eq!(second.state.content_hash, planned.config.content_hash);

        cloud.clear_calls();
        let third = run(&cloud, Some(&second.state), &desired).unwrap();
        assert!(third.decision.is_noop());
        assert_eq!(cloud.mutation_count(), 0);
    }

    #[test]
    fn test_bucket_upload() {
        let src = source();
        let cloud = MockCloud::new();
        let mut desired = desired(src.path());
        desired.bucket = Some("artifacts".into());

        let first = run(&cloud, None, &desired).unwrap();
        assert_eq!(cloud.count(|c| matches!(c, Call::Upload { .. })), 1);
        let key = first.state.object_key.clone().unwrap();
        assert!(cloud.object("artifacts", &key).is_some());
        assert_eq!(first.state.content_hash, cloud.function("fn1").unwrap().content_hash);

        // No upload when nothing changed
        cloud.clear_calls();
        let second = run(&cloud, Some(&first.state), &desired).unwrap();
        assert_eq!(cloud.count(|c| matches!(c, Call::Upload { .. })), 0);
        assert_eq!(second.state.object_key, Some(key));
    }

    #[test]
    fn test_bucket_without_storage_is_invalid() {
        let src = source();
        let cloud = MockCloud::new();
        let mut desired = desired(src.path());
        desired.bucket = Some("artifacts".into());

        let err = Reconciler::new(Clients::new(&cloud, &cloud), ProviderSettings::default())
            .reconcile(None, &desired, &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(cloud.calls().is_empty());
    }

    #[test]
    fn test_dependency_layer() {
        let src = source();
        let deps = TempDir::new().unwrap();
        fs::write(deps.path().join("requests.py"), "").unwrap();

        let cloud = MockCloud::new();
        let mut desired = desired(src.path());
        desired.bucket = Some("artifacts".into());
        desired.dependencies = Some(deps.path().to_path_buf());
        desired.layer_ref = Some("arn:aws:lambda:us-east-1:000000000000:layer:shared:7".into());

        let outcome = run(&cloud, None, &desired).unwrap();
        assert_eq!(cloud.count(|c| matches!(c, Call::PackageLayer { .. })), 1);
        assert_eq!(
            outcome.state.layers,
            vec![
                "arn:aws:lambda:us-east-1:000000000000:layer:shared:7".to_string(),
                "arn:aws:lambda:us-east-1:000000000000:layer:fn1-dependencies:1".to_string(),
            ]
        );
        assert_eq!(cloud.function("fn1").unwrap().layers, outcome.state.layers);
    }

    #[test]
    fn test_unchanged_dependencies_reuse_layer() {
        let src = source();
        let deps = TempDir::new().unwrap();
        fs::write(deps.path().join("requests.py"), "").unwrap();

        let cloud = MockCloud::new();
        let mut desired = desired(src.path());
        desired.bucket = Some("artifacts".into());
        desired.dependencies = Some(deps.path().to_path_buf());

        let first = run(&cloud, None, &desired).unwrap();
        assert!(first.state.dependencies_hash.is_some());
        assert_eq!(
            first.state.dependency_layer.as_deref(),
            Some("arn:aws:lambda:us-east-1:000000000000:layer:fn1-dependencies:1")
        );

        cloud.clear_calls();
        let second = run(&cloud, Some(&first.state), &desired).unwrap();
        assert!(second.decision.is_noop());
        assert_eq!(cloud.mutation_count(), 0);
        assert_eq!(cloud.count(|c| matches!(c, Call::PackageLayer { .. })), 0);
        assert!(!second.changed());
        assert_eq!(second.state, first.state);
    }

    #[test]
    fn test_changed_dependencies_reach_function() {
        let src = source();
        let deps = TempDir::new().unwrap();
        fs::write(deps.path().join("requests.py"), "").unwrap();

        let cloud = MockCloud::new();
        let mut desired = desired(src.path());
        desired.bucket = Some("artifacts".into());
        desired.dependencies = Some(deps.path().to_path_buf());
        let first = run(&cloud, None, &desired).unwrap();

        fs::write(deps.path().join("requests.py"), "VERSION = 2\n").unwrap();
        cloud.clear_calls();
        let second = run(&cloud, Some(&first.state), &desired).unwrap();

        let new_layer = "arn:aws:lambda:us-east-1:000000000000:layer:fn1-dependencies:2";
        assert_eq!(second.decision.action, Action::UpdateConfigOnly);
        assert_eq!(cloud.count(|c| matches!(c, Call::PackageLayer { .. })), 1);
        assert_eq!(cloud.count(|c| matches!(c, Call::UpdateFunctionConfiguration { .. })), 1);
        assert_eq!(cloud.count(|c| matches!(c, Call::UpdateFunctionCode { .. })), 0);
        assert_eq!(
            second.log.last(),
            Some(&Operation::ConfigurationUpdated {
                fields: vec!["layers".into()],
            })
        );
        assert_eq!(cloud.function("fn1").unwrap().layers, vec![new_layer.to_string()]);
        assert_eq!(second.state.layers, vec![new_layer.to_string()]);
        assert_eq!(second.state.dependency_layer.as_deref(), Some(new_layer));
        assert_ne!(second.state.dependencies_hash, first.state.dependencies_hash);

        cloud.clear_calls();
        let third = run(&cloud, Some(&second.state), &desired).unwrap();
        assert!(third.decision.is_noop());
        assert_eq!(cloud.mutation_count(), 0);
    }

    #[test]
    fn test_plan_reports_dependency_rebuild() {
        let src = source();
        let deps = TempDir::new().unwrap();
        fs::write(deps.path().join("requests.py"), "").unwrap();

        let cloud = MockCloud::new();
        let mut desired = desired(src.path());
        desired.bucket = Some("artifacts".into());
        desired.dependencies = Some(deps.path().to_path_buf());
        let first = run(&cloud, None, &desired).unwrap();

        let clients = Clients::new(&cloud, &cloud).with_storage(&cloud).with_layers(&cloud);
        let reconciler = Reconciler::new(clients, ProviderSettings::default());
        assert!(reconciler.plan(Some(&first.state), &desired).unwrap().decision.is_noop());

        fs::write(deps.path().join("requests.py"), "VERSION = 2\n").unwrap();
        cloud.clear_calls();
        let planned = reconciler.plan(Some(&first.state), &desired).unwrap();
        assert_eq!(planned.decision.action, Action::UpdateConfigOnly);
        assert_eq!(planned.decision.changes[0].field, crate::diff::Field::Layers);
        assert_eq!(cloud.mutation_count(), 0);
    }

    #[test]
    fn test_dependency_layer_failure_is_fatal() {
        let src = source();
        let deps = TempDir::new().unwrap();
        fs::write(deps.path().join("requests.py"), "").unwrap();

        let cloud = MockCloud::new();
        cloud.fail_on("package_layer", ProviderError::access_denied("denied"));
        let mut desired = desired(src.path());
        desired.bucket = Some("artifacts".into());
        desired.dependencies = Some(deps.path().to_path_buf());

        let err = run(&cloud, None, &desired).unwrap_err();
        assert!(matches!(err, Error::ProviderCallFailed { operation: "package_layer", .. }));
        assert_eq!(cloud.count(|c| matches!(c, Call::CreateFunction { .. })), 0);
    }

    #[test]
    fn test_missing_dependencies_fail_packaging() {
        let src = source();
        let cloud = MockCloud::new();
        let mut desired = desired(src.path());
        desired.bucket = Some("artifacts".into());
        desired.dependencies = Some(src.path().join("missing"));

        let err = run(&cloud, None, &desired).unwrap_err();
        assert!(matches!(err, Error::PackagingFailed(_)));
        assert_eq!(cloud.count(|c| matches!(c, Call::PackageLayer { .. })), 0);
        assert_eq!(cloud.count(|c| matches!(c, Call::CreateFunction { .. })), 0);
    }

    #[test]
    fn test_publish_only_on_change() {
        let src = source();
        let cloud = MockCloud::new();
        let mut desired = desired(src.path());
        desired.publish = true;

        let first = run(&cloud, None, &desired).unwrap();
        assert_eq!(first.state.version.as_deref(), Some("1"));

        cloud.clear_calls();
        let second = run(&cloud, Some(&first.state), &desired).unwrap();
        assert_eq!(cloud.count(|c| matches!(c, Call::PublishVersion { .. })), 0);
        assert_eq!(second.state.version.as_deref(), Some("1"));

        desired.memory_mb = 256;
        let third = run(&cloud, Some(&second.state), &desired).unwrap();
        assert_eq!(third.state.version.as_deref(), Some("2"));
    }

    #[test]
    fn test_plan_issues_no_mutations() {
        let src = source();
        let cloud = MockCloud::new();
        let reconciler = Reconciler::new(Clients::new(&cloud, &cloud), ProviderSettings::default());

        let planned = reconciler.plan(None, &desired(src.path())).unwrap();
        assert_eq!(planned.decision.action, Action::Create);
        assert_eq!(
            planned.config.role_arn,
            "arn:aws:iam::000000000000:role/fn1-execution-role"
        );
        assert_eq!(cloud.mutation_count(), 0);
        assert!(!cloud.has_role("fn1-execution-role"));
    }

    #[test]
    fn test_plan_after_deploy_is_noop() {
        let src = source();
        let cloud = MockCloud::new();
        let desired = desired(src.path());
        let first = run(&cloud, None, &desired).unwrap();

        let reconciler = Reconciler::new(Clients::new(&cloud, &cloud), ProviderSettings::default());
        let planned = reconciler.plan(Some(&first.state), &desired).unwrap();
        assert!(planned.decision.is_noop());
    }

    #[test]
    fn test_artifact_path_kept() {
        let src = source();
        let out = TempDir::new().unwrap();
        let cloud = MockCloud::new();
        let mut desired = desired(src.path());
        desired.artifact_path = Some(out.path().join("fn1.zip"));

        run(&cloud, None, &desired).unwrap();
        assert!(out.path().join("fn1.zip").exists());
    }

    #[test]
    fn test_destroy() {
        let src = source();
        let cloud = MockCloud::new();
        let first = run(&cloud, None, &desired(src.path())).unwrap();
        let reconciler = Reconciler::new(Clients::new(&cloud, &cloud), ProviderSettings::default());

        let outcome = reconciler.destroy(&first.state, &mut NoProgress).unwrap();
        assert_eq!(outcome.stage, Stage::Removed);
        assert!(cloud.function("fn1").is_none());
        assert!(!cloud.has_role("fn1-execution-role"));
        assert_eq!(outcome.log.len(), 2);

        // Already gone: not-found is absorbed
        let again = reconciler.destroy(&first.state, &mut NoProgress).unwrap();
        assert_eq!(again.stage, Stage::Removed);
        assert!(again.log.is_empty());
    }

    #[test]
    fn test_destroy_failure_is_fatal() {
        let src = source();
        let cloud = MockCloud::new();
        let first = run(&cloud, None, &desired(src.path())).unwrap();
        cloud.fail_on("delete_function", ProviderError::access_denied("denied"));

        let err = Reconciler::new(Clients::new(&cloud, &cloud), ProviderSettings::default())
            .destroy(&first.state, &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, Error::ProviderCallFailed { operation: "delete_function", .. }));
        assert!(cloud.has_role("fn1-execution-role"));
    }
}
