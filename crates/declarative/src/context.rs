//! Collaborator and progress traits
//!
//! These traits allow the declarative crate to be used without
//! depending on a specific cloud SDK, UI framework or storage layer.

use crate::diff::Decision;
use crate::error::ProviderResult;
use crate::types::{CodeSource, FunctionConfig, Operation, RemoteRecord, Role, Stage};
use std::path::Path;

/// The compute provider that hosts functions
///
/// Implementations report a missing function with
/// [`ErrorCategory::NotFound`](crate::ErrorCategory::NotFound).
pub trait ComputeProvider: Send + Sync {
    /// Create a function with full configuration and code
    fn create_function(&self, config: &FunctionConfig, code: &CodeSource) -> ProviderResult<RemoteRecord>;

    /// Replace the code of an existing function
    ///
    /// The returned record carries the hash the provider computed.
    fn update_function_code(&self, name: &str, code: &CodeSource) -> ProviderResult<RemoteRecord>;

    /// Update everything except code
    fn update_function_configuration(&self, config: &FunctionConfig) -> ProviderResult<RemoteRecord>;

    /// Read the deployed configuration
    fn get_function_configuration(&self, name: &str) -> ProviderResult<RemoteRecord>;

    /// Delete a function
    fn delete_function(&self, name: &str) -> ProviderResult<()>;

    /// Publish an immutable version, returning its identifier
    fn publish_version(&self, name: &str) -> ProviderResult<String>;
}

/// The identity provider that owns execution roles
pub trait IdentityProvider: Send + Sync {
    /// Create a role with the given trust (assume-role) policy
    fn create_role(&self, name: &str, trust_policy: &str) -> ProviderResult<Role>;

    /// Look up a role by name
    fn get_role(&self, name: &str) -> ProviderResult<Role>;

    /// Attach a named policy document to a role
    fn attach_role_policy(&self, role_name: &str, policy_name: &str, document: &str) -> ProviderResult<()>;

    /// Detach a named policy from a role
    fn detach_role_policy(&self, role_name: &str, policy_name: &str) -> ProviderResult<()>;

    /// Delete a role (policies must be detached first)
    fn delete_role(&self, name: &str) -> ProviderResult<()>;
}

/// Object storage used for large artifacts
pub trait ObjectStorage: Send + Sync {
    /// Upload a local file, returning the remote key
    fn upload(&self, bucket: &str, local_path: &Path) -> ProviderResult<String>;
}

/// Builds dependency layers from a directory
pub trait LayerPackager: Send + Sync {
    /// Package `dir` as a layer called `layer_name`, returning its reference
    fn package_layer(&self, layer_name: &str, dir: &Path) -> ProviderResult<String>;
}

/// The set of collaborators a reconciler talks to
#[derive(Clone, Copy)]
pub struct Clients<'a> {
    pub compute: &'a dyn ComputeProvider,
    pub identity: &'a dyn IdentityProvider,
    pub storage: Option<&'a dyn ObjectStorage>,
    pub layers: Option<&'a dyn LayerPackager>,
}

impl<'a> Clients<'a> {
    /// Clients with no object storage or layer support
    pub fn new(compute: &'a dyn ComputeProvider, identity: &'a dyn IdentityProvider) -> Self {
        Self {
            compute,
            identity,
            storage: None,
            layers: None,
        }
    }

    /// Add object storage
    pub fn with_storage(mut self, storage: &'a dyn ObjectStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Add a dependency-layer packager
    pub fn with_layers(mut self, layers: &'a dyn LayerPackager) -> Self {
        self.layers = Some(layers);
        self
    }
}

/// Progress callback for reconciliation runs
///
/// Implement this trait to receive progress updates during a run.
pub trait ProgressCallback: Send {
    /// Called when the state machine enters a stage
    fn on_stage(&mut self, stage: Stage);

    /// Called once the diff engine has decided
    fn on_decision(&mut self, decision: &Decision);

    /// Called after each side-effecting call succeeds
    fn on_operation(&mut self, operation: &Operation);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_stage(&mut self, _stage: Stage) {}
    fn on_decision(&mut self, _decision: &Decision) {}
    fn on_operation(&mut self, _operation: &Operation) {}
}

/// Progress callback that records everything it sees
#[derive(Debug, Default)]
pub struct RecordingProgress {
    pub stages: Vec<Stage>,
    pub decisions: Vec<Decision>,
    pub operations: Vec<Operation>,
}

impl ProgressCallback for RecordingProgress {
    fn on_stage(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    fn on_decision(&mut self, decision: &Decision) {
        self.decisions.push(decision.clone());
    }

    fn on_operation(&mut self, operation: &Operation) {
        self.operations.push(operation.clone());
    }
}
