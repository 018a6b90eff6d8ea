//! # Declarative
//!
//! Declarative reconciliation of a serverless function.
//!
//! Given the state persisted by the last successful run and the desired
//! configuration, the [`Reconciler`] packages the code, reads what is
//! deployed, decides the smallest action and issues the calls to converge.
//!
//! ## Core Concepts
//!
//! - **DesiredConfig**: What the caller wants deployed, supplied every run
//! - **RemoteRecord**: What the provider reports, or absent
//! - **Decision**: The diff engine's verdict ([`Action`] plus changed fields)
//! - **PersistedState**: What a successful run leaves for the next one
//!
//! ## Example
//!
//! ```no_run
//! use declarative::mock::MockCloud;
//! use declarative::{Clients, DesiredConfig, NoProgress, ProviderSettings, Reconciler};
//!
//! let cloud = MockCloud::new();
//! let clients = Clients::new(&cloud, &cloud);
//! let reconciler = Reconciler::new(clients, ProviderSettings::default());
//!
//! let desired = DesiredConfig::new("hello", "python3.12", "app.handler", "./src");
//! let outcome = reconciler.reconcile(None, &desired, &mut NoProgress)?;
//! println!("{} -> {}", outcome.decision.action, outcome.state.arn);
//!
//! // Same inputs again: nothing to do
//! let again = reconciler.reconcile(Some(&outcome.state), &desired, &mut NoProgress)?;
//! assert!(again.decision.is_noop());
//! # Ok::<(), declarative::Error>(())
//! ```
//!
//! ## Collaborator Traits
//!
//! The crate talks to the outside world only through traits:
//!
//! - [`ComputeProvider`]: Hosts functions
//! - [`IdentityProvider`]: Owns execution roles
//! - [`ObjectStorage`]: Optional artifact upload
//! - [`LayerPackager`]: Optional dependency layers
//! - [`ProgressCallback`]: Receives stage and operation updates
//!
//! This allows the crate to be used without hard dependencies on
//! specific cloud SDKs or UI frameworks.

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod mock;
pub mod remote;
pub mod role;
pub mod types;

// Re-export main types at crate root
pub use context::{
    Clients, ComputeProvider, IdentityProvider, LayerPackager, NoProgress, ObjectStorage,
    ProgressCallback, RecordingProgress,
};
pub use diff::{Decision, Field, FieldChange, changed_fields, decide, plan};
pub use error::{Error, ErrorCategory, ProviderError, ProviderResult, Result};
pub use executor::{PlanOutcome, ReconcileOutcome, Reconciler, TeardownOutcome};
pub use remote::get_remote;
pub use role::{RoleManager, role_name_for};
pub use types::{
    Action, CodeSource, DesiredConfig, EnvVars, FunctionConfig, Operation, PersistedState,
    ProviderSettings, RemoteRecord, Role, Stage,
};
