//! Change detection between the deployed and desired function
//!
//! Comparison is over a fixed set of named fields. Layers and the ARN are
//! reported by the provider but never compared; a freshly built dependency
//! layer is folded in separately with [`Decision::with_new_layers`].

use crate::types::{Action, EnvVars, FunctionConfig, PersistedState, RemoteRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A field reported by change detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Field {
    Description,
    Runtime,
    RoleArn,
    Handler,
    MemoryMb,
    TimeoutSec,
    EnvVars,
    ContentHash,
    /// Attached layers; outside [`Field::ALL`]
    Layers,
}

impl Field {
    /// Every compared field, in reporting order
    pub const ALL: [Self; 8] = [
        Self::Description,
        Self::Runtime,
        Self::RoleArn,
        Self::Handler,
        Self::MemoryMb,
        Self::TimeoutSec,
        Self::EnvVars,
        Self::ContentHash,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Description => "description",
            Self::Runtime => "runtime",
            Self::RoleArn => "role",
            Self::Handler => "handler",
            Self::MemoryMb => "memory",
            Self::TimeoutSec => "timeout",
            Self::EnvVars => "environment",
            Self::ContentHash => "code",
            Self::Layers => "layers",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One differing field, rendered for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: Field,
    pub from: String,
    pub to: String,
}

/// The diff engine's verdict for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    /// Differing fields; empty for create and no-op
    pub changes: Vec<FieldChange>,
}

impl Decision {
    /// Changes other than the code hash
    pub fn config_changes(&self) -> impl Iterator<Item = &FieldChange> {
        self.changes
            .iter()
            .filter(|c| c.field != Field::ContentHash)
    }

    /// Whether the configuration-update call is needed
    ///
    /// Create carries the full configuration, so never for create.
    pub fn needs_config_update(&self) -> bool {
        matches!(
            self.action.base(),
            Action::UpdateCodeAndConfig | Action::UpdateConfigOnly
        ) && self.config_changes().next().is_some()
    }

    pub fn is_noop(&self) -> bool {
        self.action.is_noop()
    }

    /// Fold in a dependency layer built during this run
    ///
    /// A new layer only reaches an existing function through the
    /// configuration update, so differing layers force one. Create already
    /// carries them.
    pub fn with_new_layers(self, previous: Option<&RemoteRecord>, desired: &FunctionConfig) -> Decision {
        let Some(previous) = previous else {
            return self;
        };
        if matches!(self.action.base(), Action::Create) || !differs(Field::Layers, previous, desired) {
            return self;
        }

        let mut changes = self.changes;
        changes.push(FieldChange {
            field: Field::Layers,
            from: render(previous_value(Field::Layers, previous)),
            to: render(desired_value(Field::Layers, desired)),
        });
        Decision {
            action: self.action.with_config_update(),
            changes,
        }
    }
}

/// List every compared field that differs, in [`Field::ALL`] order
pub fn changed_fields(previous: &RemoteRecord, desired: &FunctionConfig) -> Vec<FieldChange> {
    Field::ALL
        .iter()
        .filter(|field| differs(**field, previous, desired))
        .map(|&field| FieldChange {
            field,
            from: render(previous_value(field, previous)),
            to: render(desired_value(field, desired)),
        })
        .collect()
}

/// Borrowed view of one compared field
#[derive(PartialEq)]
enum Value<'a> {
    Text(&'a str),
    Number(u32),
    Env(&'a EnvVars),
    List(&'a [String]),
}

fn previous_value(field: Field, record: &RemoteRecord) -> Value<'_> {
    match field {
        Field::Description => Value::Text(&record.description),
        Field::Runtime => Value::Text(&record.runtime),
        Field::RoleArn => Value::Text(&record.role_arn),
        Field::Handler => Value::Text(&record.handler),
        Field::MemoryMb => Value::Number(record.memory_mb),
        Field::TimeoutSec => Value::Number(record.timeout_sec),
        Field::EnvVars => Value::Env(&record.env_vars),
        Field::ContentHash => Value::Text(&record.content_hash),
        Field::Layers => Value::List(&record.layers),
    }
}

fn desired_value(field: Field, config: &FunctionConfig) -> Value<'_> {
    match field {
        Field::Description => Value::Text(&config.description),
        Field::Runtime => Value::Text(&config.runtime),
        Field::RoleArn => Value::Text(&config.role_arn),
        Field::Handler => Value::Text(&config.handler),
        Field::MemoryMb => Value::Number(config.memory_mb),
        Field::TimeoutSec => Value::Number(config.timeout_sec),
        Field::EnvVars => Value::Env(&config.env_vars),
        Field::ContentHash => Value::Text(&config.content_hash),
        Field::Layers => Value::List(&config.layers),
    }
}

fn differs(field: Field, previous: &RemoteRecord, desired: &FunctionConfig) -> bool {
    previous_value(field, previous) != desired_value(field, desired)
}

fn render(value: Value<'_>) -> String {
    match value {
        Value::Text(text) => text.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Env(vars) => render_env(vars),
        Value::List(items) => format!("[{}]", items.join(", ")),
    }
}

fn render_env(vars: &EnvVars) -> String {
    if vars.is_empty() {
        return "{}".to_string();
    }
    let pairs: Vec<String> = vars.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{{{}}}", pairs.join(", "))
}

/// Decide the action for a function under its desired name
///
/// Priority: absent means create, equal means no-op, a differing hash means
/// a code update, anything else is configuration only.
pub fn decide(previous: Option<&RemoteRecord>, desired: &FunctionConfig) -> Decision {
    let Some(previous) = previous else {
        return Decision {
            action: Action::Create,
            changes: Vec::new(),
        };
    };

    let changes = changed_fields(previous, desired);
    let action = if changes.is_empty() {
        Action::NoOp
    } else if previous.content_hash != desired.content_hash {
        Action::UpdateCodeAndConfig
    } else {
        Action::UpdateConfigOnly
    };

    Decision { action, changes }
}

/// Decide, accounting for a rename since the last successful run
///
/// `previous` is the remote record under the desired name. When the
/// persisted name differs, the decision is wrapped in [`Action::Replace`].
pub fn plan(
    persisted: Option<&PersistedState>,
    previous: Option<&RemoteRecord>,
    desired: &FunctionConfig,
) -> Decision {
    let decision = decide(previous, desired);

    match persisted {
        Some(state) if state.name != desired.name => Decision {
            action: Action::Replace {
                old_name: state.name.clone(),
                then: Box::new(decision.action),
            },
            changes: decision.changes,
        },
        _ => decision,
    }
}
