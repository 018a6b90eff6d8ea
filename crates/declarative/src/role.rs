//! Execution role management
//!
//! When no role is supplied, each function gets a role named after it with
//! a single inline policy limited to writing its own log group.

use crate::context::IdentityProvider;
use crate::error::{Error, Result, tolerate_missing};
use crate::types::{ProviderSettings, Role};
use serde_json::json;

/// Name of the inline policy attached to managed roles
pub const POLICY_NAME: &str = "basic-execution";

/// Service principal allowed to assume managed roles
pub const ASSUME_SERVICE: &str = "lambda.amazonaws.com";

/// Longest role name the identity provider accepts
const MAX_ROLE_NAME: usize = 64;

const ROLE_SUFFIX: &str = "-execution-role";

/// Deterministic role name for a function
///
/// Names that would exceed [`MAX_ROLE_NAME`] are cut short and tagged with
/// a hash of the full function name, so distinct functions keep distinct
/// roles.
pub fn role_name_for(function_name: &str) -> String {
    let name = format!("{}{}", function_name, ROLE_SUFFIX);
    if name.len() <= MAX_ROLE_NAME {
        return name;
    }

    let tag = &packager::hash_bytes(function_name.as_bytes())[..8];
    let mut end = MAX_ROLE_NAME - ROLE_SUFFIX.len() - tag.len() - 1;
    while !function_name.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}-{}{}", &function_name[..end], tag, ROLE_SUFFIX)
}

/// Role name from a role ARN (`arn:aws:iam::<account>:role/<path/>name`)
pub fn role_name_from_arn(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

/// Trust policy allowing only the compute service to assume the role
pub fn trust_policy() -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": ASSUME_SERVICE },
            "Action": "sts:AssumeRole"
        }]
    })
    .to_string()
}

/// Inline policy granting log stream creation and writes for one function
pub fn logging_policy(settings: &ProviderSettings, function_name: &str) -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Action": ["logs:CreateLogStream", "logs:PutLogEvents"],
            "Resource": settings.log_group_arn(function_name)
        }]
    })
    .to_string()
}

/// Looks up, creates and removes managed execution roles
pub struct RoleManager<'a> {
    identity: &'a dyn IdentityProvider,
    settings: &'a ProviderSettings,
}

impl<'a> RoleManager<'a> {
    pub fn new(identity: &'a dyn IdentityProvider, settings: &'a ProviderSettings) -> Self {
        Self { identity, settings }
    }

    /// ARN the managed role for `function_name` has or would have
    pub fn predicted_arn(&self, function_name: &str) -> String {
        self.settings.role_arn(&role_name_for(function_name))
    }

    /// Reuse the function's role if it exists, otherwise create it
    ///
    /// Returns the role and whether it was created by this call.
    pub fn ensure_role(&self, function_name: &str) -> Result<(Role, bool)> {
        let name = role_name_for(function_name);
        let failed = |source| Error::RoleProvisioningFailed {
            role: name.clone(),
            source,
        };

        match self.identity.get_role(&name) {
            Ok(role) => {
                log::debug!("Reusing execution role {}", role.arn);
                Ok((role, false))
            }
            Err(e) if e.is_not_found() => {
                log::info!("Creating execution role {}", name);
                let role = self
                    .identity
                    .create_role(&name, &trust_policy())
                    .map_err(failed)?;
                self.identity
                    .attach_role_policy(
                        &name,
                        POLICY_NAME,
                        &logging_policy(self.settings, function_name),
                    )
                    .map_err(failed)?;
                Ok((role, true))
            }
            Err(e) => Err(failed(e)),
        }
    }

    /// Detach the inline policy and delete the role
    ///
    /// Both steps treat "already gone" as done. Returns whether the role
    /// still existed.
    pub fn remove_role(&self, arn: &str) -> Result<bool> {
        let name = role_name_from_arn(arn);
        let failed = |source| Error::RoleProvisioningFailed {
            role: name.to_string(),
            source,
        };

        let detached = tolerate_missing(self.identity.detach_role_policy(name, POLICY_NAME))
            .map_err(failed)?;
        if !detached {
            log::debug!("Policy {} already detached from {}", POLICY_NAME, name);
        }

        let deleted = tolerate_missing(self.identity.delete_role(name)).map_err(failed)?;
        if deleted {
            log::info!("Removed execution role {}", name);
        } else {
            log::debug!("Execution role {} already gone", name);
        }
        Ok(deleted)
    }
}
