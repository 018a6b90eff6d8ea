//! Remote state reader

use crate::context::ComputeProvider;
use crate::error::{Error, Result};
use crate::types::RemoteRecord;

/// Fetch the deployed function, `None` if it does not exist
///
/// Only the provider's not-found signal means absent. Every other failure
/// is [`Error::RemoteReadFailed`].
pub fn get_remote(compute: &dyn ComputeProvider, name: &str) -> Result<Option<RemoteRecord>> {
    match compute.get_function_configuration(name) {
        Ok(record) => {
            log::debug!("Remote function '{}' found: {}", name, record.arn);
            Ok(Some(record.normalized()))
        }
        Err(e) if e.is_not_found() => {
            log::debug!("Remote function '{}' absent", name);
            Ok(None)
        }
        Err(source) => Err(Error::RemoteReadFailed {
            name: name.to_string(),
            source,
        }),
    }
}
