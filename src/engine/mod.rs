//! Terminal front end for the reconciler
//!
//! 1. Planning - Show what a deploy would change
//! 2. Confirming - Ask before anything is mutated
//! 3. Executing - Drive the state machine with a spinner

pub mod differ;
pub mod executor;

pub use executor::{DeployOptions, deploy, teardown};
