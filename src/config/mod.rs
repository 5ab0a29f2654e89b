//! Configuration module
//!
//! Loads and validates the YAML game configuration: listener, round timing,
//! battle strategy, sides, player defaults and the audit ledger.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigLimits, ConfigLoader, LoadResult, LoadWarning};
pub use schema::*;
pub use validation::{ValidationResult, Validator};
