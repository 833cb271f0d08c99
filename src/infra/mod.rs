//! Infrastructure layer: config, logging, and the in-memory chat backend.

pub mod config;
pub mod contracts;
pub mod error;
pub mod logging;
pub mod memory_backend;

/// Returns the infra module name for smoke checks.
pub fn module_name() -> &'static str {
    "infra"
}
