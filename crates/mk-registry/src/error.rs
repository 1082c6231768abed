//! Errors raised by the registry's data store and event bus.

use thiserror::Error;

/// Errors surfaced by [`crate::Registry`] operations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// A write to a protected global key was refused. Per the spec this is
    /// logged, not raised to the caller as a hard failure, but is kept as a
    /// distinct variant so callers that want to observe the rejection can.
    #[error("write to protected global key '{key}' refused")]
    ProtectedKey {
        /// The key the caller attempted to write.
        key: String,
    },
}

/// The outcome of invoking a single subscriber: its return value, or the
/// cause of its failure, reified rather than propagated.
pub type CallbackOutcome = Result<serde_json::Value, String>;
