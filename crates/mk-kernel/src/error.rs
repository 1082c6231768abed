//! Error vocabulary for scanning, loading, and the public `Kernel` API.

use thiserror::Error;

/// Errors raised while locating or instantiating a plugin's code unit.
#[derive(Debug, Clone, Error)]
pub enum SupervisorError {
    /// `load`/`unload`/`reload` named a plugin the scanner never found.
    #[error("no such plugin: '{0}'")]
    UnknownPlugin(String),

    /// The audit hook reported non-empty findings; the load is refused.
    #[error("audit blocked load of '{plugin}': {findings:?}")]
    AuditBlocked {
        /// The plugin that was blocked.
        plugin: String,
        /// The findings the hook reported.
        findings: Vec<String>,
    },

    /// The module could not be loaded from disk.
    #[error("failed to load module for '{plugin}': {cause}")]
    ModuleLoad {
        /// The plugin whose module failed to load.
        plugin: String,
        /// The underlying cause.
        cause: String,
    },

    /// The loaded module did not conform to the plugin contract.
    #[error("plugin '{plugin}' does not conform to the plugin contract: {reason}")]
    BadContract {
        /// The offending plugin.
        plugin: String,
        /// Why the contract check failed.
        reason: String,
    },

    /// `start()` did not return within the start timeout.
    #[error("plugin '{0}' timed out during start")]
    StartTimeout(String),

    /// `start()` returned an error.
    #[error("plugin '{plugin}' failed to start: {cause}")]
    StartFailed {
        /// The plugin that failed to start.
        plugin: String,
        /// The cause it reported.
        cause: String,
    },
}

/// Errors raised by [`crate::facade::Facade`] operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FacadeError {
    /// The kernel has shut down; the facade's back-reference no longer
    /// resolves.
    #[error("kernel is gone")]
    KernelGone,

    /// `spawn_task` was called after the stop signal was set.
    #[error("plugin is not active")]
    NotActive,
}

/// The umbrella error returned by the public [`crate::kernel::Kernel`] API,
/// wrapping every lower-level error kind.
#[derive(Debug, Error)]
pub enum KernelError {
    /// A manifest failed to parse during a scan.
    #[error(transparent)]
    Manifest(#[from] mk_core::ManifestError),
    /// The resolver rejected the dependency graph for a plugin.
    #[error(transparent)]
    Resolver(#[from] mk_core::ResolverError),
    /// A lifecycle operation failed.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    /// A facade operation failed.
    #[error(transparent)]
    Facade(#[from] FacadeError),
    /// The plugin root could not be read.
    #[error("cannot read plugin root {path}: {cause}")]
    ScanIo {
        /// The plugin root path.
        path: String,
        /// The underlying I/O cause.
        cause: String,
    },
}

/// Result alias for the public `Kernel` API.
pub type KernelResult<T> = Result<T, KernelError>;
