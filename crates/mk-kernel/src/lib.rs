//! Manifest scanning, dynamic plugin loading, and lifecycle supervision
//! for the mk plugin kernel: C1 (scanner), C4 (facade), and C5
//! (supervisor), plus the ambient configuration and logging layers.

pub mod config;
pub mod error;
pub mod facade;
pub mod kernel;
pub mod logging;
pub mod plugin_abi;
pub mod scanner;
mod supervisor;

pub use config::{AuditFindings, AuditHook, ConfigLoader, KernelConfig, KernelConfigSchema, NoopAuditHook};
pub use error::{FacadeError, KernelError, KernelResult, SupervisorError};
pub use facade::Facade;
pub use kernel::{Kernel, PluginMeta, PluginRuntime, PluginState, PluginStatus};
pub use logging::{LoggingBuilder, SpanEvents};
pub use plugin_abi::{DylibLoader, InMemoryLoader, LoadedModule, ModuleHandle, ModuleLoader, Plugin, PluginEntryFn, PluginFactory};
