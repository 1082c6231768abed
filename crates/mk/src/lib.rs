//! # mk
//!
//! A micro-kernel plugin runtime: discovers self-describing plugin bundles
//! on disk, computes a dependency-respecting load order, instantiates
//! plugins behind a capability-restricted facade, and supports hot
//! unload/reload with cascading reconciliation across the dependency
//! graph.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use mk::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     mk::logging::init();
//!
//!     let config = ConfigLoader::new()
//!         .with_current_dir()
//!         .with_user_config_dir()
//!         .load()?;
//!     let kernel = Kernel::new(config, Arc::new(DylibLoader::new()));
//!     kernel.init().await?;
//!
//!     for status in kernel.list() {
//!         println!("{} {} {}", status.name, status.version, status.active);
//!     }
//!
//!     kernel.shutdown().await;
//!     Ok(())
//! }
//! ```

pub use mk_core;
pub use mk_registry;
pub use mk_kernel;
pub use mk_kernel::logging;

/// Convenient imports for embedders driving a [`Kernel`](mk_kernel::Kernel).
pub mod prelude {
    pub use mk_core::{Op, PluginManifest, Requirement, ResolveReport, Version};
    pub use mk_kernel::{
        ConfigLoader, DylibLoader, Facade, InMemoryLoader, Kernel, KernelConfig, KernelError,
        ModuleLoader, Plugin, PluginState, PluginStatus,
    };
    pub use mk_kernel::declare_plugin;
    pub use mk_registry::{Scope, ExactMatchPolicy, ProtectedKeyPolicy};
}
