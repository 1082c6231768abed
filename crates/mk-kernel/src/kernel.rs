//! The public `Kernel` type: owns plugin metadata, the registry, the
//! module loader, and the configuration. Lifecycle operations live in
//! `supervisor.rs`; this module only owns the data model (`SPEC_FULL.md`
//! §3) and the scanning step (C1).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use mk_core::{PluginManifest, Version};
use mk_registry::{CallbackOutcome, EmitHandle, Registry};
use parking_lot::Mutex as SyncMutex;
use serde_json::Value;

use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};
use crate::facade::Facade;
use crate::plugin_abi::{ModuleHandle, ModuleLoader, Plugin};
use crate::scanner;

/// A plugin's position in the lifecycle state machine (`SPEC_FULL.md` §4.5).
/// `Failed` and `TimedOut` are transient: the `load` call that enters them
/// always rolls the record back to `Unloaded` before returning, so they are
/// observed only through the returned error, never persisted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Discovered,
    Loaded,
    Active,
    Stopping,
    Unloaded,
}

impl PluginState {
    pub fn is_active(self) -> bool {
        matches!(self, PluginState::Active)
    }
}

/// The live pieces of a loaded plugin, present iff the plugin is active
/// (`SPEC_FULL.md` §3 invariant).
pub struct PluginRuntime {
    pub module_handle: ModuleHandle,
    pub instance: Arc<dyn Plugin>,
    pub facade: Arc<Facade>,
}

/// One discovered bundle's metadata plus, when active, its runtime.
pub struct PluginMeta {
    pub name: String,
    pub path: std::path::PathBuf,
    pub version: Version,
    pub dependencies: Vec<String>,
    pub state: PluginState,
    pub runtime: Option<PluginRuntime>,
    pub last_error: Option<String>,
}

impl PluginMeta {
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}

pub(crate) struct KernelInner {
    pub(crate) registry: Registry,
    pub(crate) config: KernelConfig,
    pub(crate) module_loader: Arc<dyn ModuleLoader>,
    pub(crate) plugins: SyncMutex<HashMap<String, PluginMeta>>,
    pub(crate) insertion_order: SyncMutex<Vec<String>>,
    load_generation: AtomicU64,
    self_ref: Weak<KernelInner>,
}

impl KernelInner {
    pub(crate) fn weak_self(&self) -> Weak<KernelInner> {
        self.self_ref.clone()
    }

    /// Allocates a fresh, process-unique load tag for `plugin_name`, so a
    /// reload never collides with the module cache entry of a prior
    /// generation (`SPEC_FULL.md` §9, dynamic code loading).
    pub(crate) fn next_load_tag(&self, plugin_name: &str) -> String {
        let generation = self.load_generation.fetch_add(1, Ordering::SeqCst);
        format!("mk_plugin_{plugin_name}_{generation}")
    }
}

/// The micro-kernel itself. Cheap to clone: internally an `Arc`.
#[derive(Clone)]
pub struct Kernel(pub(crate) Arc<KernelInner>);

impl Kernel {
    /// Builds a kernel over the given configuration and module loader. No
    /// plugins are discovered yet; call [`Kernel::scan`] or
    /// [`Kernel::init`].
    pub fn new(config: KernelConfig, module_loader: Arc<dyn ModuleLoader>) -> Self {
        let inner = Arc::new_cyclic(|weak| KernelInner {
            registry: Registry::new(config.protected_key_policy.clone(), config.worker_pool_size),
            config,
            module_loader,
            plugins: SyncMutex::new(HashMap::new()),
            insertion_order: SyncMutex::new(Vec::new()),
            load_generation: AtomicU64::new(0),
            self_ref: weak.clone(),
        });
        Kernel(inner)
    }

    /// Walks the configured plugin root and merges discovered bundles into
    /// the registry. Non-destructive for active plugins: `path` and
    /// `version` always refresh, but `dependencies` on an active record is
    /// left untouched until its next load (`SPEC_FULL.md` §4.1, §9).
    pub fn scan(&self) -> KernelResult<()> {
        let plugin_root = self.0.config.plugin_root_path.clone();
        let manifests = scanner::scan(&plugin_root).map_err(|e| KernelError::ScanIo {
            path: plugin_root.display().to_string(),
            cause: e.to_string(),
        })?;

        let mut plugins = self.0.plugins.lock();
        let mut order = self.0.insertion_order.lock();
        for manifest in manifests {
            match plugins.get_mut(&manifest.name) {
                Some(meta) => {
                    meta.path = manifest.path;
                    meta.version = manifest.version;
                    if !meta.is_active() {
                        meta.dependencies = manifest.dependencies;
                    }
                }
                None => {
                    order.push(manifest.name.clone());
                    plugins.insert(
                        manifest.name.clone(),
                        PluginMeta {
                            name: manifest.name,
                            path: manifest.path,
                            version: manifest.version,
                            dependencies: manifest.dependencies,
                            state: PluginState::Discovered,
                            runtime: None,
                            last_error: None,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// A snapshot of every known plugin's name, version, and active flag,
    /// in insertion order — the shape the CLI's `list` command prints.
    pub fn list(&self) -> Vec<PluginStatus> {
        let order = self.0.insertion_order.lock();
        let plugins = self.0.plugins.lock();
        order
            .iter()
            .filter_map(|name| plugins.get(name))
            .map(|meta| PluginStatus {
                name: meta.name.clone(),
                version: meta.version.clone(),
                active: meta.is_active(),
            })
            .collect()
    }

    /// Asynchronous fan-out over `event`, driven directly by an external
    /// caller such as the CLI rather than by a plugin's facade.
    pub fn emit(&self, event: &str, args: Value) -> Vec<EmitHandle> {
        self.0.registry.emit(event, args)
    }

    /// Synchronous, inline, ordered fan-out over `event`, as `emit` above
    /// but blocking the caller for at most `timeout`.
    pub async fn call(&self, event: &str, args: Value, timeout: Duration) -> Vec<CallbackOutcome> {
        self.0.registry.call(event, args, timeout).await
    }

    pub(crate) fn manifest_snapshot(&self) -> (HashMap<String, PluginManifest>, Vec<String>) {
        let order = self.0.insertion_order.lock();
        let plugins = self.0.plugins.lock();
        let manifests = plugins
            .iter()
            .map(|(name, meta)| {
                (
                    name.clone(),
                    PluginManifest {
                        name: meta.name.clone(),
                        path: meta.path.clone(),
                        version: meta.version.clone(),
                        dependencies: meta.dependencies.clone(),
                    },
                )
            })
            .collect();
        (manifests, order.clone())
    }
}

/// One plugin's externally visible status, as printed by the CLI `list`
/// command (`SPEC_FULL.md` §6).
pub struct PluginStatus {
    pub name: String,
    pub version: Version,
    pub active: bool,
}
