//! The plugin contract and the pluggable module-loading mechanism behind
//! it: "load a code unit at runtime, bind its `Plugin` factory, and later
//! release it so the same name can be re-loaded from disk" (see
//! `SPEC_FULL.md` §9).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;

use crate::error::SupervisorError;
use crate::facade::Facade;

/// The shape every loaded plugin instance must conform to. Errors are
/// plain strings: plugin-reported failures are caught at this boundary and
/// reified, never allowed to unwind into the kernel.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Runs under a watched task with a hard timeout (see
    /// `Supervisor::load`).
    async fn start(&self) -> Result<(), String>;
    /// Runs under a watched task with a bounded wait (see
    /// `Supervisor::unload`).
    async fn stop(&self) -> Result<(), String>;
}

/// A factory that builds a plugin instance bound to its facade. Dynamic
/// (`DylibLoader`) and in-memory (`InMemoryLoader`) module loaders both
/// produce one of these; only how they obtain it differs.
pub type PluginFactory = Arc<dyn Fn(Arc<Facade>) -> Box<dyn Plugin> + Send + Sync>;

/// Raw signature of the exported entry point a dynamically loaded plugin
/// must provide, produced by [`declare_plugin!`].
///
/// # Safety
/// The returned pointer must have been produced by `Box::into_raw` on a
/// `Box<dyn Plugin>`; the caller takes ownership via `Box::from_raw`.
pub type PluginEntryFn = unsafe extern "C" fn(Arc<Facade>) -> *mut dyn Plugin;

/// Opaque reference to one loaded generation of a plugin's code unit,
/// keyed by its unique load tag (`"mk_plugin_" + name + "_" + generation`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleHandle {
    pub(crate) load_tag: String,
}

impl ModuleHandle {
    /// The load tag identifying this generation in the module cache.
    pub fn load_tag(&self) -> &str {
        &self.load_tag
    }
}

/// What a successful load produces: a handle to release later, and the
/// factory the handle keeps alive.
pub struct LoadedModule {
    pub handle: ModuleHandle,
    pub factory: PluginFactory,
}

/// Abstracts "load a code unit, locate its factory, later release it" so
/// the Supervisor does not hard-code dynamic-library loading. Production
/// code uses [`DylibLoader`]; tests use [`InMemoryLoader`].
pub trait ModuleLoader: Send + Sync {
    /// Loads the code unit for `plugin_name` from `bundle_path` under the
    /// given unique `load_tag`.
    fn load(
        &self,
        plugin_name: &str,
        bundle_path: &Path,
        load_tag: &str,
    ) -> Result<LoadedModule, SupervisorError>;

    /// Releases the module cache entry for `handle`. Best-effort: dynamic
    /// unloading of native code is never fully guaranteed to reclaim every
    /// resource, matching the design note's "full symbol reclamation is
    /// best-effort."
    fn unload(&self, handle: &ModuleHandle);
}

/// Loads plugins as platform shared libraries
/// (`{DLL_PREFIX}plugin{DLL_SUFFIX}` inside the bundle directory),
/// looking up the exported symbol `mk_plugin_create`. The `Library` is kept
/// alive in a cache keyed by load tag for as long as the plugin stays
/// loaded, since the raw entry-point pointer is only valid while the
/// library remains mapped.
#[derive(Default)]
pub struct DylibLoader {
    libraries: SyncMutex<HashMap<String, libloading::Library>>,
}

impl DylibLoader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModuleLoader for DylibLoader {
    fn load(
        &self,
        plugin_name: &str,
        bundle_path: &Path,
        load_tag: &str,
    ) -> Result<LoadedModule, SupervisorError> {
        let filename = libloading::library_filename("plugin");
        let lib_path = bundle_path.join(filename);

        // SAFETY: plugin code units are trusted up to the audit hook's
        // pass/fail contract (see Supervisor::load step 1); the kernel
        // cannot verify the library's invariants beyond that.
        let library = unsafe { libloading::Library::new(&lib_path) }.map_err(|e| {
            SupervisorError::ModuleLoad {
                plugin: plugin_name.to_string(),
                cause: e.to_string(),
            }
        })?;

        let entry: PluginEntryFn = unsafe {
            let symbol = library
                .get::<PluginEntryFn>(b"mk_plugin_create\0")
                .map_err(|e| SupervisorError::BadContract {
                    plugin: plugin_name.to_string(),
                    reason: format!("missing exported symbol 'mk_plugin_create': {e}"),
                })?;
            *symbol
        };

        self.libraries
            .lock()
            .insert(load_tag.to_string(), library);

        let factory: PluginFactory = Arc::new(move |facade| {
            // SAFETY: `entry` is required by the plugin contract to return
            // a pointer from `Box::into_raw(Box<dyn Plugin>)`; the library
            // backing it stays loaded for as long as this closure is
            // reachable, since it is kept in `libraries` under the same
            // load tag.
            unsafe { Box::from_raw(entry(facade)) }
        });

        Ok(LoadedModule {
            handle: ModuleHandle {
                load_tag: load_tag.to_string(),
            },
            factory,
        })
    }

    fn unload(&self, handle: &ModuleHandle) {
        self.libraries.lock().remove(&handle.load_tag);
    }
}

/// A deterministic test double standing in for dynamic loading: plugin
/// authors register a factory closure by plugin name ahead of time instead
/// of shipping a compiled shared library. Modeled on a factory-registry
/// loader pattern (a `HashMap<String, Box<dyn Fn() -> ...>>` keyed by
/// plugin id), generalized here to a per-instance, installable loader.
#[derive(Default)]
pub struct InMemoryLoader {
    factories: SyncMutex<HashMap<String, PluginFactory>>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the factory a later `load("name", ...)` call should use.
    pub fn register(
        &self,
        plugin_name: &str,
        factory: impl Fn(Arc<Facade>) -> Box<dyn Plugin> + Send + Sync + 'static,
    ) {
        self.factories
            .lock()
            .insert(plugin_name.to_string(), Arc::new(factory));
    }
}

impl ModuleLoader for InMemoryLoader {
    fn load(
        &self,
        plugin_name: &str,
        _bundle_path: &Path,
        load_tag: &str,
    ) -> Result<LoadedModule, SupervisorError> {
        let factory = self
            .factories
            .lock()
            .get(plugin_name)
            .cloned()
            .ok_or_else(|| SupervisorError::ModuleLoad {
                plugin: plugin_name.to_string(),
                cause: "no factory registered with the in-memory loader".to_string(),
            })?;

        Ok(LoadedModule {
            handle: ModuleHandle {
                load_tag: load_tag.to_string(),
            },
            factory,
        })
    }

    fn unload(&self, _handle: &ModuleHandle) {
        // Nothing to release: the factory closure is cheap and owned by
        // the test, not by a cache keyed on load generation.
    }
}

/// Exports a plugin's factory under the symbol `mk_plugin_create`, for use
/// from a `cdylib` crate loaded by [`DylibLoader`].
///
/// ```rust,ignore
/// struct EchoPlugin { facade: std::sync::Arc<mk_kernel::facade::Facade> }
///
/// #[async_trait::async_trait]
/// impl mk_kernel::plugin_abi::Plugin for EchoPlugin {
///     async fn start(&self) -> Result<(), String> { Ok(()) }
///     async fn stop(&self) -> Result<(), String> { Ok(()) }
/// }
///
/// mk_kernel::declare_plugin!(EchoPlugin, |facade| EchoPlugin { facade });
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($plugin_type:ty, $constructor:expr) => {
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn mk_plugin_create(
            facade: ::std::sync::Arc<$crate::facade::Facade>,
        ) -> *mut dyn $crate::plugin_abi::Plugin {
            let constructor: fn(::std::sync::Arc<$crate::facade::Facade>) -> $plugin_type =
                $constructor;
            let instance: $plugin_type = constructor(facade);
            let boxed: Box<dyn $crate::plugin_abi::Plugin> = Box::new(instance);
            Box::into_raw(boxed)
        }
    };
}
