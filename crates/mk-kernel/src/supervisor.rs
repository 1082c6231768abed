//! C5: load/unload/reload/init/shutdown sequencing over the plugin
//! registry. Every step here is independently fault-tolerant — a failure
//! in one step is logged and the sequence continues wherever the spec
//! allows it to (`SPEC_FULL.md` §4.5).

use std::sync::Arc;

use tracing::warn;

use crate::error::{KernelError, KernelResult, SupervisorError};
use crate::facade::Facade;
use crate::kernel::{Kernel, PluginRuntime, PluginState};
use crate::plugin_abi::Plugin;

impl Kernel {
    /// Loads `name`. A no-op success if already active. See the module
    /// doc comment for the step sequence.
    pub async fn load(&self, name: &str) -> Result<(), SupervisorError> {
        let (bundle_path, already_active) = {
            let plugins = self.0.plugins.lock();
            let meta = plugins
                .get(name)
                .ok_or_else(|| SupervisorError::UnknownPlugin(name.to_string()))?;
            (meta.path.clone(), meta.is_active())
        };
        if already_active {
            return Ok(());
        }

        let entry_file = bundle_path.join(libloading::library_filename("plugin"));
        let findings = self.0.config.audit_hook.audit(&entry_file);
        if !findings.is_empty() {
            let err = SupervisorError::AuditBlocked {
                plugin: name.to_string(),
                findings,
            };
            self.record_load_failure(name, &err);
            return Err(err);
        }

        let load_tag = self.0.next_load_tag(name);
        let loaded = match self.0.module_loader.load(name, &bundle_path, &load_tag) {
            Ok(loaded) => loaded,
            Err(e) => {
                self.record_load_failure(name, &e);
                return Err(e);
            }
        };

        {
            let mut plugins = self.0.plugins.lock();
            if let Some(meta) = plugins.get_mut(name) {
                meta.state = PluginState::Loaded;
            }
        }

        let facade = Facade::new(self.0.weak_self(), name.to_string(), bundle_path.clone());
        let instance: Arc<dyn Plugin> = Arc::from((loaded.factory)(facade.clone()));

        let watched = {
            let instance = instance.clone();
            tokio::spawn(async move { instance.start().await })
        };

        match tokio::time::timeout(self.0.config.start_timeout, watched).await {
            Ok(Ok(Ok(()))) => {
                let mut plugins = self.0.plugins.lock();
                if let Some(meta) = plugins.get_mut(name) {
                    meta.state = PluginState::Active;
                    meta.last_error = None;
                    meta.runtime = Some(PluginRuntime {
                        module_handle: loaded.handle,
                        instance,
                        facade,
                    });
                }
                Ok(())
            }
            Ok(Ok(Err(cause))) => {
                let _ = instance.stop().await;
                self.0.module_loader.unload(&loaded.handle);
                let err = SupervisorError::StartFailed {
                    plugin: name.to_string(),
                    cause,
                };
                self.record_load_failure(name, &err);
                Err(err)
            }
            Ok(Err(join_err)) => {
                let _ = instance.stop().await;
                self.0.module_loader.unload(&loaded.handle);
                let err = SupervisorError::StartFailed {
                    plugin: name.to_string(),
                    cause: join_err.to_string(),
                };
                self.record_load_failure(name, &err);
                Err(err)
            }
            Err(_elapsed) => {
                // The watched task is still running; it is not cancelled.
                // Sever it from further kernel calls instead.
                facade.trip_stop_signal();
                let err = SupervisorError::StartTimeout(name.to_string());
                self.record_load_failure(name, &err);
                Err(err)
            }
        }
    }

    fn record_load_failure(&self, name: &str, err: &SupervisorError) {
        warn!(plugin = name, "load failed: {err}");
        let mut plugins = self.0.plugins.lock();
        if let Some(meta) = plugins.get_mut(name) {
            meta.state = PluginState::Unloaded;
            meta.runtime = None;
            meta.last_error = Some(err.to_string());
        }
    }

    /// Unloads `name`. A no-op if not active. Every step runs even if an
    /// earlier one failed; failures are logged, not propagated.
    pub async fn unload(&self, name: &str) -> Result<(), SupervisorError> {
        let runtime = {
            let mut plugins = self.0.plugins.lock();
            let meta = plugins
                .get_mut(name)
                .ok_or_else(|| SupervisorError::UnknownPlugin(name.to_string()))?;
            if !meta.is_active() {
                return Ok(());
            }
            meta.state = PluginState::Stopping;
            meta.runtime.take()
        };
        let Some(runtime) = runtime else {
            return Ok(());
        };

        match tokio::time::timeout(self.0.config.stop_timeout, runtime.instance.stop()).await {
            Ok(Ok(())) => {}
            Ok(Err(cause)) => warn!(plugin = name, "stop() raised: {cause}"),
            Err(_) => warn!(plugin = name, "stop() timed out"),
        }

        runtime.facade.cleanup(self.0.config.task_grace).await;
        self.0.registry.unregister_by_owner(name);
        self.0.registry.drop_local(name);
        self.0.module_loader.unload(&runtime.module_handle);
        drop(runtime);

        let mut plugins = self.0.plugins.lock();
        if let Some(meta) = plugins.get_mut(name) {
            meta.state = PluginState::Unloaded;
            meta.runtime = None;
        }
        Ok(())
    }

    /// Cascading reload: unloads `name`'s reverse-dependency set (leaves
    /// first), unloads `name`, rescans, reloads `name`, then reloads the
    /// reverse-dependency set in forward order. A failed base reload
    /// leaves the reverse-dependency set unloaded rather than propagating
    /// it further.
    pub async fn reload(&self, name: &str) -> KernelResult<()> {
        if !self.0.plugins.lock().contains_key(name) {
            warn!(plugin = name, "reload requested for an unknown plugin");
            return Err(KernelError::Supervisor(SupervisorError::UnknownPlugin(
                name.to_string(),
            )));
        }

        let (manifests, order) = self.manifest_snapshot();
        let report = mk_core::resolve(&manifests, &order);
        let reverse = mk_core::reverse_dependencies(name, &report.order, &manifests);

        for dependent in reverse.iter().rev() {
            let _ = self.unload(dependent).await;
        }
        let _ = self.unload(name).await;

        self.scan()?;

        match self.load(name).await {
            Ok(()) => {
                for dependent in &reverse {
                    if let Err(e) = self.load(dependent).await {
                        warn!(plugin = dependent, "reload of dependent failed: {e}");
                    }
                }
                Ok(())
            }
            Err(e) => {
                warn!(plugin = name, "reload base failed, dependents left unloaded: {e}");
                Err(KernelError::Supervisor(e))
            }
        }
    }

    /// Scans, resolves, and loads every plugin in forward topological
    /// order. Excluded plugins (cycles, missing deps) are logged, not
    /// fatal.
    pub async fn init(&self) -> KernelResult<()> {
        self.scan()?;
        let (manifests, order) = self.manifest_snapshot();
        let report = mk_core::resolve(&manifests, &order);
        for (excluded, err) in &report.errors {
            warn!(plugin = excluded, "excluded from load order: {err}");
        }
        for name in &report.order {
            if let Err(e) = self.load(name).await {
                warn!(plugin = name, "failed to load during init: {e}");
            }
        }
        Ok(())
    }

    /// Unloads every active plugin in reverse topological order, then any
    /// remaining active plugin the current resolve couldn't place (e.g. one
    /// whose dependency became unsatisfiable after it was already active).
    pub async fn shutdown(&self) {
        let (manifests, order) = self.manifest_snapshot();
        let report = mk_core::resolve(&manifests, &order);
        for name in report.order.iter().rev() {
            self.unload_and_log(name).await;
        }

        let stragglers: Vec<String> = {
            let plugins = self.0.plugins.lock();
            plugins
                .iter()
                .filter(|(_, meta)| meta.is_active())
                .map(|(name, _)| name.clone())
                .collect()
        };
        for name in stragglers {
            self.unload_and_log(&name).await;
        }
    }

    async fn unload_and_log(&self, name: &str) {
        if let Err(e) = self.unload(name).await {
            warn!(plugin = name, "failed to unload during shutdown: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::plugin_abi::InMemoryLoader;
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    struct CountingPlugin {
        name: String,
        log: Arc<SyncMutex<Vec<String>>>,
    }

    #[async_trait]
    impl Plugin for CountingPlugin {
        async fn start(&self) -> Result<(), String> {
            self.log.lock().push(format!("start:{}", self.name));
            Ok(())
        }
        async fn stop(&self) -> Result<(), String> {
            self.log.lock().push(format!("stop:{}", self.name));
            Ok(())
        }
    }

    fn write_bundle(root: &std::path::Path, name: &str, version: &str, deps: &[&str]) {
        let bundle = root.join(name);
        fs::create_dir(&bundle).unwrap();
        let deps_json: Vec<String> = deps.iter().map(|d| format!("\"{d}\"")).collect();
        fs::write(
            bundle.join("config.json"),
            format!(
                r#"{{"name":"{name}","version":"{version}","dependencies":[{}]}}"#,
                deps_json.join(",")
            ),
        )
        .unwrap();
    }

    fn kernel_with_loader(root: &std::path::Path) -> (Kernel, Arc<InMemoryLoader>, Arc<SyncMutex<Vec<String>>>) {
        let loader = Arc::new(InMemoryLoader::new());
        let log: Arc<SyncMutex<Vec<String>>> = Arc::new(SyncMutex::new(Vec::new()));
        for name in ["a", "b", "c", "core", "sec"] {
            let log = log.clone();
            let name_owned = name.to_string();
            loader.register(name, move |_facade| {
                Box::new(CountingPlugin {
                    name: name_owned.clone(),
                    log: log.clone(),
                }) as Box<dyn Plugin>
            });
        }
        let config = KernelConfig::with_plugin_root(root);
        let kernel = Kernel::new(config, loader.clone());
        (kernel, loader, log)
    }

    #[tokio::test]
    async fn bring_up_ordering_loads_dependencies_first() {
        let dir = tempdir().unwrap();
        write_bundle(dir.path(), "a", "1.0.0", &[]);
        write_bundle(dir.path(), "b", "1.0.0", &["a"]);
        write_bundle(dir.path(), "c", "1.0.0", &["b"]);
        let (kernel, _loader, log) = kernel_with_loader(dir.path());

        kernel.init().await.unwrap();

        let statuses = kernel.list();
        assert!(statuses.iter().all(|s| s.active));
        assert_eq!(
            log.lock().as_slice(),
            ["start:a", "start:b", "start:c"]
        );
    }

    #[tokio::test]
    async fn cycle_excludes_both_members() {
        let dir = tempdir().unwrap();
        write_bundle(dir.path(), "a", "1.0.0", &["b"]);
        write_bundle(dir.path(), "b", "1.0.0", &["a"]);
        let (kernel, _loader, log) = kernel_with_loader(dir.path());

        kernel.init().await.unwrap();

        let statuses = kernel.list();
        assert!(statuses.iter().all(|s| !s.active));
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn version_constraint_excludes_only_the_dependent() {
        let dir = tempdir().unwrap();
        write_bundle(dir.path(), "core", "1.0.0", &[]);
        write_bundle(dir.path(), "sec", "1.0.0", &["core>=2.0.0"]);
        let (kernel, _loader, _log) = kernel_with_loader(dir.path());

        kernel.init().await.unwrap();

        let statuses = kernel.list();
        let core = statuses.iter().find(|s| s.name == "core").unwrap();
        let sec = statuses.iter().find(|s| s.name == "sec").unwrap();
        assert!(core.active);
        assert!(!sec.active);
    }

    #[tokio::test]
    async fn reload_cascades_and_calls_start_stop_exactly_as_the_scenario_prescribes() {
        let dir = tempdir().unwrap();
        write_bundle(dir.path(), "a", "1.0.0", &[]);
        write_bundle(dir.path(), "b", "1.0.0", &["a"]);
        write_bundle(dir.path(), "c", "1.0.0", &["b"]);
        let (kernel, _loader, log) = kernel_with_loader(dir.path());

        kernel.init().await.unwrap();
        kernel.reload("a").await.unwrap();

        assert!(kernel.list().iter().all(|s| s.active));

        let events = log.lock().clone();
        let starts: Vec<&String> = events.iter().filter(|e| e.starts_with("start:")).collect();
        let stops: Vec<&String> = events.iter().filter(|e| e.starts_with("stop:")).collect();
        assert_eq!(starts.len(), 6, "each plugin starts twice: init + reload");
        assert_eq!(stops.len(), 3, "each plugin stops once, during reload");
        assert_eq!(stops.as_slice(), &["stop:c", "stop:b", "stop:a"]);
    }

    #[tokio::test]
    async fn load_idempotent_when_already_active() {
        let dir = tempdir().unwrap();
        write_bundle(dir.path(), "a", "1.0.0", &[]);
        let (kernel, _loader, log) = kernel_with_loader(dir.path());

        kernel.scan().unwrap();
        kernel.load("a").await.unwrap();
        kernel.load("a").await.unwrap();

        assert_eq!(log.lock().as_slice(), ["start:a"]);
    }

    #[tokio::test]
    async fn unload_idempotent_when_not_active() {
        let dir = tempdir().unwrap();
        write_bundle(dir.path(), "a", "1.0.0", &[]);
        let (kernel, _loader, _log) = kernel_with_loader(dir.path());

        kernel.scan().unwrap();
        kernel.unload("a").await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_unloads_everything_in_reverse_order() {
        let dir = tempdir().unwrap();
        write_bundle(dir.path(), "a", "1.0.0", &[]);
        write_bundle(dir.path(), "b", "1.0.0", &["a"]);
        let (kernel, _loader, log) = kernel_with_loader(dir.path());

        kernel.init().await.unwrap();
        kernel.shutdown().await;

        assert!(kernel.list().iter().all(|s| !s.active));
        let stops: Vec<&String> = log.lock().iter().filter(|e| e.starts_with("stop:")).collect();
        assert_eq!(stops, vec!["stop:b", "stop:a"]);
    }

    #[tokio::test]
    async fn start_timeout_trips_stop_signal_and_marks_unloaded() {
        let dir = tempdir().unwrap();
        write_bundle(dir.path(), "slow", "1.0.0", &[]);

        struct SlowPlugin;
        #[async_trait]
        impl Plugin for SlowPlugin {
            async fn start(&self) -> Result<(), String> {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            }
            async fn stop(&self) -> Result<(), String> {
                Ok(())
            }
        }

        let loader = Arc::new(InMemoryLoader::new());
        loader.register("slow", |_facade| Box::new(SlowPlugin) as Box<dyn Plugin>);
        let mut config = KernelConfig::with_plugin_root(dir.path());
        config.start_timeout = Duration::from_millis(20);
        let kernel = Kernel::new(config, loader);

        kernel.scan().unwrap();
        let err = kernel.load("slow").await.unwrap_err();
        assert!(matches!(err, SupervisorError::StartTimeout(_)));
        assert!(!kernel.list().iter().find(|s| s.name == "slow").unwrap().active);
    }
}
