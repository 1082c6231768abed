//! C4: the per-plugin capability facade.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use mk_registry::{CallbackOutcome, Callback, EmitHandle, Scope};
use parking_lot::Mutex as SyncMutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::FacadeError;
use crate::kernel::KernelInner;

/// The restricted interface exposed to plugin code. Holds a non-owning
/// back-reference to the kernel: once the kernel shuts down, every
/// kernel-dereferencing operation fails with [`FacadeError::KernelGone`],
/// while facade-local bookkeeping keeps working.
pub struct Facade {
    kernel: Weak<KernelInner>,
    plugin_name: String,
    plugin_dir: PathBuf,
    stop_signal: Arc<AtomicBool>,
    managed_tasks: SyncMutex<Vec<JoinHandle<()>>>,
    subscribed_events: SyncMutex<Vec<String>>,
}

impl Facade {
    pub(crate) fn new(kernel: Weak<KernelInner>, plugin_name: String, plugin_dir: PathBuf) -> Arc<Self> {
        Arc::new(Facade {
            kernel,
            plugin_name,
            plugin_dir,
            stop_signal: Arc::new(AtomicBool::new(false)),
            managed_tasks: SyncMutex::new(Vec::new()),
            subscribed_events: SyncMutex::new(Vec::new()),
        })
    }

    fn kernel(&self) -> Result<Arc<KernelInner>, FacadeError> {
        self.kernel.upgrade().ok_or(FacadeError::KernelGone)
    }

    /// Appends a line tagged with this plugin's name and the current task.
    /// Facade-local: works even after the kernel is gone.
    pub fn log(&self, message: &str) {
        info!(plugin = %self.plugin_name, "{message}");
    }

    /// Reads and parses `config.json` from this plugin's bundle directory.
    /// Returns an empty mapping on absence or parse failure, never an
    /// error: configuration is advisory to the plugin.
    pub fn get_plugin_config(&self) -> Value {
        let path = self.plugin_dir.join("config.json");
        std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
            .unwrap_or_else(|| Value::Object(Default::default()))
    }

    /// Reads `key` in `scope` (defaulting to [`Scope::Global`]), returning
    /// `default` if absent.
    pub fn get_data(&self, key: &str, scope: Option<Scope>, default: Value) -> Result<Value, FacadeError> {
        let kernel = self.kernel()?;
        let scope = scope.unwrap_or(Scope::Global);
        Ok(kernel.registry.get(&self.plugin_name, key, scope, default))
    }

    /// Writes `key` in `scope` (defaulting to [`Scope::Local`], the
    /// write-safe default).
    pub fn set_data(&self, key: &str, value: Value, scope: Option<Scope>) -> Result<(), FacadeError> {
        let kernel = self.kernel()?;
        let scope = scope.unwrap_or(Scope::Local);
        kernel.registry.set(&self.plugin_name, key, value, scope);
        Ok(())
    }

    /// Subscribes `callback` to `event`, tagged with this plugin's owner
    /// name for bulk removal on unload.
    pub fn on(&self, event: &str, callback: Callback) -> Result<(), FacadeError> {
        let kernel = self.kernel()?;
        kernel.registry.on(event, &self.plugin_name, callback);
        self.subscribed_events.lock().push(event.to_string());
        Ok(())
    }

    /// Asynchronous fan-out; returns one handle per subscriber.
    pub fn emit(&self, event: &str, args: Value) -> Result<Vec<EmitHandle>, FacadeError> {
        let kernel = self.kernel()?;
        Ok(kernel.registry.emit(event, args))
    }

    /// Synchronous, inline, ordered fan-out with an advisory timeout.
    pub async fn call(
        &self,
        event: &str,
        args: Value,
        timeout: Duration,
    ) -> Result<Vec<CallbackOutcome>, FacadeError> {
        let kernel = self.kernel()?;
        Ok(kernel.registry.call(event, args, timeout).await)
    }

    /// Starts a managed concurrent task. Fails fast with
    /// [`FacadeError::NotActive`] if the stop signal is already set. The
    /// facade does not wrap `target`; cooperative exit by polling
    /// [`Facade::is_active`] is the task's own responsibility.
    ///
    /// `detached` tasks are fire-and-forget: the facade does not track them
    /// for the unload grace period. Non-detached tasks are joined (with a
    /// grace timeout) during cleanup.
    pub fn spawn_task<F>(&self, target: F, detached: bool) -> Result<(), FacadeError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.stop_signal.load(Ordering::SeqCst) {
            self.log("spawn_task refused: stop signal already set");
            return Err(FacadeError::NotActive);
        }
        let handle = tokio::spawn(target);
        if !detached {
            self.managed_tasks.lock().push(handle);
        }
        Ok(())
    }

    /// `¬stop_signal`. Managed tasks poll this between loop iterations.
    pub fn is_active(&self) -> bool {
        !self.stop_signal.load(Ordering::SeqCst)
    }

    /// Kernel-private: trips the stop signal without joining managed tasks,
    /// used when a runaway `start()` blows past its timeout — there is no
    /// managed task to wait for yet, only the kernel's further calls into
    /// this plugin that must stop resolving.
    pub(crate) fn trip_stop_signal(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Kernel-private: sets the stop signal and joins managed tasks with a
    /// per-task grace period. Tasks that do not terminate within the grace
    /// window are logged as zombies and left running; the runtime does not
    /// forcibly terminate them.
    pub(crate) async fn cleanup(&self, task_grace: Duration) {
        self.stop_signal.store(true, Ordering::SeqCst);
        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self.managed_tasks.lock();
            std::mem::take(&mut *guard)
        };
        for task in tasks {
            match tokio::time::timeout(task_grace, task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!(plugin = %self.plugin_name, "managed task panicked: {join_err}")
                }
                Err(_) => warn!(
                    plugin = %self.plugin_name,
                    "managed task ignored the stop signal within the grace window (zombie)"
                ),
            }
        }
    }

    pub(crate) fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    pub(crate) fn subscribed_events(&self) -> Vec<String> {
        self.subscribed_events.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn kernel_gone_after_weak_ref_invalidated() {
        let facade = Facade::new(Weak::new(), "p".to_string(), PathBuf::from("/tmp"));
        let err = facade.get_data("k", None, Value::Null).unwrap_err();
        assert_eq!(err, FacadeError::KernelGone);
    }

    #[tokio::test]
    async fn is_active_flips_once_after_cleanup_and_never_clears() {
        let facade = Facade::new(Weak::new(), "p".to_string(), PathBuf::from("/tmp"));
        assert!(facade.is_active());
        facade.cleanup(Duration::from_millis(50)).await;
        assert!(!facade.is_active());
    }

    #[tokio::test]
    async fn spawn_task_fails_fast_once_stopped() {
        let facade = Facade::new(Weak::new(), "p".to_string(), PathBuf::from("/tmp"));
        facade.cleanup(Duration::from_millis(10)).await;
        let err = facade.spawn_task(async {}, false).unwrap_err();
        assert_eq!(err, FacadeError::NotActive);
    }

    #[tokio::test]
    async fn cleanup_joins_cooperative_task_within_grace() {
        let facade = Facade::new(Weak::new(), "p".to_string(), PathBuf::from("/tmp"));
        let facade = Arc::new(facade);
        let inner = facade.clone();
        facade
            .spawn_task(
                async move {
                    while inner.is_active() {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    }
                },
                false,
            )
            .unwrap();
        facade.cleanup(Duration::from_millis(200)).await;
        assert!(!facade.is_active());
    }

    #[tokio::test]
    async fn zombie_task_is_logged_not_killed_and_kernel_stays_responsive() {
        let facade = Facade::new(Weak::new(), "p".to_string(), PathBuf::from("/tmp"));
        facade
            .spawn_task(async { tokio::time::sleep(Duration::from_secs(10)).await }, false)
            .unwrap();
        // Ignores the stop signal entirely; cleanup must still return
        // promptly once the grace window elapses rather than hanging.
        facade.cleanup(Duration::from_millis(20)).await;
        assert!(!facade.is_active());
    }
}
