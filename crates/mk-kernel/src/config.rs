//! The configuration record replacing the source's ad-hoc constants
//! (`SPEC_FULL.md` §9): plugin root, worker pool size, timeouts, the
//! reserved-key policy, and the audit hook.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use mk_registry::{ExactMatchPolicy, ProtectedKeyPolicy};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAMES: &[&str] = &["mk.yaml", "mk.yml", ".mk.yaml", ".mk.yml"];

/// Findings an audit hook reports for a plugin's entry file. Empty means
/// the hook passed the load.
pub type AuditFindings = Vec<String>;

/// The pluggable, advisory code-security static auditor's contract: given
/// a plugin's entry file, report findings (empty = pass). Non-empty
/// findings abort the load with a security-block error. The auditor
/// itself is out of scope; this is only the contract the core consumes.
pub trait AuditHook: Send + Sync {
    /// Inspects `entry_file` and returns any findings.
    fn audit(&self, entry_file: &Path) -> AuditFindings;
}

/// The default hook: passes everything. Appropriate only when a real
/// auditor is wired in by the embedder.
pub struct NoopAuditHook;

impl AuditHook for NoopAuditHook {
    fn audit(&self, _entry_file: &Path) -> AuditFindings {
        Vec::new()
    }
}

/// The on-disk/serde-visible shape of the configuration, before timeouts
/// are materialized into `Duration` and the policy/hook trait objects are
/// attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfigSchema {
    pub plugin_root_path: PathBuf,
    pub worker_pool_size: usize,
    pub start_timeout_secs: f64,
    pub stop_timeout_secs: f64,
    pub task_grace_secs: f64,
    pub protected_keys: Vec<String>,
}

impl Default for KernelConfigSchema {
    fn default() -> Self {
        KernelConfigSchema {
            plugin_root_path: PathBuf::from("plugins"),
            worker_pool_size: 5,
            start_timeout_secs: 3.0,
            stop_timeout_secs: 2.0,
            task_grace_secs: 1.0,
            protected_keys: vec!["admin".to_string()],
        }
    }
}

/// The kernel's runtime configuration.
pub struct KernelConfig {
    pub plugin_root_path: PathBuf,
    pub worker_pool_size: usize,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
    pub task_grace: Duration,
    pub protected_key_policy: Arc<dyn ProtectedKeyPolicy>,
    pub audit_hook: Arc<dyn AuditHook>,
}

impl KernelConfig {
    /// Builds a config from the serde-visible schema, defaulting the
    /// policy and hook to the reference implementations.
    pub fn from_schema(schema: KernelConfigSchema) -> Self {
        KernelConfig {
            plugin_root_path: schema.plugin_root_path,
            worker_pool_size: schema.worker_pool_size,
            start_timeout: Duration::from_secs_f64(schema.start_timeout_secs),
            stop_timeout: Duration::from_secs_f64(schema.stop_timeout_secs),
            task_grace: Duration::from_secs_f64(schema.task_grace_secs),
            protected_key_policy: Arc::new(ExactMatchPolicy::new(schema.protected_keys)),
            audit_hook: Arc::new(NoopAuditHook),
        }
    }

    /// Defaults mirroring the source: 5 workers, 3s/2s/1s timeouts, the
    /// `{"admin"}` protected-key set, and a no-op audit hook.
    pub fn with_plugin_root(plugin_root_path: impl Into<PathBuf>) -> Self {
        let mut schema = KernelConfigSchema::default();
        schema.plugin_root_path = plugin_root_path.into();
        KernelConfig::from_schema(schema)
    }
}

/// Searches conventional filenames for a kernel configuration file and
/// layers environment overrides (prefix `MK_`) on top, via `figment`.
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        ConfigLoader {
            search_paths: Vec::new(),
        }
    }

    /// Adds a directory to search for a config file, in insertion order.
    pub fn add_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn with_current_dir(self) -> Self {
        self.add_search_path(".")
    }

    /// Adds the platform user config directory (`$XDG_CONFIG_HOME/mk` on
    /// Linux, etc.), if one can be determined. A no-op otherwise.
    pub fn with_user_config_dir(mut self) -> Self {
        if let Some(dir) = dirs::config_dir() {
            self.search_paths.push(dir.join("mk"));
        }
        self
    }

    /// Loads the first conventional filename found across the configured
    /// search paths, merged under environment overrides. Falls back to
    /// built-in defaults (with environment overrides still applied) if no
    /// file is found.
    pub fn load(&self) -> Result<KernelConfig, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(KernelConfigSchema::default()));

        if let Some(found) = self.find_config_file() {
            figment = figment.merge(Yaml::file(found));
        }
        figment = figment.merge(Env::prefixed("MK_").split("_"));

        let schema: KernelConfigSchema = figment.extract()?;
        Ok(KernelConfig::from_schema(schema))
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        for dir in &self.search_paths {
            for name in CONFIG_FILE_NAMES {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
