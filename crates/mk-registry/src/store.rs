//! Scoped key-value state: a `global` map and one `local` submap per
//! plugin.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::error::RegistryError;

/// Which map a [`crate::Registry`] data operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The single shared map, visible to every plugin.
    Global,
    /// The caller's own submap, auto-created on first write.
    Local,
}

/// Decides whether a global key is write-protected.
///
/// The reference policy ([`ExactMatchPolicy`]) rejects exact matches against
/// a configured set, defaulting to `{"admin"}`. A `kernel_`-prefix policy
/// (the source's other documented variant) can be supplied instead by
/// implementing this trait.
pub trait ProtectedKeyPolicy: Send + Sync {
    /// Returns whether `key` is protected against global writes.
    fn is_protected(&self, key: &str) -> bool;
}

/// The reference protected-key policy: exact string match against a
/// configured set.
pub struct ExactMatchPolicy {
    protected: HashSet<String>,
}

impl ExactMatchPolicy {
    /// Builds a policy protecting exactly the given keys.
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        ExactMatchPolicy {
            protected: keys.into_iter().collect(),
        }
    }

    /// The default policy: only `"admin"` is protected.
    pub fn default_policy() -> Self {
        ExactMatchPolicy::new(["admin".to_string()])
    }
}

impl ProtectedKeyPolicy for ExactMatchPolicy {
    fn is_protected(&self, key: &str) -> bool {
        self.protected.contains(key)
    }
}

#[derive(Default)]
pub(crate) struct ScopedData {
    global: HashMap<String, Value>,
    local: HashMap<String, HashMap<String, Value>>,
}

impl ScopedData {
    pub(crate) fn get(&self, caller: &str, key: &str, scope: Scope) -> Option<Value> {
        match scope {
            Scope::Global => self.global.get(key).cloned(),
            Scope::Local => self.local.get(caller).and_then(|m| m.get(key)).cloned(),
        }
    }

    /// Returns `Err(RegistryError::ProtectedKey)` when a global write was
    /// refused by the policy.
    pub(crate) fn set(
        &mut self,
        caller: &str,
        key: &str,
        value: Value,
        scope: Scope,
        policy: &dyn ProtectedKeyPolicy,
    ) -> Result<(), RegistryError> {
        match scope {
            Scope::Global => {
                if policy.is_protected(key) {
                    return Err(RegistryError::ProtectedKey {
                        key: key.to_string(),
                    });
                }
                self.global.insert(key.to_string(), value);
                Ok(())
            }
            Scope::Local => {
                self.local
                    .entry(caller.to_string())
                    .or_default()
                    .insert(key.to_string(), value);
                Ok(())
            }
        }
    }

    /// Drops a plugin's local submap entirely, on unload.
    pub(crate) fn drop_local(&mut self, plugin: &str) {
        self.local.remove(plugin);
    }
}
