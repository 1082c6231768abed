//! Owner-tagged subscriptions and the subscription table they live in.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::CallbackOutcome;

/// A subscriber callback. Takes the event's argument map and returns its
/// outcome asynchronously; the worker pool and the inline `call` path both
/// drive this the same way, just on different executors.
pub type Callback = Arc<dyn Fn(Value) -> BoxFuture<'static, CallbackOutcome> + Send + Sync>;

/// One `(callback, owner)` registration against an event name.
#[derive(Clone)]
pub struct Subscription {
    /// The subscriber.
    pub callback: Callback,
    /// The plugin that registered this subscription; used for bulk removal
    /// on unload.
    pub owner: String,
}

#[derive(Default)]
pub(crate) struct EventBuckets {
    buckets: HashMap<String, Vec<Subscription>>,
}

impl EventBuckets {
    pub(crate) fn register(&mut self, event: &str, owner: &str, callback: Callback) {
        self.buckets
            .entry(event.to_string())
            .or_default()
            .push(Subscription {
                callback,
                owner: owner.to_string(),
            });
    }

    /// Removes every subscription owned by `owner`, across all events.
    /// Buckets left empty are dropped.
    pub(crate) fn unregister_by_owner(&mut self, owner: &str) {
        self.buckets.retain(|_, subs| {
            subs.retain(|s| s.owner != owner);
            !subs.is_empty()
        });
    }

    /// A shallow copy of the subscriber list for `event`, taken while the
    /// caller holds the registry lock. Dispatch proceeds against this copy
    /// after the lock is released, so concurrent `on`/`unload` calls never
    /// affect an in-flight dispatch.
    pub(crate) fn snapshot(&self, event: &str) -> Vec<Subscription> {
        self.buckets.get(event).cloned().unwrap_or_default()
    }
}
