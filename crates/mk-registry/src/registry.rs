//! The State & Event Registry: one re-entrant lock guarding both the
//! scoped data store and the subscription table, plus the two dispatch
//! paths (`emit` asynchronous, `call` synchronous) built over it.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::ReentrantMutex;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot};
use tokio::time::Instant;
use tracing::warn;

use crate::error::CallbackOutcome;
use crate::events::{Callback, EventBuckets};
use crate::store::{ProtectedKeyPolicy, Scope, ScopedData};

struct RegistryState {
    data: ScopedData,
    events: EventBuckets,
    policy: Arc<dyn ProtectedKeyPolicy>,
}

/// Thread-safe store for global/local scoped data and owner-tagged event
/// subscriptions, shared by every plugin's facade.
pub struct Registry {
    inner: ReentrantMutex<RefCell<RegistryState>>,
    pool: WorkerPool,
}

impl Registry {
    /// Builds a registry with the given protected-key policy and async
    /// fan-out worker count. Must be called from within a Tokio runtime:
    /// the worker pool spawns its tasks immediately.
    pub fn new(policy: Arc<dyn ProtectedKeyPolicy>, worker_pool_size: usize) -> Self {
        Registry {
            inner: ReentrantMutex::new(RefCell::new(RegistryState {
                data: ScopedData::default(),
                events: EventBuckets::default(),
                policy,
            })),
            pool: WorkerPool::new(worker_pool_size),
        }
    }

    /// Reads `key` in `scope`, returning `default` if absent.
    pub fn get(&self, caller: &str, key: &str, scope: Scope, default: Value) -> Value {
        let guard = self.inner.lock();
        guard.borrow().data.get(caller, key, scope).unwrap_or(default)
    }

    /// Writes `key` in `scope`. A refused protected-global write is logged
    /// and otherwise silently dropped, per the spec.
    pub fn set(&self, caller: &str, key: &str, value: Value, scope: Scope) {
        let guard = self.inner.lock();
        let mut state = guard.borrow_mut();
        let policy = state.policy.clone();
        if let Err(err) = state.data.set(caller, key, value, scope, policy.as_ref()) {
            warn!(plugin = caller, "{err}");
        }
    }

    /// Registers `callback` against `event`, tagged with `owner`.
    pub fn on(&self, event: &str, owner: &str, callback: Callback) {
        let guard = self.inner.lock();
        guard.borrow_mut().events.register(event, owner, callback);
    }

    /// Removes every subscription owned by `owner`, across all events.
    pub fn unregister_by_owner(&self, owner: &str) {
        let guard = self.inner.lock();
        guard.borrow_mut().events.unregister_by_owner(owner);
    }

    /// Drops `plugin`'s local-scope submap entirely.
    pub fn drop_local(&self, plugin: &str) {
        let guard = self.inner.lock();
        guard.borrow_mut().data.drop_local(plugin);
    }

    /// Asynchronous fan-out: snapshots `event`'s subscribers under the
    /// lock, releases it, then submits one job per subscriber to the
    /// bounded worker pool. Returns one handle per subscriber, in
    /// subscription order; completion order is unspecified.
    pub fn emit(&self, event: &str, args: Value) -> Vec<EmitHandle> {
        let snapshot = {
            let guard = self.inner.lock();
            guard.borrow().events.snapshot(event)
        };

        let mut handles = Vec::with_capacity(snapshot.len());
        for sub in snapshot {
            let (tx, rx) = oneshot::channel();
            let args = args.clone();
            let job: BoxFuture<'static, ()> = async move {
                let outcome = (sub.callback)(args).await;
                let _ = tx.send(outcome);
            }
            .boxed();
            self.pool.submit(job);
            handles.push(EmitHandle(rx));
        }
        handles
    }

    /// Synchronous fan-out: same snapshot step, but every callback runs
    /// inline on the caller's task, in subscription order. `timeout` is an
    /// advisory budget for the whole call; once it elapses, remaining
    /// subscribers are skipped and reified as timeout errors rather than
    /// invoked, so the result list still matches the snapshot positionally.
    pub async fn call(&self, event: &str, args: Value, timeout: Duration) -> Vec<CallbackOutcome> {
        let snapshot = {
            let guard = self.inner.lock();
            guard.borrow().events.snapshot(event)
        };

        let deadline = Instant::now() + timeout;
        let mut results = Vec::with_capacity(snapshot.len());
        for sub in snapshot {
            if Instant::now() >= deadline {
                results.push(Err("call timed out before this subscriber ran".to_string()));
                continue;
            }
            results.push((sub.callback)(args.clone()).await);
        }
        results
    }
}

/// A handle to one asynchronous subscriber invocation, returned by
/// [`Registry::emit`].
pub struct EmitHandle(oneshot::Receiver<CallbackOutcome>);

impl EmitHandle {
    /// Awaits this subscriber's outcome.
    pub async fn result(self) -> CallbackOutcome {
        self.0
            .await
            .unwrap_or_else(|_| Err("worker dropped before completing".to_string()))
    }
}

/// A fixed set of Tokio tasks pulling jobs off a shared queue, bounding how
/// many subscriber callbacks run concurrently during `emit`.
struct WorkerPool {
    sender: mpsc::UnboundedSender<BoxFuture<'static, ()>>,
}

impl WorkerPool {
    fn new(worker_count: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel::<BoxFuture<'static, ()>>();
        let receiver = Arc::new(AsyncMutex::new(receiver));
        for _ in 0..worker_count.max(1) {
            let receiver = receiver.clone();
            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut guard = receiver.lock().await;
                        guard.recv().await
                    };
                    match job {
                        Some(job) => job.await,
                        None => break,
                    }
                }
            });
        }
        WorkerPool { sender }
    }

    fn submit(&self, job: BoxFuture<'static, ()>) {
        // The channel is unbounded so `emit` never blocks the caller; the
        // fixed worker count still bounds concurrent execution.
        let _ = self.sender.send(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ExactMatchPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> Registry {
        Registry::new(Arc::new(ExactMatchPolicy::default_policy()), 5)
    }

    #[tokio::test]
    async fn scoped_data_round_trips() {
        let reg = registry();
        reg.set("p", "k", Value::from(42), Scope::Local);
        assert_eq!(reg.get("p", "k", Scope::Local, Value::Null), Value::from(42));
        assert_eq!(reg.get("other", "k", Scope::Local, Value::Null), Value::Null);
    }

    #[tokio::test]
    async fn emit_dispatches_to_all_subscribers() {
        let reg = registry();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let counter = counter.clone();
            reg.on(
                "tick",
                "p",
                Arc::new(move |_| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(Value::Null)
                    }
                    .boxed()
                }),
            );
        }
        let handles = reg.emit("tick", Value::Null);
        assert_eq!(handles.len(), 3);
        for h in handles {
            h.result().await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn call_is_inline_ordered_and_isolates_errors() {
        let reg = registry();
        reg.on(
            "e",
            "p",
            Arc::new(|_| async { Ok(Value::from(0)) }.boxed()),
        );
        reg.on(
            "e",
            "p",
            Arc::new(|_| async { Err("boom".to_string()) }.boxed()),
        );
        reg.on(
            "e",
            "p",
            Arc::new(|_| async { Ok(Value::from(2)) }.boxed()),
        );

        let results = reg.call("e", Value::Null, Duration::from_secs(1)).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0], Ok(Value::from(0)));
        assert_eq!(results[1], Err("boom".to_string()));
        assert_eq!(results[2], Ok(Value::from(2)));
    }

    #[tokio::test]
    async fn unregister_by_owner_stops_future_dispatch() {
        let reg = registry();
        reg.on("e", "p", Arc::new(|_| async { Ok(Value::Null) }.boxed()));
        reg.unregister_by_owner("p");
        let handles = reg.emit("e", Value::Null);
        assert!(handles.is_empty());
    }

    #[tokio::test]
    async fn snapshot_isolation_ignores_concurrent_unregister() {
        let reg = registry();
        reg.on(
            "e",
            "p",
            Arc::new(|_| {
                async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(Value::from(1))
                }
                .boxed()
            }),
        );
        reg.on("e", "q", Arc::new(|_| async { Ok(Value::from(2)) }.boxed()));

        let call = reg.call("e", Value::Null, Duration::from_secs(1));
        let unregister = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            reg.unregister_by_owner("p");
        };
        let (results, _) = tokio::join!(call, unregister);

        // Both subscribers ran even though "p" was unregistered mid-flight:
        // the snapshot was captured before dispatch began.
        assert_eq!(results, vec![Ok(Value::from(1)), Ok(Value::from(2))]);
        // The unregister did take effect for subsequent dispatches.
        let handles = reg.emit("e", Value::Null);
        assert_eq!(handles.len(), 1);
    }
}
