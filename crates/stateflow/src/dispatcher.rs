//! # Runtime Dispatcher
//!
//! Resolves (typename, id) targets to live function instances, spawning
//! instance tasks lazily, and carries signals and requests between them.
//! Signals are fire-and-forget mailbox deliveries; requests suspend the
//! calling frame on a reply channel under a bounded timeout, with a wait
//! registry consulted up front so a request that would deadlock on its own
//! caller fails fast instead.

use crate::address::Address;
use crate::config::{FunctionConfig, RuntimeConfig};
use crate::egress::EgressRouter;
use crate::errors::RuntimeError;
use crate::instance::{InstanceRuntime, Invocation};
use crate::script::{RequestProvider, ScriptExecutor, SignalProvider};
use crate::shutdown::{ShutdownController, ShutdownType};
use crate::store::ContextStore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A function behavior registered under a typename.
pub(crate) struct FunctionRegistration {
    pub(crate) typename: String,
    pub(crate) config: FunctionConfig,
    pub(crate) executor: Arc<dyn ScriptExecutor>,
}

/// A live instance task and the sending side of its mailbox.
struct InstanceHandle {
    mailbox_tx: mpsc::Sender<Invocation>,
    join: JoinHandle<()>,
}

/// How a signal was routed, so the caller can record the right action.
#[derive(Debug)]
pub(crate) enum SignalRoute {
    /// Delivered to a registered local instance.
    Local,
    /// Published through the egress router.
    Egress { destination: String },
}

struct DispatcherInner {
    config: RuntimeConfig,
    registry: RwLock<HashMap<String, Arc<FunctionRegistration>>>,
    instances: Mutex<HashMap<Address, InstanceHandle>>,
    /// Who each suspended frame is currently waiting on, for cycle checks.
    waits: Mutex<HashMap<Address, Address>>,
    store: Arc<dyn ContextStore>,
    egress: Arc<dyn EgressRouter>,
    shutdown: Mutex<ShutdownController>,
    shutting_down: AtomicBool,
}

/// Cloneable handle to the dispatcher, shared by the public runtime API and
/// every bridge.
#[derive(Clone)]
pub struct DispatcherHandle {
    inner: Arc<DispatcherInner>,
}

impl DispatcherHandle {
    pub(crate) fn new(
        config: RuntimeConfig,
        store: Arc<dyn ContextStore>,
        egress: Arc<dyn EgressRouter>,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                config,
                registry: RwLock::new(HashMap::new()),
                instances: Mutex::new(HashMap::new()),
                waits: Mutex::new(HashMap::new()),
                store,
                egress,
                shutdown: Mutex::new(ShutdownController::new()),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn store(&self) -> Arc<dyn ContextStore> {
        self.inner.store.clone()
    }

    pub(crate) fn register(
        &self,
        registration: FunctionRegistration,
    ) -> Result<(), RuntimeError> {
        let mut registry = self.inner.registry.write().unwrap();
        if registry.contains_key(&registration.typename) {
            return Err(RuntimeError::AlreadyRegistered(registration.typename));
        }
        info!(typename = %registration.typename, "function type registered");
        registry.insert(registration.typename.clone(), Arc::new(registration));
        Ok(())
    }

    fn lookup(&self, typename: &str) -> Option<Arc<FunctionRegistration>> {
        self.inner.registry.read().unwrap().get(typename).cloned()
    }

    /// Dispatch a fire-and-forget signal. Local delivery enqueues into the
    /// target mailbox in the caller's program order; the egress route
    /// publishes the payload at `"{typename}.{id}"`.
    pub(crate) async fn signal(
        &self,
        caller: Address,
        provider: SignalProvider,
        target: Address,
        payload: Value,
        options: Value,
    ) -> Result<SignalRoute, RuntimeError> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(RuntimeError::ShuttingDown);
        }

        let registration = match provider {
            SignalProvider::Local => match self.lookup(&target.typename) {
                Some(registration) => Some(registration),
                None => return Err(RuntimeError::TargetNotFound(target.typename)),
            },
            SignalProvider::Topic => None,
            SignalProvider::Auto => self.lookup(&target.typename),
        };

        let Some(registration) = registration else {
            let destination = format!("{}.{}", target.typename, target.id);
            debug!(%caller, destination, "signal routed to egress");
            if let Err(e) = self.inner.egress.publish(&destination, &payload).await {
                // Topic publish is fire-and-forget; delivery failures are
                // not observable by the sender.
                warn!(destination, "egress publish failed: {}", e);
            }
            return Ok(SignalRoute::Egress { destination });
        };

        let mailbox_tx = self.ensure_instance(registration, &target);
        let invocation = Invocation {
            caller,
            payload,
            options,
            reply_tx: None,
        };
        match mailbox_tx.try_send(invocation) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(invocation)) => {
                // Target mailbox is saturated; finish the send off the
                // caller's path so signal keeps its no-suspend contract.
                warn!(%target, "target mailbox full, completing signal delivery in background");
                tokio::spawn(async move {
                    let _ = mailbox_tx.send(invocation).await;
                });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                return Err(RuntimeError::ChannelClosed(target));
            }
        }
        Ok(SignalRoute::Local)
    }

    /// Dispatch a synchronous request and suspend until its reply, an
    /// error, or the bounded timeout.
    pub(crate) async fn request(
        &self,
        caller: Address,
        _provider: RequestProvider,
        target: Address,
        payload: Value,
        options: Value,
        timeout_override: Option<Duration>,
    ) -> Result<Value, RuntimeError> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(RuntimeError::ShuttingDown);
        }

        let registration = self
            .lookup(&target.typename)
            .ok_or_else(|| RuntimeError::TargetNotFound(target.typename.clone()))?;

        let _wait_guard = self.begin_wait(&caller, &target)?;

        let mailbox_tx = self.ensure_instance(registration, &target);
        let (reply_tx, reply_rx) = oneshot::channel();
        let invocation = Invocation {
            caller: caller.clone(),
            payload,
            options,
            reply_tx: Some(reply_tx),
        };

        let wait = timeout_override.unwrap_or(self.inner.config.request_timeout);
        let outcome = tokio::time::timeout(wait, async {
            mailbox_tx
                .send(invocation)
                .await
                .map_err(|_| RuntimeError::ChannelClosed(target.clone()))?;
            reply_rx
                .await
                .map_err(|_| RuntimeError::ChannelClosed(target.clone()))?
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                debug!(%caller, %target, "request timed out after {:?}", wait);
                Err(RuntimeError::Timeout(target))
            }
        }
    }

    /// Register `caller -> target` in the wait map, refusing the edge when
    /// the target is already (transitively) suspended waiting on the
    /// caller, or when the caller requests itself.
    fn begin_wait(&self, caller: &Address, target: &Address) -> Result<WaitGuard, RuntimeError> {
        if caller.is_none() {
            // External requests have no frame to deadlock.
            return Ok(WaitGuard {
                inner: self.inner.clone(),
                caller: None,
            });
        }
        if caller == target {
            return Err(RuntimeError::CyclicRequest {
                caller: caller.clone(),
                target: target.clone(),
            });
        }
        let mut waits = self.inner.waits.lock().unwrap();
        let mut cursor = target.clone();
        while let Some(next) = waits.get(&cursor) {
            if next == caller {
                return Err(RuntimeError::CyclicRequest {
                    caller: caller.clone(),
                    target: target.clone(),
                });
            }
            cursor = next.clone();
        }
        waits.insert(caller.clone(), target.clone());
        Ok(WaitGuard {
            inner: self.inner.clone(),
            caller: Some(caller.clone()),
        })
    }

    /// Get the mailbox of a live instance, spawning its task on first use.
    fn ensure_instance(
        &self,
        registration: Arc<FunctionRegistration>,
        address: &Address,
    ) -> mpsc::Sender<Invocation> {
        let mut instances = self.inner.instances.lock().unwrap();
        if let Some(handle) = instances.get(address) {
            return handle.mailbox_tx.clone();
        }

        let capacity = registration
            .config
            .mailbox_capacity
            .unwrap_or(self.inner.config.mailbox_capacity);
        let (mailbox_tx, mailbox_rx) = mpsc::channel(capacity);
        let shutdown_rx = self.inner.shutdown.lock().unwrap().subscribe();

        debug!(instance = %address, "spawning instance task");
        let instance =
            InstanceRuntime::new(address.clone(), registration, mailbox_rx, self.clone());
        let join = tokio::spawn(instance.run(shutdown_rx));

        instances.insert(
            address.clone(),
            InstanceHandle {
                mailbox_tx: mailbox_tx.clone(),
                join,
            },
        );
        mailbox_tx
    }

    /// Stop accepting work, signal every instance task, and wait for them
    /// to drain and exit.
    pub(crate) async fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);

        let controller = {
            let mut guard = self.inner.shutdown.lock().unwrap();
            std::mem::take(&mut *guard)
        };
        controller.signal_shutdown(ShutdownType::Graceful).await;

        let handles: Vec<InstanceHandle> = {
            let mut instances = self.inner.instances.lock().unwrap();
            instances.drain().map(|(_, handle)| handle).collect()
        };
        let joins: Vec<_> = handles
            .into_iter()
            .map(|handle| {
                drop(handle.mailbox_tx);
                handle.join
            })
            .collect();
        for result in futures::future::join_all(joins).await {
            if let Err(e) = result {
                warn!("instance task ended abnormally during shutdown: {}", e);
            }
        }
        info!("dispatcher shut down");
    }
}

/// Removes the caller's wait-map entry when the request resolves, errors,
/// or times out.
struct WaitGuard {
    inner: Arc<DispatcherInner>,
    caller: Option<Address>,
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        if let Some(caller) = self.caller.take() {
            self.inner.waits.lock().unwrap().remove(&caller);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::egress::MemoryEgressRouter;
    use crate::store::MemoryContextStore;

    fn handle() -> DispatcherHandle {
        DispatcherHandle::new(
            RuntimeConfig::new(),
            Arc::new(MemoryContextStore::new()),
            Arc::new(MemoryEgressRouter::new()),
        )
    }

    #[test]
    fn test_self_request_is_refused() {
        let dispatcher = handle();
        let a = Address::new("t", "a");
        let result = dispatcher.begin_wait(&a, &a);
        assert!(matches!(result, Err(RuntimeError::CyclicRequest { .. })));
    }

    #[test]
    fn test_mutual_request_is_refused_while_first_wait_is_live() {
        let dispatcher = handle();
        let a = Address::new("t", "a");
        let b = Address::new("t", "b");

        let guard = dispatcher.begin_wait(&a, &b).expect("first wait is free");
        assert!(matches!(
            dispatcher.begin_wait(&b, &a),
            Err(RuntimeError::CyclicRequest { .. })
        ));

        // Once a's request resolves, b -> a is an ordinary edge again.
        drop(guard);
        assert!(dispatcher.begin_wait(&b, &a).is_ok());
    }

    #[test]
    fn test_transitive_cycle_is_refused() {
        let dispatcher = handle();
        let a = Address::new("t", "a");
        let b = Address::new("t", "b");
        let c = Address::new("t", "c");

        let _g1 = dispatcher.begin_wait(&a, &b).unwrap();
        let _g2 = dispatcher.begin_wait(&b, &c).unwrap();
        assert!(matches!(
            dispatcher.begin_wait(&c, &a),
            Err(RuntimeError::CyclicRequest { .. })
        ));
    }

    #[test]
    fn test_external_caller_never_cycles() {
        let dispatcher = handle();
        let t = Address::new("t", "i");
        let _g1 = dispatcher.begin_wait(&Address::none(), &t).unwrap();
        assert!(dispatcher.begin_wait(&Address::none(), &t).is_ok());
    }
}
