//! # Runtime
//!
//! The public composition root: owns the dispatcher, registers function
//! typenames, and is the ingress for externally triggered signals and
//! requests (which carry the empty caller address).

use crate::address::Address;
use crate::config::{FunctionConfig, RuntimeConfig};
use crate::dispatcher::{DispatcherHandle, FunctionRegistration};
use crate::egress::EgressRouter;
use crate::errors::RuntimeError;
use crate::script::{RequestProvider, ScriptExecutor, SignalProvider};
use crate::store::ContextStore;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct Runtime {
    dispatcher: DispatcherHandle,
}

impl Runtime {
    /// Build a runtime over the given store and egress collaborators.
    pub fn new(
        config: RuntimeConfig,
        store: Arc<dyn ContextStore>,
        egress: Arc<dyn EgressRouter>,
    ) -> Self {
        info!(name = %config.name, "runtime initializing");
        Self {
            dispatcher: DispatcherHandle::new(config, store, egress),
        }
    }

    /// Register a function behavior under a typename. Instances of the
    /// typename are created lazily on first delivery.
    pub fn register(
        &self,
        typename: impl Into<String>,
        config: FunctionConfig,
        executor: Arc<dyn ScriptExecutor>,
    ) -> Result<(), RuntimeError> {
        self.dispatcher.register(FunctionRegistration {
            typename: typename.into(),
            config,
            executor,
        })
    }

    /// Externally triggered fire-and-forget signal (no caller identity).
    pub async fn signal(
        &self,
        provider: SignalProvider,
        typename: &str,
        id: &str,
        payload: Value,
        options: Option<Value>,
    ) -> Result<(), RuntimeError> {
        self.dispatcher
            .signal(
                Address::none(),
                provider,
                Address::new(typename, id),
                payload,
                options.unwrap_or_else(|| json!({})),
            )
            .await
            .map(|_| ())
    }

    /// Externally triggered synchronous request (no caller identity).
    /// Resolves with the target's staged reply, `{}` when it never staged
    /// one.
    pub async fn request(
        &self,
        provider: RequestProvider,
        typename: &str,
        id: &str,
        payload: Value,
        options: Option<Value>,
    ) -> Result<Value, RuntimeError> {
        self.dispatch_request(provider, typename, id, payload, options, None)
            .await
    }

    /// As [`request`](Self::request), with a per-call timeout instead of
    /// the configured default.
    pub async fn request_with_timeout(
        &self,
        provider: RequestProvider,
        typename: &str,
        id: &str,
        payload: Value,
        options: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, RuntimeError> {
        self.dispatch_request(provider, typename, id, payload, options, Some(timeout))
            .await
    }

    async fn dispatch_request(
        &self,
        provider: RequestProvider,
        typename: &str,
        id: &str,
        payload: Value,
        options: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, RuntimeError> {
        self.dispatcher
            .request(
                Address::none(),
                provider,
                Address::new(typename, id),
                payload,
                options.unwrap_or_else(|| json!({})),
                timeout,
            )
            .await
    }

    /// Graceful shutdown: refuse new work, let in-flight frames finish,
    /// drain mailboxes, stop instance tasks.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }
}
