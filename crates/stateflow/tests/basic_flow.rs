//! End-to-end flows through the public runtime surface: the counter
//! increment scenario, context round-trips inside a frame, caller
//! identity, and graceful shutdown draining.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use stateflow::{
    Address, ContextKind, ContextPair, ContextStore, FunctionConfig, HostBridge,
    MemoryContextStore, MemoryEgressRouter, RequestProvider, Runtime, RuntimeConfig, RuntimeError,
    ScriptExecutor, ScriptFault, SignalProvider, StoreError,
};

fn parse(s: &str) -> Value {
    serde_json::from_str(s).expect("bridge returned invalid JSON")
}

struct TestEnv {
    runtime: Runtime,
    store: Arc<MemoryContextStore>,
    egress: Arc<MemoryEgressRouter>,
}

fn test_env(config: RuntimeConfig) -> TestEnv {
    let store = Arc::new(MemoryContextStore::new());
    let egress = Arc::new(MemoryEgressRouter::new());
    let runtime = Runtime::new(config, store.clone(), egress.clone());
    TestEnv {
        runtime,
        store,
        egress,
    }
}

/// The master fixture: read context and options, bump the counter by the
/// increment, store the context back, and send it to an egress topic.
struct MasterScript;

#[async_trait]
impl ScriptExecutor for MasterScript {
    async fn run(&self, bridge: &mut HostBridge<'_>) -> Result<(), ScriptFault> {
        let mut context = parse(&bridge.function_context());
        let options = parse(&bridge.options());

        let counter = context["counter"].as_i64().unwrap_or(0);
        let increment = options["increment"].as_i64().unwrap_or(0);
        context["counter"] = json!(counter + increment);

        let context_str = context.to_string();
        bridge.print(&["counter incremented by", &increment.to_string()]);
        bridge.set_function_context(&context_str);
        bridge
            .signal(0, "test.basic", "egress", &context_str, "")
            .await;
        Ok(())
    }
}

#[tokio::test]
async fn test_counter_increment_commits_and_reaches_egress() {
    let env = test_env(RuntimeConfig::new());
    let address = Address::new("functions.tests.basic.master", "lead");
    let mut egress_rx = env.egress.subscribe("test.basic.egress");

    env.store
        .commit(
            &address,
            ContextPair {
                function: json!({"counter": 5}),
                object: json!({}),
            },
        )
        .await
        .unwrap();

    env.runtime
        .register(
            "functions.tests.basic.master",
            FunctionConfig::new(),
            Arc::new(MasterScript),
        )
        .unwrap();

    // The reply resolves after commit, so the stored context is settled.
    let reply = env
        .runtime
        .request(
            RequestProvider::Auto,
            "functions.tests.basic.master",
            "lead",
            json!({}),
            Some(json!({"increment": 3})),
        )
        .await
        .unwrap();
    assert_eq!(reply, json!({}));

    assert_eq!(
        env.store.document(&address, ContextKind::Function),
        Some(json!({"counter": 8}))
    );

    // Exactly one egress payload with the updated context.
    assert_eq!(egress_rx.recv().await, Some(json!({"counter": 8})));
    assert!(egress_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_typename_default_options_apply_when_message_has_none() {
    let env = test_env(RuntimeConfig::new());
    let address = Address::new("functions.tests.basic.master", "lead");

    env.runtime
        .register(
            "functions.tests.basic.master",
            FunctionConfig::new().with_options(json!({"increment": 1})),
            Arc::new(MasterScript),
        )
        .unwrap();

    env.runtime
        .request(
            RequestProvider::Auto,
            "functions.tests.basic.master",
            "lead",
            json!({}),
            None,
        )
        .await
        .unwrap();
    assert_eq!(
        env.store.document(&address, ContextKind::Function),
        Some(json!({"counter": 1}))
    );

    // Message options override the registered default.
    env.runtime
        .request(
            RequestProvider::Auto,
            "functions.tests.basic.master",
            "lead",
            json!({}),
            Some(json!({"increment": 10})),
        )
        .await
        .unwrap();
    assert_eq!(
        env.store.document(&address, ContextKind::Function),
        Some(json!({"counter": 11}))
    );
}

/// Exercises the context setters inside a single frame and reports what it
/// observed through its reply.
struct ContextProbeScript;

#[async_trait]
impl ScriptExecutor for ContextProbeScript {
    async fn run(&self, bridge: &mut HostBridge<'_>) -> Result<(), ScriptFault> {
        let document = r#"{"a": {"b": [1, 2, 3]}, "s": "x"}"#;
        let set_ok = bridge.set_function_context(document);
        let echoed = parse(&bridge.function_context());
        let set_bad = bridge.set_function_context("not json");
        let kept = parse(&bridge.function_context());

        let object_bad = bridge.set_object_context("{broken");
        let object_kept = parse(&bridge.object_context());

        bridge.set_request_reply_data(
            &json!({
                "set_ok": set_ok,
                "set_bad": set_bad,
                "echoed": echoed,
                "kept": kept,
                "object_bad": object_bad,
                "object_kept": object_kept,
            })
            .to_string(),
        );
        Ok(())
    }
}

#[tokio::test]
async fn test_context_round_trip_and_malformed_set_within_frame() {
    let env = test_env(RuntimeConfig::new());
    env.runtime
        .register("probe", FunctionConfig::new(), Arc::new(ContextProbeScript))
        .unwrap();

    let reply = env
        .runtime
        .request(RequestProvider::Auto, "probe", "p1", json!({}), None)
        .await
        .unwrap();

    let expected = json!({"a": {"b": [1, 2, 3]}, "s": "x"});
    assert_eq!(reply["set_ok"], json!(0));
    assert_ne!(reply["set_bad"], json!(0));
    assert_eq!(reply["echoed"], expected);
    // The malformed set left the working copy untouched.
    assert_eq!(reply["kept"], expected);
    assert_ne!(reply["object_bad"], json!(0));
    assert_eq!(reply["object_kept"], json!({}));

    // The successful mutation became durable.
    assert_eq!(
        env.store
            .document(&Address::new("probe", "p1"), ContextKind::Function),
        Some(expected)
    );
}

/// Reports the frame's identity fields through its reply.
struct IdentityScript;

#[async_trait]
impl ScriptExecutor for IdentityScript {
    async fn run(&self, bridge: &mut HostBridge<'_>) -> Result<(), ScriptFault> {
        bridge.set_request_reply_data(
            &json!({
                "self_typename": bridge.self_typename(),
                "self_id": bridge.self_id(),
                "caller_typename": bridge.caller_typename(),
                "caller_id": bridge.caller_id(),
                "payload": parse(&bridge.payload()),
            })
            .to_string(),
        );
        Ok(())
    }
}

#[tokio::test]
async fn test_external_invocation_has_empty_caller() {
    let env = test_env(RuntimeConfig::new());
    env.runtime
        .register("identity", FunctionConfig::new(), Arc::new(IdentityScript))
        .unwrap();

    let reply = env
        .runtime
        .request(
            RequestProvider::Auto,
            "identity",
            "i1",
            json!({"hello": true}),
            None,
        )
        .await
        .unwrap();

    assert_eq!(reply["self_typename"], "identity");
    assert_eq!(reply["self_id"], "i1");
    assert_eq!(reply["caller_typename"], "");
    assert_eq!(reply["caller_id"], "");
    assert_eq!(reply["payload"], json!({"hello": true}));
}

/// Store wrapper that refuses commits, for exercising the persist-failure
/// path.
struct ReadOnlyStore {
    inner: MemoryContextStore,
}

#[async_trait]
impl ContextStore for ReadOnlyStore {
    async fn load(&self, address: &Address) -> Result<ContextPair, StoreError> {
        self.inner.load(address).await
    }

    async fn commit(&self, _address: &Address, _contexts: ContextPair) -> Result<(), StoreError> {
        Err(StoreError::Backend("store is read-only".into()))
    }
}

#[tokio::test]
async fn test_commit_failure_surfaces_as_persist_error() {
    let store = Arc::new(ReadOnlyStore {
        inner: MemoryContextStore::new(),
    });
    let egress = Arc::new(MemoryEgressRouter::new());
    let runtime = Runtime::new(RuntimeConfig::new(), store, egress);

    runtime
        .register(
            "functions.tests.basic.master",
            FunctionConfig::new().with_options(json!({"increment": 1})),
            Arc::new(MasterScript),
        )
        .unwrap();

    let result = runtime
        .request(
            RequestProvider::Auto,
            "functions.tests.basic.master",
            "lead",
            json!({}),
            None,
        )
        .await;
    assert!(matches!(
        result,
        Err(RuntimeError::ContextPersistFailed(_, _))
    ));
}

#[tokio::test]
async fn test_graceful_shutdown_drains_queued_signals() {
    let env = test_env(RuntimeConfig::new());
    let address = Address::new("functions.tests.basic.master", "lead");
    env.runtime
        .register(
            "functions.tests.basic.master",
            FunctionConfig::new().with_options(json!({"increment": 1})),
            Arc::new(MasterScript),
        )
        .unwrap();

    for _ in 0..4 {
        env.runtime
            .signal(
                SignalProvider::Auto,
                "functions.tests.basic.master",
                "lead",
                json!({}),
                None,
            )
            .await
            .unwrap();
    }

    env.runtime.shutdown().await;

    assert_eq!(
        env.store.document(&address, ContextKind::Function),
        Some(json!({"counter": 4}))
    );
}
