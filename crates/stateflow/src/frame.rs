//! # Invocation Frame
//!
//! One execution of a script against one function instance. The frame owns
//! the working copies of both context documents, the read-only payload and
//! options, the staged request-reply value, and an ordered audit log of the
//! outbound actions the script produced. Frames are ephemeral: built when an
//! invocation is picked off the mailbox, destroyed after commit.

use crate::address::Address;
use crate::script::{RequestProvider, SignalProvider};
use crate::store::ContextPair;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

/// Terminal status of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Still executing.
    Running,
    /// Script ran to completion and the commit (if any) succeeded.
    Ok,
    /// The script raised an uncaught fault; nothing was committed.
    ScriptError,
    /// The host side failed the invocation (context load/commit).
    HostError,
}

/// An outbound interaction produced by a frame, in program order.
///
/// Signals and egress publishes are dispatched at the moment the script
/// calls the primitive; requests are resolved before the primitive returns.
/// The log records what was already sent, so none of it is retracted when a
/// later fault aborts the frame.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundAction {
    Signal {
        provider: SignalProvider,
        target: Address,
        payload: Value,
        options: Value,
    },
    Request {
        provider: RequestProvider,
        target: Address,
        payload: Value,
        options: Value,
    },
    Egress {
        destination: String,
        payload: Value,
    },
}

/// Working state of one invocation.
pub struct InvocationFrame {
    invocation_id: Uuid,
    caller: Address,
    callee: Address,
    payload: Value,
    options: Value,
    function_context: Value,
    object_context: Value,
    contexts_dirty: bool,
    reply_data: Option<Value>,
    is_request: bool,
    actions: Vec<OutboundAction>,
    status: FrameStatus,
}

impl InvocationFrame {
    pub(crate) fn new(
        caller: Address,
        callee: Address,
        payload: Value,
        options: Value,
        contexts: ContextPair,
        is_request: bool,
    ) -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            caller,
            callee,
            payload,
            options,
            function_context: contexts.function,
            object_context: contexts.object,
            contexts_dirty: false,
            reply_data: None,
            is_request,
            actions: Vec::new(),
            status: FrameStatus::Running,
        }
    }

    pub fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }

    pub fn caller(&self) -> &Address {
        &self.caller
    }

    pub fn callee(&self) -> &Address {
        &self.callee
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn options(&self) -> &Value {
        &self.options
    }

    pub fn function_context(&self) -> &Value {
        &self.function_context
    }

    pub fn object_context(&self) -> &Value {
        &self.object_context
    }

    /// Replace the working copy of the function context. Visible to later
    /// calls in the same frame; durable only at commit.
    pub(crate) fn replace_function_context(&mut self, context: Value) {
        self.function_context = context;
        self.contexts_dirty = true;
    }

    pub(crate) fn replace_object_context(&mut self, context: Value) {
        self.object_context = context;
        self.contexts_dirty = true;
    }

    /// Stage the value returned to a requesting caller. Outside a request
    /// frame the value is validated upstream and discarded here.
    pub(crate) fn stage_reply_data(&mut self, reply: Value) {
        if self.is_request {
            self.reply_data = Some(reply);
        } else {
            debug!(
                callee = %self.callee,
                "reply data staged outside a request frame, discarding"
            );
        }
    }

    pub fn reply_data(&self) -> Option<&Value> {
        self.reply_data.as_ref()
    }

    pub(crate) fn take_reply_data(&mut self) -> Value {
        self.reply_data.take().unwrap_or_else(|| json!({}))
    }

    pub fn is_request(&self) -> bool {
        self.is_request
    }

    pub(crate) fn record_action(&mut self, action: OutboundAction) {
        self.actions.push(action);
    }

    /// The outbound actions produced so far, in program order.
    pub fn actions(&self) -> &[OutboundAction] {
        &self.actions
    }

    pub fn status(&self) -> FrameStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: FrameStatus) {
        self.status = status;
    }

    /// The contexts to commit, or `None` when nothing was mutated.
    pub(crate) fn commit_contexts(&self) -> Option<ContextPair> {
        if self.contexts_dirty {
            Some(ContextPair {
                function: self.function_context.clone(),
                object: self.object_context.clone(),
            })
        } else {
            None
        }
    }
}

/// Deep-merge `overlay` into `base`: objects merge recursively, everything
/// else is overwritten by the overlay side.
pub(crate) fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                deep_merge(base_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}
