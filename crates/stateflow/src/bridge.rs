//! # Host Function Bridge
//!
//! The only surface a running script touches. Every primitive operates on
//! the current invocation frame, passed in explicitly — there is no hidden
//! "current frame" global, and per-instance serialization guarantees no
//! concurrent access to it.
//!
//! Primitive failures are local: validation problems come back as status
//! codes (see [`crate::errors::status`]) so a script can branch on them,
//! and a failed request resumes the frame with a negative status rather
//! than aborting it.

use crate::address::Address;
use crate::dispatcher::{DispatcherHandle, SignalRoute};
use crate::errors::status;
use crate::frame::{InvocationFrame, OutboundAction};
use crate::script::{RequestProvider, SignalProvider};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// The primitive surface handed to a script executor for one frame.
pub struct HostBridge<'a> {
    frame: &'a mut InvocationFrame,
    dispatcher: DispatcherHandle,
}

impl<'a> HostBridge<'a> {
    pub(crate) fn new(frame: &'a mut InvocationFrame, dispatcher: DispatcherHandle) -> Self {
        Self { frame, dispatcher }
    }

    /// Typename of the function instance this frame executes against.
    pub fn self_typename(&self) -> String {
        self.frame.callee().typename.clone()
    }

    /// Id of the function instance this frame executes against.
    pub fn self_id(&self) -> String {
        self.frame.callee().id.clone()
    }

    /// Typename of the calling instance, `""` when externally triggered.
    pub fn caller_typename(&self) -> String {
        self.frame.caller().typename.clone()
    }

    /// Id of the calling instance, `""` when externally triggered.
    pub fn caller_id(&self) -> String {
        self.frame.caller().id.clone()
    }

    /// The working copy of the function context as a JSON string. `"{}"`
    /// when the context was never set.
    pub fn function_context(&self) -> String {
        self.frame.function_context().to_string()
    }

    /// Replace the working copy of the function context. The change is
    /// visible to subsequent calls in this frame and becomes durable at
    /// commit; malformed input leaves the prior copy untouched.
    pub fn set_function_context(&mut self, context: &str) -> i32 {
        match serde_json::from_str::<Value>(context) {
            Ok(value) => {
                self.frame.replace_function_context(value);
                status::OK
            }
            Err(e) => {
                warn!(instance = %self.frame.callee(), "set_function_context: not a JSON: {}", e);
                status::MALFORMED_JSON
            }
        }
    }

    /// The working copy of the object context as a JSON string.
    pub fn object_context(&self) -> String {
        self.frame.object_context().to_string()
    }

    pub fn set_object_context(&mut self, context: &str) -> i32 {
        match serde_json::from_str::<Value>(context) {
            Ok(value) => {
                self.frame.replace_object_context(value);
                status::OK
            }
            Err(e) => {
                warn!(instance = %self.frame.callee(), "set_object_context: not a JSON: {}", e);
                status::MALFORMED_JSON
            }
        }
    }

    /// The inbound payload as a JSON string, immutable for the frame.
    pub fn payload(&self) -> String {
        self.frame.payload().to_string()
    }

    /// The inbound options as a JSON string, immutable for the frame.
    pub fn options(&self) -> String {
        self.frame.options().to_string()
    }

    /// The reply value staged so far, `""` when unset.
    pub fn request_reply_data(&self) -> String {
        self.frame
            .reply_data()
            .map(|value| value.to_string())
            .unwrap_or_default()
    }

    /// Stage the value returned to a requesting caller. Validates even when
    /// this frame is not a request target, in which case the value is
    /// discarded.
    pub fn set_request_reply_data(&mut self, reply: &str) -> i32 {
        match serde_json::from_str::<Value>(reply) {
            Ok(value) => {
                self.frame.stage_reply_data(value);
                status::OK
            }
            Err(e) => {
                warn!(instance = %self.frame.callee(), "set_request_reply_data: not a JSON: {}", e);
                status::MALFORMED_JSON
            }
        }
    }

    /// Fire-and-forget signal to another instance, or to an egress topic
    /// when the provider routes there. Returns immediately; delivery order
    /// is the caller's dispatch order per target.
    pub async fn signal(
        &mut self,
        provider: i32,
        typename: &str,
        id: &str,
        payload: &str,
        options: &str,
    ) -> i32 {
        let Some(provider) = SignalProvider::from_code(provider) else {
            return status::UNKNOWN_PROVIDER;
        };
        let (target, payload, options) = match validate_target(typename, id, payload, options) {
            Ok(parts) => parts,
            Err(code) => return code,
        };

        match self
            .dispatcher
            .signal(
                self.frame.callee().clone(),
                provider,
                target.clone(),
                payload.clone(),
                options.clone(),
            )
            .await
        {
            Ok(SignalRoute::Local) => {
                self.frame.record_action(OutboundAction::Signal {
                    provider,
                    target,
                    payload,
                    options,
                });
                status::OK
            }
            Ok(SignalRoute::Egress { destination }) => {
                self.frame.record_action(OutboundAction::Egress {
                    destination,
                    payload,
                });
                status::OK
            }
            Err(e) => {
                warn!(instance = %self.frame.callee(), %target, "signal failed: {}", e);
                e.status_code()
            }
        }
    }

    /// Synchronous request to another instance. Suspends this frame until
    /// the target's reply, an error, or the bounded timeout; the frame then
    /// continues with either the reply JSON or a negative status.
    pub async fn request(
        &mut self,
        provider: i32,
        typename: &str,
        id: &str,
        payload: &str,
        options: &str,
    ) -> Result<String, i32> {
        let Some(provider) = RequestProvider::from_code(provider) else {
            return Err(status::UNKNOWN_PROVIDER);
        };
        let (target, payload, options) = match validate_target(typename, id, payload, options) {
            Ok(parts) => parts,
            Err(code) => return Err(code),
        };

        self.frame.record_action(OutboundAction::Request {
            provider,
            target: target.clone(),
            payload: payload.clone(),
            options: options.clone(),
        });

        match self
            .dispatcher
            .request(
                self.frame.callee().clone(),
                provider,
                target.clone(),
                payload,
                options,
                None,
            )
            .await
        {
            Ok(reply) => Ok(reply.to_string()),
            Err(e) => {
                debug!(instance = %self.frame.callee(), %target, "request failed: {}", e);
                Err(e.status_code())
            }
        }
    }

    /// Emit to the diagnostic sink. Pure side effect, never fails the
    /// invocation.
    pub fn print(&self, parts: &[&str]) {
        info!(target: "stateflow::script", "{}: {}", self.frame.callee(), parts.join(" "));
    }
}

/// Shared validation for signal/request targets: non-empty address,
/// well-formed payload, options defaulting to `{}` on the empty string.
fn validate_target(
    typename: &str,
    id: &str,
    payload: &str,
    options: &str,
) -> Result<(Address, Value, Value), i32> {
    if typename.is_empty() || id.is_empty() {
        return Err(status::EMPTY_TARGET);
    }
    let payload: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(_) => return Err(status::MALFORMED_PAYLOAD),
    };
    let options: Value = if options.is_empty() {
        json!({})
    } else {
        match serde_json::from_str(options) {
            Ok(value) => value,
            Err(_) => return Err(status::MALFORMED_OPTIONS),
        }
    };
    Ok((Address::new(typename, id), payload, options))
}
