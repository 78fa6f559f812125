//! # Script Executor Interface
//!
//! The narrow capability boundary between the runtime and whatever engine
//! executes the embedded scripts. An engine implements [`ScriptExecutor`]
//! and drives the [`HostBridge`](crate::bridge::HostBridge) it is handed;
//! the runtime neither knows nor cares what language runs inside. The
//! [`symbols`] table lists the global names an engine is expected to bind
//! to the bridge primitives.

use crate::bridge::HostBridge;
use async_trait::async_trait;
use thiserror::Error;

/// An uncaught error raised by the embedded script.
///
/// A fault aborts the whole invocation: no context commit, no reply data.
/// Signals already dispatched before the fault are not recalled.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ScriptFault {
    pub message: String,
}

impl ScriptFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One execution of a script against one invocation frame.
///
/// The executor is shared across all instances of a typename and must not
/// hold per-invocation state; everything an execution needs is reachable
/// through the bridge.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    async fn run(&self, bridge: &mut HostBridge<'_>) -> Result<(), ScriptFault>;
}

/// Transport selection for a signal dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalProvider {
    /// Local delivery when the typename is registered, topic publish
    /// through the egress router otherwise.
    Auto,
    /// Always publish through the egress router at `"{typename}.{id}"`.
    Topic,
    /// Always deliver to a registered local instance.
    Local,
}

impl SignalProvider {
    /// Decode the integer a script passes as the provider argument.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(SignalProvider::Auto),
            1 => Some(SignalProvider::Topic),
            2 => Some(SignalProvider::Local),
            _ => None,
        }
    }
}

/// Transport selection for a request dispatch.
///
/// Requests need a live responder, so every provider resolves to local
/// delivery; the distinction is kept for surface compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestProvider {
    Auto,
    Local,
}

impl RequestProvider {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 | 1 => Some(RequestProvider::Auto),
            2 => Some(RequestProvider::Local),
            _ => None,
        }
    }
}

/// Global names a script engine binds to the bridge primitives.
///
/// The names are a stable contract with scripts; an engine maps each symbol
/// to the like-named method on [`HostBridge`](crate::bridge::HostBridge).
pub mod symbols {
    pub const GET_SELF_TYPENAME: &str = "statefun_getSelfTypename";
    pub const GET_SELF_ID: &str = "statefun_getSelfId";
    pub const GET_CALLER_TYPENAME: &str = "statefun_getCallerTypename";
    pub const GET_CALLER_ID: &str = "statefun_getCallerId";
    pub const GET_FUNCTION_CONTEXT: &str = "statefun_getFunctionContext";
    pub const SET_FUNCTION_CONTEXT: &str = "statefun_setFunctionContext";
    pub const GET_OBJECT_CONTEXT: &str = "statefun_getObjectContext";
    pub const SET_OBJECT_CONTEXT: &str = "statefun_setObjectContext";
    pub const GET_PAYLOAD: &str = "statefun_getPayload";
    pub const GET_OPTIONS: &str = "statefun_getOptions";
    pub const GET_REQUEST_REPLY_DATA: &str = "statefun_getRequestReplyData";
    pub const SET_REQUEST_REPLY_DATA: &str = "statefun_setRequestReplyData";
    pub const SIGNAL: &str = "statefun_signal";
    pub const REQUEST: &str = "statefun_request";
    pub const PRINT: &str = "print";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_codes() {
        assert_eq!(SignalProvider::from_code(0), Some(SignalProvider::Auto));
        assert_eq!(SignalProvider::from_code(1), Some(SignalProvider::Topic));
        assert_eq!(SignalProvider::from_code(2), Some(SignalProvider::Local));
        assert_eq!(SignalProvider::from_code(7), None);

        assert_eq!(RequestProvider::from_code(0), Some(RequestProvider::Auto));
        assert_eq!(RequestProvider::from_code(2), Some(RequestProvider::Local));
        assert_eq!(RequestProvider::from_code(-1), None);
    }
}
