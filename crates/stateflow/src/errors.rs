//! # Error Types
//!
//! The runtime error taxonomy and its mapping onto the integer status codes
//! the script surface reports. Primitive-level failures are local: they are
//! returned to the script as status codes so it can branch on them, and only
//! an uncaught script fault aborts a whole invocation.

use crate::address::Address;
use thiserror::Error;

/// Status codes returned to scripts by the bridge primitives.
///
/// `0` is success. Positive codes are local validation failures of the call
/// itself; negative codes are request-dispatch failures surfaced by
/// `statefun_request`.
pub mod status {
    /// Call succeeded.
    pub const OK: i32 = 0;
    /// Input string was not valid JSON.
    pub const MALFORMED_JSON: i32 = 1;
    /// Target typename or id was empty.
    pub const EMPTY_TARGET: i32 = 2;
    /// Payload string was not valid JSON.
    pub const MALFORMED_PAYLOAD: i32 = 3;
    /// Options string was non-empty and not valid JSON.
    pub const MALFORMED_OPTIONS: i32 = 4;
    /// Provider code is not a known signal/request provider.
    pub const UNKNOWN_PROVIDER: i32 = 5;

    /// No function is registered for the target typename.
    pub const TARGET_NOT_FOUND: i32 = -1;
    /// The target invocation failed or its reply channel dropped.
    pub const TARGET_ERROR: i32 = -2;
    /// The request did not resolve within the configured timeout.
    pub const TIMEOUT: i32 = -3;
    /// The request would deadlock on a frame already waiting on the caller.
    pub const CYCLIC_REQUEST: i32 = -4;
}

/// Errors surfaced by the dispatcher and instance machinery.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// No function registered under the requested typename.
    #[error("no function registered for typename '{0}'")]
    TargetNotFound(String),

    /// The target frame is (transitively) suspended waiting on the caller,
    /// so the request can never resolve.
    #[error("request from {caller} to {target} forms a cycle")]
    CyclicRequest { caller: Address, target: Address },

    /// The request was not answered within the bounded wait.
    #[error("request to {0} timed out")]
    Timeout(Address),

    /// The target invocation completed with a failure status.
    #[error("target {target} failed: {reason}")]
    TargetError { target: Address, reason: String },

    /// The context store refused or failed the commit; the stored contexts
    /// are unchanged from before the invocation.
    #[error("context persist failed for {0}: {1}")]
    ContextPersistFailed(Address, String),

    /// The embedded script raised an uncaught error.
    #[error("script fault in {0}: {1}")]
    ScriptFault(Address, String),

    /// A mailbox or reply channel closed underneath an operation.
    #[error("channel closed while dispatching to {0}")]
    ChannelClosed(Address),

    /// A typename was registered twice.
    #[error("typename '{0}' is already registered")]
    AlreadyRegistered(String),

    /// The runtime is shutting down and refuses new work.
    #[error("runtime is shutting down")]
    ShuttingDown,
}

impl RuntimeError {
    /// The status code a script observes for this error when it surfaces
    /// through `statefun_request`.
    pub fn status_code(&self) -> i32 {
        match self {
            RuntimeError::TargetNotFound(_) => status::TARGET_NOT_FOUND,
            RuntimeError::CyclicRequest { .. } => status::CYCLIC_REQUEST,
            RuntimeError::Timeout(_) => status::TIMEOUT,
            RuntimeError::TargetError { .. }
            | RuntimeError::ContextPersistFailed(_, _)
            | RuntimeError::ScriptFault(_, _)
            | RuntimeError::ChannelClosed(_)
            | RuntimeError::AlreadyRegistered(_)
            | RuntimeError::ShuttingDown => status::TARGET_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_failures_map_to_negative_codes() {
        let target = Address::new("t", "i");
        assert_eq!(
            RuntimeError::TargetNotFound("t".into()).status_code(),
            status::TARGET_NOT_FOUND
        );
        assert_eq!(
            RuntimeError::Timeout(target.clone()).status_code(),
            status::TIMEOUT
        );
        assert_eq!(
            RuntimeError::CyclicRequest {
                caller: target.clone(),
                target: target.clone(),
            }
            .status_code(),
            status::CYCLIC_REQUEST
        );
        assert!(RuntimeError::ChannelClosed(target).status_code() < 0);
    }
}
