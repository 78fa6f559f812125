//! # Runtime and Function Configuration
//!
//! Builder-style configuration for the runtime as a whole and for each
//! registered function typename. Defaults are exposed as consts so embedders
//! can reference them.

use serde_json::{json, Value};
use std::time::Duration;

/// Default bounded wait for a synchronous request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default capacity of a function instance mailbox.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// Default runtime name, used as the logging scope.
pub const DEFAULT_RUNTIME_NAME: &str = "runtime";

/// Configuration of the runtime itself.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub(crate) name: String,
    pub(crate) request_timeout: Duration,
    pub(crate) mailbox_capacity: usize,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self {
            name: DEFAULT_RUNTIME_NAME.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-typename configuration supplied at registration time.
///
/// `options` are the typename's default options; at invocation time they are
/// deep-merged under the options carried by the incoming message, with the
/// message side winning on conflicts.
#[derive(Debug, Clone)]
pub struct FunctionConfig {
    pub(crate) options: Value,
    pub(crate) mailbox_capacity: Option<usize>,
}

impl FunctionConfig {
    pub fn new() -> Self {
        Self {
            options: json!({}),
            mailbox_capacity: None,
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = Some(capacity);
        self
    }
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self::new()
    }
}
