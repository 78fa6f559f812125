//! # Instance Address
//!
//! Identity of a function instance: a (typename, id) pair. The typename
//! selects the registered function behavior, the id selects one persistent
//! instance of it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a function instance in the runtime.
///
/// Instances are created lazily on first delivery to an address; the
/// address itself carries no liveness information.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub typename: String,
    pub id: String,
}

impl Address {
    pub fn new(typename: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            typename: typename.into(),
            id: id.into(),
        }
    }

    /// The empty address, used as the caller of externally triggered
    /// invocations (ingress, timers). Both components are `""`.
    pub fn none() -> Self {
        Self {
            typename: String::new(),
            id: String::new(),
        }
    }

    /// True when this is the empty "no caller" address.
    pub fn is_none(&self) -> bool {
        self.typename.is_empty() && self.id.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.typename, self.id)
    }
}
