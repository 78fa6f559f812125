//! # Stateflow
//!
//! Stateflow is a runtime for stateful function instances driven by
//! embedded scripts. Each instance is addressed by (typename, id), owns
//! persistent JSON context, and executes invocations strictly one at a
//! time; a script interacts with the rest of the system only through a
//! narrow host-function bridge.
//!
//! ## Core Features
//!
//! * **Function Instances**: lazily created actors with per-instance
//!   function and object context documents
//! * **Host Bridge**: the script-visible primitive surface — context
//!   get/set, signal, request, egress, print
//! * **Signals and Requests**: fire-and-forget delivery and synchronous
//!   request/reply with bounded timeouts and cycle refusal
//! * **Pluggable Collaborators**: context store, egress router, and script
//!   engine are all traits at the seams
//!
//! ## Architecture
//!
//! * `Runtime`: registers typenames and ingresses external work
//! * `DispatcherHandle`: routes signals/requests between instances
//! * `InstanceRuntime` (internal): one task per live instance, serializing
//!   its frames
//! * `HostBridge`: translates each primitive call into an effect on the
//!   current `InvocationFrame` or a dispatcher call

pub mod address;
pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod egress;
pub mod errors;
pub mod frame;
mod instance;
pub mod logging;
pub mod runtime;
pub mod script;
pub mod shutdown;
pub mod store;

pub use address::Address;
pub use bridge::HostBridge;
pub use config::{FunctionConfig, RuntimeConfig};
pub use dispatcher::DispatcherHandle;
pub use egress::{EgressError, EgressRouter, MemoryEgressRouter};
pub use errors::{status, RuntimeError};
pub use frame::{FrameStatus, InvocationFrame, OutboundAction};
pub use runtime::Runtime;
pub use script::{RequestProvider, ScriptExecutor, ScriptFault, SignalProvider};
pub use shutdown::{ShutdownController, ShutdownReceiver, ShutdownSignal, ShutdownType};
pub use store::{ContextKind, ContextPair, ContextStore, MemoryContextStore, StoreError};
