//! # Egress Router
//!
//! One-way output from function instances to named external channels. The
//! runtime publishes through the [`EgressRouter`] trait; the in-memory
//! router delivers to in-process subscribers and is what the tests observe.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Error, Debug)]
pub enum EgressError {
    #[error("egress delivery failed for destination '{0}': {1}")]
    Delivery(String, String),
}

/// Maps a logical destination name to a delivery channel and publishes a
/// JSON payload to it.
#[async_trait]
pub trait EgressRouter: Send + Sync {
    async fn publish(&self, destination: &str, payload: &Value) -> Result<(), EgressError>;
}

/// In-process egress router fanning out to per-destination subscribers.
///
/// Payloads published to a destination nobody subscribed to are dropped,
/// matching topic-publish semantics.
#[derive(Default)]
pub struct MemoryEgressRouter {
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Value>>>>,
}

impl MemoryEgressRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to everything published at `destination`.
    pub fn subscribe(&self, destination: impl Into<String>) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.entry(destination.into()).or_default().push(tx);
        rx
    }
}

#[async_trait]
impl EgressRouter for MemoryEgressRouter {
    async fn publish(&self, destination: &str, payload: &Value) -> Result<(), EgressError> {
        let mut subscribers = self.subscribers.lock().unwrap();
        match subscribers.get_mut(destination) {
            Some(channels) => {
                // Dropped receivers are pruned as they are discovered.
                channels.retain(|tx| tx.send(payload.clone()).is_ok());
            }
            None => {
                debug!(destination, "egress payload published with no subscribers");
            }
        }
        Ok(())
    }
}
