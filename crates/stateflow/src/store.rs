//! # Context Store Adapter
//!
//! Durable storage for per-instance context documents. The runtime consumes
//! the [`ContextStore`] trait only; the in-memory adapter here is the
//! default for in-process use and tests, and a database-backed adapter can
//! be dropped in without touching the runtime.
//!
//! Layout contract: one JSON document per (typename, id, kind). A commit
//! covers both documents of an instance and is all-or-nothing.

use crate::address::Address;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// Which of an instance's two context documents a key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    /// State owned by the function instance itself.
    Function,
    /// State of the object the instance represents.
    Object,
}

/// The pair of context documents loaded for, and committed by, one
/// invocation. Documents default to `{}`, never null.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextPair {
    pub function: Value,
    pub object: Value,
}

impl Default for ContextPair {
    fn default() -> Self {
        Self {
            function: json!({}),
            object: json!({}),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Storage interface the runtime commits contexts through.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Load both context documents for an instance. Missing documents load
    /// as `{}`.
    async fn load(&self, address: &Address) -> Result<ContextPair, StoreError>;

    /// Persist both context documents for an instance. Either both
    /// documents are applied or neither is.
    async fn commit(&self, address: &Address, contexts: ContextPair) -> Result<(), StoreError>;
}

/// In-memory context store keyed by (typename, id, kind).
#[derive(Default)]
pub struct MemoryContextStore {
    documents: RwLock<HashMap<(Address, ContextKind), Value>>,
}

impl MemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read one stored document directly, for inspection and tests.
    pub fn document(&self, address: &Address, kind: ContextKind) -> Option<Value> {
        let documents = self.documents.read().unwrap();
        documents.get(&(address.clone(), kind)).cloned()
    }
}

#[async_trait]
impl ContextStore for MemoryContextStore {
    async fn load(&self, address: &Address) -> Result<ContextPair, StoreError> {
        let documents = self.documents.read().unwrap();
        Ok(ContextPair {
            function: documents
                .get(&(address.clone(), ContextKind::Function))
                .cloned()
                .unwrap_or_else(|| json!({})),
            object: documents
                .get(&(address.clone(), ContextKind::Object))
                .cloned()
                .unwrap_or_else(|| json!({})),
        })
    }

    async fn commit(&self, address: &Address, contexts: ContextPair) -> Result<(), StoreError> {
        // Both documents go in under one write lock so a reader never sees
        // half a commit.
        let mut documents = self.documents.write().unwrap();
        documents.insert((address.clone(), ContextKind::Function), contexts.function);
        documents.insert((address.clone(), ContextKind::Object), contexts.object);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_missing_yields_empty_documents() {
        let store = MemoryContextStore::new();
        let pair = store.load(&Address::new("t", "i")).await.unwrap();
        assert_eq!(pair.function, json!({}));
        assert_eq!(pair.object, json!({}));
    }

    #[tokio::test]
    async fn test_commit_then_load_round_trips() {
        let store = MemoryContextStore::new();
        let address = Address::new("t", "i");
        let pair = ContextPair {
            function: json!({"counter": 5}),
            object: json!({"name": "lead"}),
        };
        store.commit(&address, pair.clone()).await.unwrap();
        assert_eq!(store.load(&address).await.unwrap(), pair);
        assert_eq!(
            store.document(&address, ContextKind::Function),
            Some(json!({"counter": 5}))
        );
    }

    #[tokio::test]
    async fn test_instances_are_isolated() {
        let store = MemoryContextStore::new();
        let a = Address::new("t", "a");
        let b = Address::new("t", "b");
        store
            .commit(
                &a,
                ContextPair {
                    function: json!({"x": 1}),
                    object: json!({}),
                },
            )
            .await
            .unwrap();
        assert_eq!(store.load(&b).await.unwrap().function, json!({}));
    }
}
