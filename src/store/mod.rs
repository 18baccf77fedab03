//! Namespaced key/value persistence.
//!
//! Components that keep small pieces of durable state (the dedup set in
//! particular) receive a [`KvStore`] at construction instead of reaching for a
//! global. Values are JSON documents.

mod memory;
mod sqlite;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryKvStore;
pub use sqlite::SqliteKvStore;

/// Errors raised by key/value backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing database rejected the operation.
    #[error("store database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be encoded or decoded.
    #[error("store value for {namespace}/{key} is not valid JSON: {source}")]
    Serialization {
        /// Namespace of the entry.
        namespace: String,
        /// Key of the entry.
        key: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// The backend cannot serve requests right now.
    #[error("store unavailable: {reason}")]
    Unavailable {
        /// Human-readable reason.
        reason: String,
    },
}

impl StoreError {
    /// Creates a serialization error with entry context.
    pub fn serialization(namespace: &str, key: &str, source: serde_json::Error) -> Self {
        Self::Serialization {
            namespace: namespace.to_string(),
            key: key.to_string(),
            source,
        }
    }

    /// Creates an unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Async key/value store addressed by `(namespace, key)`.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns the value stored under `(namespace, key)`, if any.
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, StoreError>;

    /// Stores `value` under `(namespace, key)`, replacing any previous value.
    async fn set(&self, namespace: &str, key: &str, value: Value) -> Result<(), StoreError>;

    /// Removes the entry, returning whether it existed.
    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, StoreError>;

    /// Returns the stored value or `default` when the entry is absent.
    async fn get_or(&self, namespace: &str, key: &str, default: Value) -> Result<Value, StoreError> {
        Ok(self.get(namespace, key).await?.unwrap_or(default))
    }
}
