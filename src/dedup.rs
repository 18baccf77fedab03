//! Persistent set of already-seen links.
//!
//! Links are compared by their [`normalize_link`] form. The set lives in a
//! [`KvStore`] as a JSON array under `(namespace, "links")` and is cached in
//! memory after the first access. Every mutation runs load, modify and
//! persist under one async mutex, so concurrent callers of
//! [`DedupStore::record_if_new`] can never both observe a link as new.
//!
//! When persisting fails the in-memory change is rolled back, so memory and
//! storage never disagree about membership.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::parser::normalize_link;
use crate::store::{KvStore, StoreError};

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "links";

const LINKS_KEY: &str = "links";

/// Errors raised by [`DedupStore`].
#[derive(Debug, Error)]
pub enum DedupError {
    /// The persisted set could not be read.
    #[error("failed to load dedup set '{namespace}': {source}")]
    Load {
        /// Namespace being loaded.
        namespace: String,
        /// Backend error.
        #[source]
        source: StoreError,
    },

    /// The updated set could not be written; the change was rolled back.
    #[error("failed to persist dedup set '{namespace}': {source}")]
    Persist {
        /// Namespace being written.
        namespace: String,
        /// Backend error.
        #[source]
        source: StoreError,
    },

    /// The persisted value is not an array of strings.
    #[error("dedup set '{namespace}' is corrupt: {reason}")]
    Corrupt {
        /// Namespace being loaded.
        namespace: String,
        /// What was wrong with the stored value.
        reason: String,
    },
}

/// Result of [`DedupStore::bulk_add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BulkAddReport {
    /// Links newly recorded.
    pub added: usize,
    /// Links that were already known (or repeated within the input).
    pub duplicates_skipped: usize,
    /// Size of the set after the operation.
    pub total_after: usize,
}

#[derive(Debug, Default, Clone)]
struct DedupState {
    links: Vec<String>,
    keys: HashSet<String>,
}

impl DedupState {
    fn insert(&mut self, link: &str) -> bool {
        let key = normalize_link(link);
        if key.is_empty() || !self.keys.insert(key) {
            return false;
        }
        self.links.push(link.trim().to_string());
        true
    }

    /// Reverts the most recent successful [`DedupState::insert`] of `link`.
    fn undo_insert(&mut self, link: &str) {
        self.keys.remove(&normalize_link(link));
        self.links.pop();
    }

    fn remove(&mut self, link: &str) -> bool {
        let key = normalize_link(link);
        if !self.keys.remove(&key) {
            return false;
        }
        self.links.retain(|existing| normalize_link(existing) != key);
        true
    }

    fn to_value(&self) -> Value {
        Value::Array(self.links.iter().cloned().map(Value::String).collect())
    }
}

/// Persistent, normalized link set with atomic check-and-set.
pub struct DedupStore {
    store: Arc<dyn KvStore>,
    namespace: String,
    state: Mutex<Option<DedupState>>,
}

impl fmt::Debug for DedupStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedupStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl DedupStore {
    /// Creates a dedup set stored under `namespace`.
    pub fn new(store: Arc<dyn KvStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            state: Mutex::new(None),
        }
    }

    /// Creates a dedup set under [`DEFAULT_NAMESPACE`].
    pub fn with_default_namespace(store: Arc<dyn KvStore>) -> Self {
        Self::new(store, DEFAULT_NAMESPACE)
    }

    /// Namespace this set is stored under.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns true when `link` has not been recorded yet.
    ///
    /// # Errors
    ///
    /// Returns [`DedupError`] when the set cannot be loaded.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn is_new(&self, link: &str) -> Result<bool, DedupError> {
        let mut guard = self.state.lock().await;
        let state = self.loaded(&mut *guard).await?;
        let key = normalize_link(link);
        Ok(!key.is_empty() && !state.keys.contains(&key))
    }

    /// Records `link` if it is new. Returns whether it was recorded.
    ///
    /// # Errors
    ///
    /// Returns [`DedupError`] when loading or persisting fails; a failed
    /// persist leaves the set unchanged.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn record_if_new(&self, link: &str) -> Result<bool, DedupError> {
        let mut guard = self.state.lock().await;
        let state = self.loaded(&mut *guard).await?;

        if !state.insert(link) {
            return Ok(false);
        }
        if let Err(e) = self.persist(state).await {
            state.undo_insert(link);
            return Err(e);
        }
        debug!(link, "recorded link");
        Ok(true)
    }

    /// Records every new link in `links`. The first spelling of a link wins.
    ///
    /// # Errors
    ///
    /// Returns [`DedupError`] when loading or persisting fails.
    #[instrument(skip(self, links), fields(namespace = %self.namespace))]
    pub async fn bulk_add<I, S>(&self, links: I) -> Result<BulkAddReport, DedupError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut guard = self.state.lock().await;
        let state = self.loaded(&mut *guard).await?;

        let mut next = state.clone();
        let mut added = 0;
        let mut duplicates_skipped = 0;
        for link in links {
            if next.insert(link.as_ref()) {
                added += 1;
            } else {
                duplicates_skipped += 1;
            }
        }

        if added > 0 {
            self.persist(&next).await?;
            *state = next;
        }

        let report = BulkAddReport {
            added,
            duplicates_skipped,
            total_after: state.keys.len(),
        };
        info!(
            added = report.added,
            duplicates_skipped = report.duplicates_skipped,
            total = report.total_after,
            "bulk add complete"
        );
        Ok(report)
    }

    /// Forgets `link` so it can be admitted again. Returns whether it was present.
    ///
    /// # Errors
    ///
    /// Returns [`DedupError`] when loading or persisting fails.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn remove(&self, link: &str) -> Result<bool, DedupError> {
        let mut guard = self.state.lock().await;
        let state = self.loaded(&mut *guard).await?;

        let mut next = state.clone();
        if !next.remove(link) {
            return Ok(false);
        }
        self.persist(&next).await?;
        *state = next;
        Ok(true)
    }

    /// Removes every link. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`DedupError`] when loading or persisting fails.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn clear(&self) -> Result<usize, DedupError> {
        let mut guard = self.state.lock().await;
        let state = self.loaded(&mut *guard).await?;

        let removed = state.keys.len();
        let next = DedupState::default();
        self.persist(&next).await?;
        *state = next;
        info!(removed, "dedup set cleared");
        Ok(removed)
    }

    /// Number of recorded links.
    ///
    /// # Errors
    ///
    /// Returns [`DedupError`] when the set cannot be loaded.
    pub async fn count(&self) -> Result<usize, DedupError> {
        let mut guard = self.state.lock().await;
        Ok(self.loaded(&mut *guard).await?.keys.len())
    }

    /// Recorded links in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`DedupError`] when the set cannot be loaded.
    pub async fn links(&self) -> Result<Vec<String>, DedupError> {
        let mut guard = self.state.lock().await;
        Ok(self.loaded(&mut *guard).await?.links.clone())
    }

    async fn loaded<'a>(
        &self,
        slot: &'a mut Option<DedupState>,
    ) -> Result<&'a mut DedupState, DedupError> {
        if slot.is_none() {
            *slot = Some(self.load().await?);
        }
        slot.as_mut().ok_or_else(|| DedupError::Corrupt {
            namespace: self.namespace.clone(),
            reason: "state missing after load".to_string(),
        })
    }

    async fn load(&self) -> Result<DedupState, DedupError> {
        let value = self
            .store
            .get_or(&self.namespace, LINKS_KEY, Value::Array(Vec::new()))
            .await
            .map_err(|source| DedupError::Load {
                namespace: self.namespace.clone(),
                source,
            })?;

        let Value::Array(entries) = value else {
            return Err(DedupError::Corrupt {
                namespace: self.namespace.clone(),
                reason: "expected a JSON array".to_string(),
            });
        };

        let mut state = DedupState::default();
        for entry in entries {
            match entry {
                Value::String(link) => {
                    state.insert(&link);
                }
                other => warn!(entry = %other, "ignoring non-string dedup entry"),
            }
        }
        debug!(count = state.keys.len(), "dedup set loaded");
        Ok(state)
    }

    async fn persist(&self, state: &DedupState) -> Result<(), DedupError> {
        self.store
            .set(&self.namespace, LINKS_KEY, state.to_value())
            .await
            .map_err(|source| {
                warn!(error = %source, "dedup persist failed, change rolled back");
                DedupError::Persist {
                    namespace: self.namespace.clone(),
                    source,
                }
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::store::MemoryKvStore;

    fn memory_dedup() -> (Arc<MemoryKvStore>, DedupStore) {
        let store = Arc::new(MemoryKvStore::new());
        let dedup = DedupStore::with_default_namespace(store.clone());
        (store, dedup)
    }

    /// Store whose writes fail while `fail_writes` is set.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryKvStore,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl KvStore for FlakyStore {
        async fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, StoreError> {
            self.inner.get(namespace, key).await
        }

        async fn set(&self, namespace: &str, key: &str, value: Value) -> Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::unavailable("disk full"));
            }
            self.inner.set(namespace, key, value).await
        }

        async fn delete(&self, namespace: &str, key: &str) -> Result<bool, StoreError> {
            self.inner.delete(namespace, key).await
        }
    }

    #[tokio::test]
    async fn test_record_if_new_then_duplicate() {
        let (_, dedup) = memory_dedup();
        assert!(dedup.is_new("https://terabox.com/s/1").await.unwrap());
        assert!(dedup.record_if_new("https://terabox.com/s/1").await.unwrap());
        assert!(!dedup.record_if_new("https://TERABOX.com/s/1/").await.unwrap());
        assert!(!dedup.is_new("https://terabox.com/s/1").await.unwrap());
        assert_eq!(dedup.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_record_if_new_persists_original_spelling() {
        let (store, dedup) = memory_dedup();
        dedup.record_if_new(" https://TeraBox.com/s/1Ab ").await.unwrap();

        let stored = store.get(DEFAULT_NAMESPACE, LINKS_KEY).await.unwrap();
        assert_eq!(stored, Some(json!(["https://TeraBox.com/s/1Ab"])));
    }

    #[tokio::test]
    async fn test_bulk_add_counts_and_idempotence() {
        let (_, dedup) = memory_dedup();
        let links = ["https://terabox.com/s/a", "https://terabox.com/s/b", "https://terabox.com/s/A/"];

        let first = dedup.bulk_add(links).await.unwrap();
        assert_eq!(
            first,
            BulkAddReport {
                added: 2,
                duplicates_skipped: 1,
                total_after: 2
            }
        );

        let second = dedup.bulk_add(links).await.unwrap();
        assert_eq!(second.added, 0);
        assert_eq!(second.duplicates_skipped, links.len());
        assert_eq!(second.total_after, 2);
    }

    #[tokio::test]
    async fn test_bulk_add_first_spelling_wins() {
        let (_, dedup) = memory_dedup();
        dedup
            .bulk_add(["https://terabox.com/s/ABC", "https://terabox.com/s/abc"])
            .await
            .unwrap();
        assert_eq!(dedup.links().await.unwrap(), vec!["https://terabox.com/s/ABC"]);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (_, dedup) = memory_dedup();
        dedup.bulk_add(["https://terabox.com/s/1", "https://terabox.com/s/2"]).await.unwrap();

        assert!(dedup.remove("HTTPS://terabox.com/s/1").await.unwrap());
        assert!(!dedup.remove("https://terabox.com/s/1").await.unwrap());
        assert!(dedup.is_new("https://terabox.com/s/1").await.unwrap());

        assert_eq!(dedup.clear().await.unwrap(), 1);
        assert_eq!(dedup.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blank_link_is_never_recorded() {
        let (_, dedup) = memory_dedup();
        assert!(!dedup.record_if_new("   ").await.unwrap());
        assert!(!dedup.is_new("").await.unwrap());
        assert_eq!(dedup.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_record_if_new_admits_exactly_one() {
        let (_, dedup) = memory_dedup();
        let dedup = Arc::new(dedup);

        let mut handles = Vec::new();
        for _ in 0..32 {
            let dedup = Arc::clone(&dedup);
            handles.push(tokio::spawn(async move {
                dedup.record_if_new("https://terabox.com/s/race").await.unwrap()
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }

    #[tokio::test]
    async fn test_failed_persist_rolls_back() {
        let store = Arc::new(FlakyStore::default());
        let dedup = DedupStore::new(store.clone(), "ns");
        dedup.record_if_new("https://terabox.com/s/kept").await.unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        let err = dedup.record_if_new("https://terabox.com/s/lost").await.unwrap_err();
        assert!(matches!(err, DedupError::Persist { .. }));
        assert!(dedup.is_new("https://terabox.com/s/lost").await.unwrap());
        assert_eq!(dedup.count().await.unwrap(), 1);
        assert_eq!(
            dedup.links().await.unwrap(),
            vec!["https://terabox.com/s/kept"]
        );

        store.fail_writes.store(false, Ordering::SeqCst);
        assert!(dedup.record_if_new("https://terabox.com/s/lost").await.unwrap());
        assert_eq!(
            dedup.links().await.unwrap(),
            vec!["https://terabox.com/s/kept", "https://terabox.com/s/lost"]
        );

        // The rolled-back claim left nothing behind in the backing store.
        let reopened = DedupStore::new(store.clone(), "ns");
        assert_eq!(reopened.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_value_is_reported() {
        let store = Arc::new(MemoryKvStore::new());
        store.set("ns", LINKS_KEY, json!({"not": "a list"})).await.unwrap();
        let dedup = DedupStore::new(store, "ns");

        let err = dedup.count().await.unwrap_err();
        assert!(matches!(err, DedupError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_namespaces_do_not_share_links() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let a = DedupStore::new(Arc::clone(&store), "a");
        let b = DedupStore::new(store, "b");

        a.record_if_new("https://terabox.com/s/1").await.unwrap();
        assert!(b.is_new("https://terabox.com/s/1").await.unwrap());
    }
}
