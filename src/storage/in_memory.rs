use super::{DocumentStore, StoredDocument, UpsertOutcome};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

type Collections = HashMap<String, BTreeMap<String, serde_json::Value>>;

/// In-memory document store for development/testing.
///
/// The mutex is held for the whole of a bulk upsert, so each batch is applied
/// atomically with respect to readers.
pub struct InMemoryStore {
    collections: Arc<Mutex<Collections>>,
    closed: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(Mutex::new(HashMap::new())),
            closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Collections>, StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store is closed".to_string()));
        }
        self.collections
            .lock()
            .map_err(|_| StoreError::Task("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        let collections = self.lock()?;
        let documents = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(key, body)| StoredDocument {
                        key: key.clone(),
                        body: body.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(documents)
    }

    async fn upsert_many(
        &self,
        collection: &str,
        documents: Vec<StoredDocument>,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut collections = self.lock()?;
        let target = collections.entry(collection.to_string()).or_default();

        let mut outcome = UpsertOutcome::default();
        for doc in documents {
            match target.insert(doc.key, doc.body) {
                Some(_) => outcome.replaced += 1,
                None => outcome.inserted += 1,
            }
        }

        debug!(
            "Upserted into {}: {} inserted, {} replaced",
            collection, outcome.inserted, outcome.replaced
        );
        Ok(outcome)
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        let collections = self.lock()?;
        Ok(collections.get(collection).map_or(0, |docs| docs.len() as u64))
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(key: &str, body: serde_json::Value) -> StoredDocument {
        StoredDocument {
            key: key.to_string(),
            body,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_matched_and_inserts_unmatched() {
        let store = InMemoryStore::new();
        store
            .upsert_many("c", vec![doc("a", json!({"v": 1})), doc("b", json!({"v": 1}))])
            .await
            .unwrap();

        let outcome = store
            .upsert_many("c", vec![doc("b", json!({"v": 2})), doc("c", json!({"v": 2}))])
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome { inserted: 1, replaced: 1 });

        let docs = store.find_all("c").await.unwrap();
        assert_eq!(docs.len(), 3);
        // Keys absent from the batch are kept
        assert_eq!(docs[0], doc("a", json!({"v": 1})));
        assert_eq!(docs[1], doc("b", json!({"v": 2})));
    }

    #[tokio::test]
    async fn unknown_collection_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.find_all("nothing").await.unwrap().is_empty());
        assert_eq!(store.count("nothing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn closed_store_is_unavailable() {
        let store = InMemoryStore::new();
        store.close().await.unwrap();
        assert!(matches!(store.ping().await, Err(StoreError::Unavailable(_))));
        assert!(store.count("c").await.unwrap_err().is_unavailable());
    }
}
