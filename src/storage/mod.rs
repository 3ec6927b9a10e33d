//! Keyed document store shared by every layer.
//!
//! Backends only know about collections of JSON documents addressed by a
//! string key. The typed [`Collection`] view adds encoding, decoding and the
//! `upsert_many(records, key_fn)` capability the stages rely on.

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

use crate::error::StoreError;

/// A JSON document as held by a backend
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub key: String,
    pub body: serde_json::Value,
}

/// Result of a bulk upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsertOutcome {
    pub inserted: usize,
    pub replaced: usize,
}

impl UpsertOutcome {
    pub fn written(&self) -> usize {
        self.inserted + self.replaced
    }
}

/// Storage backend for layer collections.
///
/// `upsert_many` replaces documents whose key already exists and inserts the
/// rest in one call. Backends decide the atomicity of that call; callers only
/// assume at-least-once application of the batch. `find_all` returns documents
/// in ascending key order. Nothing is ever deleted through this trait.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn find_all(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError>;

    async fn upsert_many(
        &self,
        collection: &str,
        documents: Vec<StoredDocument>,
    ) -> Result<UpsertOutcome, StoreError>;

    async fn count(&self, collection: &str) -> Result<u64, StoreError>;

    /// Release the backend. Later calls fail with `StoreError::Unavailable`.
    async fn close(&self) -> Result<(), StoreError>;
}

/// A record type that lives in a fixed collection.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;
}

/// Typed view over one collection of a store.
pub struct Collection<'a, T> {
    store: &'a dyn DocumentStore,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Document> Collection<'a, T> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    pub async fn find_all(&self) -> Result<Vec<T>, StoreError> {
        self.find_where(|_| true).await
    }

    /// Decode every document and keep the ones matching `predicate`.
    pub async fn find_where<P>(&self, predicate: P) -> Result<Vec<T>, StoreError>
    where
        P: Fn(&T) -> bool,
    {
        let documents = self.store.find_all(T::COLLECTION).await?;
        let mut records = Vec::with_capacity(documents.len());
        for doc in documents {
            let record: T = serde_json::from_value(doc.body).map_err(|source| StoreError::Decode {
                collection: T::COLLECTION.to_string(),
                key: doc.key,
                source,
            })?;
            if predicate(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Replace-or-insert every record under the key produced by `key_fn`.
    pub async fn upsert_many<F>(&self, records: &[T], key_fn: F) -> Result<UpsertOutcome, StoreError>
    where
        F: Fn(&T) -> String,
    {
        let documents = records
            .iter()
            .map(|record| {
                serde_json::to_value(record)
                    .map(|body| StoredDocument {
                        key: key_fn(record),
                        body,
                    })
                    .map_err(StoreError::Encode)
            })
            .collect::<Result<Vec<_>, _>>()?;

        if documents.is_empty() {
            return Ok(UpsertOutcome::default());
        }
        self.store.upsert_many(T::COLLECTION, documents).await
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        self.store.count(T::COLLECTION).await
    }
}
