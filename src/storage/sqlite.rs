use super::{DocumentStore, StoredDocument, UpsertOutcome};
use crate::error::StoreError;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const SCHEMA: &str = r#"
    PRAGMA journal_mode=WAL;
    CREATE TABLE IF NOT EXISTS documents (
        collection  TEXT NOT NULL,
        doc_key     TEXT NOT NULL,
        body        TEXT NOT NULL,
        written_at  INTEGER NOT NULL,
        PRIMARY KEY (collection, doc_key)
    );
"#;

/// SQLite-backed document store.
///
/// Each `upsert_many` runs in a single transaction using the native
/// `ON CONFLICT ... DO UPDATE` merge. Calls run on the blocking pool so the
/// async deadline around them can fire.
pub struct SqliteStore {
    conn: Arc<Mutex<Option<Connection>>>,
    location: String,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(&path)
            .map_err(|e| StoreError::Unavailable(format!("cannot open {}: {}", path.display(), e)))?;
        Self::init(conn, path.display().to_string())
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Unavailable(format!("cannot open in-memory sqlite: {}", e)))?;
        Self::init(conn, ":memory:".to_string())
    }

    fn init(conn: Connection, location: String) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        info!("Opened SQLite document store at {}", location);
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            location,
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    async fn with_conn<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Task("sqlite connection lock poisoned".to_string()))?;
            let conn = guard
                .as_mut()
                .ok_or_else(|| StoreError::Unavailable("sqlite store is closed".to_string()))?;
            f(conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn count_in(conn: &Connection, collection: &str) -> Result<u64, StoreError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM documents WHERE collection = ?1",
        params![collection],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

#[async_trait]
impl DocumentStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        let collection = collection.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT doc_key, body FROM documents WHERE collection = ?1 ORDER BY doc_key",
            )?;
            let rows = stmt.query_map(params![collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut documents = Vec::new();
            for row in rows {
                let (key, body) = row?;
                let body = serde_json::from_str(&body).map_err(|source| StoreError::Decode {
                    collection: collection.clone(),
                    key: key.clone(),
                    source,
                })?;
                documents.push(StoredDocument { key, body });
            }
            Ok(documents)
        })
        .await
    }

    async fn upsert_many(
        &self,
        collection: &str,
        documents: Vec<StoredDocument>,
    ) -> Result<UpsertOutcome, StoreError> {
        let collection = collection.to_string();
        self.with_conn(move |conn| {
            let written_at = chrono::Utc::now().timestamp();
            let total = documents.len();

            let tx = conn.transaction()?;
            let before = count_in(&tx, &collection)?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO documents (collection, doc_key, body, written_at) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(collection, doc_key) DO UPDATE SET body=excluded.body, written_at=excluded.written_at",
                )?;
                for doc in documents {
                    let body = serde_json::to_string(&doc.body).map_err(StoreError::Encode)?;
                    stmt.execute(params![collection, doc.key, body, written_at])?;
                }
            }
            let after = count_in(&tx, &collection)?;
            tx.commit()?;

            let inserted = (after - before) as usize;
            let outcome = UpsertOutcome {
                inserted,
                replaced: total - inserted,
            };
            debug!(
                "Upserted into {}: {} inserted, {} replaced",
                collection, outcome.inserted, outcome.replaced
            );
            Ok(outcome)
        })
        .await
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        let collection = collection.to_string();
        self.with_conn(move |conn| count_in(conn, &collection)).await
    }

    async fn close(&self) -> Result<(), StoreError> {
        let conn = self.conn.clone();
        let location = self.location.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Task("sqlite connection lock poisoned".to_string()))?;
            if guard.take().is_some() {
                info!("Closed SQLite document store at {}", location);
            }
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
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
    async fn merge_counts_inserted_and_replaced() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_many("c", vec![doc("a", json!(1))]).await.unwrap();

        let outcome = store
            .upsert_many("c", vec![doc("a", json!(2)), doc("b", json!(3))])
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome { inserted: 1, replaced: 1 });
        assert_eq!(store.count("c").await.unwrap(), 2);
        assert_eq!(store.count("other").await.unwrap(), 0);

        let docs = store.find_all("c").await.unwrap();
        assert_eq!(docs, vec![doc("a", json!(2)), doc("b", json!(3))]);
    }

    #[tokio::test]
    async fn closed_store_reports_unavailable() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ping().await.unwrap();
        store.close().await.unwrap();
        assert!(store.find_all("c").await.unwrap_err().is_unavailable());
    }

    #[tokio::test]
    async fn reopening_a_file_keeps_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.db");

        let store = SqliteStore::open(&path).unwrap();
        store.upsert_many("c", vec![doc("k", json!({"x": true}))]).await.unwrap();
        store.close().await.unwrap();

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.find_all("c").await.unwrap(), vec![doc("k", json!({"x": true}))]);
    }
}
