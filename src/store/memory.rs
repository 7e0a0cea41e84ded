use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::{fs, sync::RwLock};

use super::{ListingQuery, ListingStore, SortOrder, StoreError, UpsertOutcome};
use crate::listing::Listing;

/// In-memory collection keyed by content hash, optionally mirrored to a
/// JSON snapshot file on [`ListingStore::flush`].
#[derive(Debug)]
pub struct MemoryStore<T> {
    docs: RwLock<HashMap<String, T>>,
    snapshot: Option<PathBuf>,
}

impl<T: Listing> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Listing> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            snapshot: None,
        }
    }

    /// Open a store backed by `path`. A missing file starts empty; records
    /// already expired at `now` are not loaded.
    pub async fn open(path: impl AsRef<Path>, now: DateTime<Utc>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut docs = HashMap::new();
        match fs::read(&path).await {
            Ok(bytes) => {
                let rows: Vec<T> = serde_json::from_slice(&bytes)?;
                let total = rows.len();
                for mut doc in rows {
                    if doc.is_expired(now) {
                        continue;
                    }
                    let key = doc.seal().to_string();
                    docs.insert(key, doc);
                }
                tracing::info!(
                    target: "store",
                    collection = %T::KIND,
                    loaded = docs.len(),
                    skipped_expired = total - docs.len(),
                    path = %path.display(),
                    "snapshot restored"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(Self {
            docs: RwLock::new(docs),
            snapshot: Some(path),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot.as_deref()
    }
}

#[async_trait]
impl<T: Listing> ListingStore<T> for MemoryStore<T> {
    async fn upsert(&self, doc: T) -> Result<UpsertOutcome, StoreError> {
        if doc.content_hash().is_empty() {
            return Err(StoreError::Unsealed);
        }
        if doc.title().trim().is_empty() || doc.url().trim().is_empty() {
            return Err(StoreError::Incomplete);
        }
        let mut docs = self.docs.write().await;
        // An expired record still present behaves as absent, like a native TTL index.
        let outcome = match docs.get(doc.content_hash()) {
            Some(prev) if !prev.is_expired(doc.fetched_at()) => UpsertOutcome::Updated,
            _ => UpsertOutcome::Inserted,
        };
        docs.insert(doc.content_hash().to_string(), doc);
        Ok(outcome)
    }

    async fn find(&self, query: &ListingQuery, now: DateTime<Utc>) -> Result<Vec<T>, StoreError> {
        let docs = self.docs.read().await;
        let mut rows: Vec<&T> = docs
            .values()
            .filter(|d| !d.is_expired(now) && d.matches(&query.filter))
            .collect();
        rows.sort_by(|a, b| {
            let by_time = match query.sort {
                SortOrder::NewestFirst => b.fetched_at().cmp(&a.fetched_at()),
                SortOrder::OldestFirst => a.fetched_at().cmp(&b.fetched_at()),
            };
            by_time.then_with(|| a.content_hash().cmp(b.content_hash()))
        });
        Ok(rows
            .into_iter()
            .skip(query.skip)
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn get(&self, content_hash: &str) -> Result<Option<T>, StoreError> {
        Ok(self.docs.read().await.get(content_hash).cloned())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.docs.read().await.len())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut docs = self.docs.write().await;
        let before = docs.len();
        docs.retain(|_, d| !d.is_expired(now));
        Ok(before - docs.len())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let bytes = {
            let docs = self.docs.read().await;
            let mut rows: Vec<&T> = docs.values().collect();
            rows.sort_by(|a, b| a.content_hash().cmp(b.content_hash()));
            serde_json::to_vec_pretty(&rows)?
        };
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).await?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}
