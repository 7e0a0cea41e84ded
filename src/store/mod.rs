//! Listing store: upsert keyed by content hash, filtered queries, expiry.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::listing::{Difficulty, JobType, Listing};

pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("listing has no content hash")]
    Unsealed,
    #[error("listing has empty title or url")]
    Incomplete,
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("store backend: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Field filters for [`ListingStore::find`]. Fields that don't apply to a
/// collection (e.g. `job_type` for courses) are ignored by it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFilter {
    pub category: Option<String>,
    pub job_type: Option<JobType>,
    pub country: Option<String>,
    pub platform: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub language: Option<String>,
    /// Case-insensitive substring over the collection's text fields.
    pub text: Option<String>,
}

impl ListingFilter {
    pub(crate) fn text_lower(&self) -> Option<String> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListingQuery {
    pub filter: ListingFilter,
    pub sort: SortOrder,
    pub skip: usize,
    pub limit: usize,
}

impl Default for ListingQuery {
    fn default() -> Self {
        Self {
            filter: ListingFilter::default(),
            sort: SortOrder::NewestFirst,
            skip: 0,
            limit: 10,
        }
    }
}

impl ListingQuery {
    pub fn all() -> Self {
        Self {
            limit: usize::MAX,
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait ListingStore<T: Listing>: Send + Sync {
    /// Insert or overwrite the record stored under `doc.content_hash()`.
    async fn upsert(&self, doc: T) -> Result<UpsertOutcome, StoreError>;

    /// Live (unexpired at `now`) records matching the query.
    async fn find(&self, query: &ListingQuery, now: DateTime<Utc>) -> Result<Vec<T>, StoreError>;

    async fn get(&self, content_hash: &str) -> Result<Option<T>, StoreError>;

    /// Number of stored records, including expired ones not yet swept.
    async fn count(&self) -> Result<usize, StoreError>;

    /// Delete records whose `expires_at` is at or before `now`.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Make writes durable. No-op for stores without a backing file.
    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
