use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;

use crate::listing::Listing;
use crate::store::{ListingStore, StoreError, UpsertOutcome};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Upsert every listing. A failing record is logged and counted; the rest
/// of the batch is still written.
pub async fn write_batch<T, S>(store: &S, batch: Vec<T>) -> WriteSummary
where
    T: Listing,
    S: ListingStore<T> + ?Sized,
{
    let kind = T::KIND;
    let mut summary = WriteSummary::default();
    for doc in batch {
        let url = doc.url().to_string();
        match store.upsert(doc).await {
            Ok(UpsertOutcome::Inserted) => summary.inserted += 1,
            Ok(UpsertOutcome::Updated) => summary.updated += 1,
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(target: "store", collection = kind.collection(), %url, error = %e, "upsert failed");
            }
        }
    }

    counter!("store_inserted_total", "collection" => kind.collection())
        .increment(summary.inserted as u64);
    counter!("store_updated_total", "collection" => kind.collection())
        .increment(summary.updated as u64);
    counter!("store_write_errors_total", "collection" => kind.collection())
        .increment(summary.failed as u64);

    summary
}

/// Physically delete expired records, then flush. Removed records are
/// counted before the flush, so a failed flush still reports them.
pub async fn sweep<T, S>(store: &S, now: DateTime<Utc>) -> Result<usize, StoreError>
where
    T: Listing,
    S: ListingStore<T> + ?Sized,
{
    let collection = T::KIND.collection();
    let removed = match store.sweep_expired(now).await {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(target: "store", collection, error = %e, "expiry sweep failed");
            return Err(e);
        }
    };
    counter!("store_expired_total", "collection" => collection).increment(removed as u64);
    tracing::info!(target: "store", collection, removed, "expired listings swept");

    if let Err(e) = store.flush().await {
        tracing::warn!(target: "store", collection, error = %e, "flush after sweep failed");
        return Err(e);
    }
    Ok(removed)
}
