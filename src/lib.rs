// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod ingest;
pub mod listing;
pub mod metrics;
pub mod store;

pub use crate::api::router;
pub use crate::ingest::{Ingestor, RunReport};
pub use crate::listing::{Course, Job, Listing, ListingKind};
pub use crate::store::{ListingStore, MemoryStore};

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::ingest::config::IngestConfig;
use crate::ingest::http::HttpClient;
use crate::ingest::sources::{build_fetchers, SourceCatalog};

/// Everything the binary runs: the ingestor (with its stores) and the
/// read-API state over the same stores.
pub struct Service {
    pub ingestor: Arc<Ingestor>,
    pub state: api::AppState,
}

/// Open stores (restoring snapshots when configured), build fetchers for
/// every enabled catalog source and wire them into one ingestor.
pub async fn build_service(cfg: &IngestConfig, catalog: &SourceCatalog) -> Result<Service> {
    let now = Utc::now();
    let (jobs, courses): (Arc<dyn ListingStore<Job>>, Arc<dyn ListingStore<Course>>) =
        match &cfg.store.snapshot_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("creating snapshot dir {}", dir.display()))?;
                (
                    Arc::new(open_store::<Job>(&dir.join("jobs.json"), now).await?),
                    Arc::new(open_store::<Course>(&dir.join("courses.json"), now).await?),
                )
            }
            None => (Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new())),
        };

    let http = HttpClient::new(
        &cfg.http.user_agent,
        cfg.http.retry_policy(),
        cfg.http.max_concurrency,
    )
    .context("building http client")?;

    let ingestor = Ingestor::new(jobs.clone(), courses.clone())
        .with_ttl(&cfg.ttl)
        .with_job_fetchers(build_fetchers(&catalog.jobs, &http, &cfg.disabled_sources)?)
        .with_course_fetchers(build_fetchers(
            &catalog.courses,
            &http,
            &cfg.disabled_sources,
        )?);

    Ok(Service {
        ingestor: Arc::new(ingestor),
        state: api::AppState { jobs, courses },
    })
}

async fn open_store<T: Listing>(path: &Path, now: chrono::DateTime<Utc>) -> Result<MemoryStore<T>> {
    MemoryStore::open(path, now)
        .await
        .with_context(|| format!("opening snapshot {}", path.display()))
}
