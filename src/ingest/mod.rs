// src/ingest/mod.rs
pub mod config;
pub mod dedup;
pub mod http;
pub mod normalize;
pub mod orchestrator;
pub mod providers;
pub mod scheduler;
pub mod sources;
pub mod types;
pub mod writer;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::ingest::normalize::NormalizeError;
use crate::ingest::types::{RawRecord, SourceFetcher, SourceProfile};
use crate::ingest::writer::WriteSummary;
use crate::listing::{Course, Job, Listing, ListingKind};
use crate::store::ListingStore;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_records_total", "Raw records returned by sources.");
        describe_counter!(
            "ingest_normalize_dropped_total",
            "Records dropped because they could not be normalized."
        );
        describe_counter!(
            "ingest_dedup_total",
            "Listings removed as duplicates within a run."
        );
        describe_counter!(
            "ingest_source_errors_total",
            "Sources that failed a run (after retries)."
        );
        describe_counter!(
            "ingest_decode_errors_total",
            "Responses that could not be decoded."
        );
        describe_counter!("ingest_http_retries_total", "Failed HTTP attempts.");
        describe_histogram!("ingest_fetch_ms", "Per-source fetch time in milliseconds.");
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!("ingest_last_run_ts", "Unix ts when ingestion last ran.");
        describe_counter!("store_inserted_total", "Listings inserted.");
        describe_counter!("store_updated_total", "Listings overwritten.");
        describe_counter!("store_write_errors_total", "Failed upserts.");
        describe_counter!("store_expired_total", "Expired listings swept.");
        describe_counter!("scheduler_task_runs_total", "Scheduled task runs.");
        describe_counter!(
            "scheduler_task_failures_total",
            "Scheduled task runs that failed."
        );
    });
}

/// Outcome of one ingestion run over one collection.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub kind: ListingKind,
    /// Raw records returned by all successful sources.
    pub fetched: usize,
    /// Records that failed normalization.
    pub dropped: usize,
    pub duplicates: usize,
    pub written: WriteSummary,
    pub succeeded_sources: Vec<String>,
    pub failed_sources: Vec<(String, String)>,
}

type NormalizeFn<T> =
    fn(&RawRecord, &SourceProfile, DateTime<Utc>, Duration) -> Result<T, NormalizeError>;

/// Fetch → normalize → dedup → write pipeline for both collections.
pub struct Ingestor {
    job_fetchers: Vec<Arc<dyn SourceFetcher>>,
    course_fetchers: Vec<Arc<dyn SourceFetcher>>,
    jobs: Arc<dyn ListingStore<Job>>,
    courses: Arc<dyn ListingStore<Course>>,
    job_ttl: Duration,
    course_ttl: Duration,
}

impl Ingestor {
    pub fn new(jobs: Arc<dyn ListingStore<Job>>, courses: Arc<dyn ListingStore<Course>>) -> Self {
        let ttl = config::TtlConfig::default();
        Self {
            job_fetchers: Vec::new(),
            course_fetchers: Vec::new(),
            jobs,
            courses,
            job_ttl: ttl.job(),
            course_ttl: ttl.course(),
        }
    }

    pub fn with_job_fetchers(mut self, fetchers: Vec<Arc<dyn SourceFetcher>>) -> Self {
        self.job_fetchers = fetchers;
        self
    }

    pub fn with_course_fetchers(mut self, fetchers: Vec<Arc<dyn SourceFetcher>>) -> Self {
        self.course_fetchers = fetchers;
        self
    }

    pub fn with_ttl(mut self, ttl: &config::TtlConfig) -> Self {
        self.job_ttl = ttl.job();
        self.course_ttl = ttl.course();
        self
    }

    pub fn job_store(&self) -> &Arc<dyn ListingStore<Job>> {
        &self.jobs
    }

    pub fn course_store(&self) -> &Arc<dyn ListingStore<Course>> {
        &self.courses
    }

    pub async fn run_job_ingestion(&self) -> Result<RunReport> {
        self.run_job_ingestion_at(Utc::now()).await
    }

    pub async fn run_job_ingestion_at(&self, now: DateTime<Utc>) -> Result<RunReport> {
        run_pipeline(
            &self.job_fetchers,
            self.jobs.as_ref(),
            now,
            self.job_ttl,
            normalize::normalize_job,
        )
        .await
    }

    pub async fn run_course_ingestion(&self) -> Result<RunReport> {
        self.run_course_ingestion_at(Utc::now()).await
    }

    pub async fn run_course_ingestion_at(&self, now: DateTime<Utc>) -> Result<RunReport> {
        run_pipeline(
            &self.course_fetchers,
            self.courses.as_ref(),
            now,
            self.course_ttl,
            normalize::normalize_course,
        )
        .await
    }

    /// Delete expired records from both stores. Returns `(jobs, courses)`.
    ///
    /// Each collection is swept even if the other fails; the error names
    /// every collection that failed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<(usize, usize)> {
        ensure_metrics_described();
        let jobs = writer::sweep::<Job, _>(self.jobs.as_ref(), now).await;
        let courses = writer::sweep::<Course, _>(self.courses.as_ref(), now).await;

        match (jobs, courses) {
            (Ok(j), Ok(c)) => Ok((j, c)),
            (jobs, courses) => {
                let failed: Vec<String> = [(ListingKind::Job, jobs), (ListingKind::Course, courses)]
                    .into_iter()
                    .filter_map(|(kind, r)| r.err().map(|e| format!("{}: {e}", kind.collection())))
                    .collect();
                Err(anyhow!("sweep failed for {}", failed.join(", ")))
            }
        }
    }
}

async fn run_pipeline<T: Listing>(
    fetchers: &[Arc<dyn SourceFetcher>],
    store: &dyn ListingStore<T>,
    now: DateTime<Utc>,
    ttl: Duration,
    map: NormalizeFn<T>,
) -> Result<RunReport> {
    ensure_metrics_described();
    let kind = T::KIND;

    let harvest = orchestrator::harvest(fetchers).await;
    let fetched = harvest.records.len();

    let mut listings = Vec::with_capacity(fetched);
    let mut dropped = 0usize;
    for sr in &harvest.records {
        match map(&sr.record, &sr.profile, now, ttl) {
            Ok(l) => listings.push(l),
            Err(e) => {
                dropped += 1;
                tracing::debug!(target: "ingest", source = %sr.profile.name, variant = sr.record.variant(), error = %e, "record dropped");
            }
        }
    }
    counter!("ingest_normalize_dropped_total", "collection" => kind.collection())
        .increment(dropped as u64);

    let (unique, duplicates) = dedup::dedup(listings);
    counter!("ingest_dedup_total", "collection" => kind.collection())
        .increment(duplicates as u64);

    let written = writer::write_batch(store, unique).await;
    if let Err(e) = store.flush().await {
        tracing::warn!(target: "store", collection = kind.collection(), error = %e, "flush failed");
    }

    gauge!("ingest_last_run_ts", "collection" => kind.collection())
        .set(now.timestamp() as f64);

    let report = RunReport {
        kind,
        fetched,
        dropped,
        duplicates,
        written,
        succeeded_sources: harvest.succeeded.clone(),
        failed_sources: harvest.failed.clone(),
    };

    tracing::info!(
        target: "ingest",
        collection = kind.collection(),
        fetched,
        dropped,
        duplicates,
        inserted = written.inserted,
        updated = written.updated,
        write_failed = written.failed,
        sources_failed = report.failed_sources.len(),
        "ingestion run finished"
    );

    if harvest.all_failed() {
        return Err(anyhow!(
            "all {} {} sources failed",
            harvest.failed.len(),
            kind.collection()
        ));
    }
    Ok(report)
}
