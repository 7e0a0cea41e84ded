// tests/ingest_scheduler.rs
//
// The scheduler driving a real ingestor, with time supplied by the test.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use listing_ingest::ingest::config::ScheduleConfig;
use listing_ingest::ingest::http::{HttpClient, RetryPolicy};
use listing_ingest::ingest::providers::RssFetcher;
use listing_ingest::ingest::scheduler::{Scheduler, TaskState};
use listing_ingest::ingest::types::{SourceFetcher, SourceProfile};
use listing_ingest::{Course, Ingestor, Job, ListingStore, MemoryStore};

const JOBS_RSS: &str = include_str!("fixtures/jobs_rss.xml");

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-06-10T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn http() -> HttpClient {
    HttpClient::new(
        "listing-ingest-tests",
        RetryPolicy {
            attempts: 2,
            base_delay: StdDuration::from_millis(1),
            timeout: StdDuration::from_secs(2),
        },
        5,
    )
    .unwrap()
}

fn feed(name: &str, url: String) -> Arc<dyn SourceFetcher> {
    Arc::new(RssFetcher::new(SourceProfile::named(name), vec![url], http()))
}

#[tokio::test]
async fn job_course_and_cleanup_tasks_follow_their_intervals() {
    let mut server = mockito::Server::new_async().await;
    let _jobs = server
        .mock("GET", "/jobs.xml")
        .with_status(200)
        .with_body(JOBS_RSS)
        .create_async()
        .await;
    let _courses = server
        .mock("GET", "/courses.xml")
        .with_status(503)
        .create_async()
        .await;

    let jobs = Arc::new(MemoryStore::<Job>::new());
    let courses = Arc::new(MemoryStore::<Course>::new());
    let ingestor = Arc::new(
        Ingestor::new(jobs.clone(), courses)
            .with_job_fetchers(vec![feed("indgovtjobs", format!("{}/jobs.xml", server.url()))])
            .with_course_fetchers(vec![feed(
                "classcentral",
                format!("{}/courses.xml", server.url()),
            )]),
    );

    let mut s = Scheduler::for_ingestor(ingestor, &ScheduleConfig::default());

    let r = s.tick(t0()).await;
    assert_eq!(r.ran, vec!["job_fetcher", "cleanup"]);
    assert_eq!(r.failed, vec!["course_fetcher"]);
    assert_eq!(jobs.count().await.unwrap(), 3);
    assert_eq!(
        s.state("job_fetcher"),
        Some(TaskState::Cooldown { last_run: t0() })
    );
    // every course source failed, so last_run did not advance
    assert_eq!(s.state("course_fetcher"), Some(TaskState::Idle));

    // a minute later only the failed task is due again
    let r = s.tick(t0() + Duration::minutes(1)).await;
    assert!(r.ran.is_empty());
    assert_eq!(r.failed, vec!["course_fetcher"]);

    // after 6h jobs run again; cleanup waits for 24h
    let r = s.tick(t0() + Duration::hours(6)).await;
    assert_eq!(r.ran, vec!["job_fetcher"]);

    // after 25h the original job listings (24h TTL) are refreshed by the
    // job task first, so cleanup has nothing left to delete
    let r = s.tick(t0() + Duration::hours(25)).await;
    assert_eq!(r.ran, vec!["job_fetcher", "cleanup"]);
    assert_eq!(jobs.count().await.unwrap(), 3);
}
