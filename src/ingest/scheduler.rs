// src/ingest/scheduler.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::ingest::config::ScheduleConfig;
use crate::ingest::Ingestor;
use crate::listing::ListingKind;

#[async_trait]
pub trait ScheduledTask: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, now: DateTime<Utc>) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Never run successfully.
    Idle,
    Running { started_at: DateTime<Utc> },
    Cooldown { last_run: DateTime<Utc> },
}

struct Entry {
    task: Arc<dyn ScheduledTask>,
    interval: Duration,
    state: TaskState,
}

impl Entry {
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            TaskState::Idle => true,
            TaskState::Cooldown { last_run } => now - last_run >= self.interval,
            TaskState::Running { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub ran: Vec<String>,
    pub failed: Vec<String>,
}

/// Stops a running [`Scheduler`] at its next tick boundary.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Single cooperative loop over named periodic tasks. Due tasks run one
/// after another in registration order, so no two runs ever overlap.
pub struct Scheduler {
    entries: Vec<Entry>,
    tick_every: std::time::Duration,
    start_delay: std::time::Duration,
    stop: StopHandle,
}

impl Scheduler {
    pub fn new(tick_every: std::time::Duration) -> Self {
        Self {
            entries: Vec::new(),
            tick_every,
            start_delay: std::time::Duration::ZERO,
            stop: StopHandle(Arc::new(AtomicBool::new(false))),
        }
    }

    /// Job fetch, course fetch and cleanup tasks over one ingestor.
    pub fn for_ingestor(ingestor: Arc<Ingestor>, cfg: &ScheduleConfig) -> Self {
        let mut s = Self::new(std::time::Duration::from_secs(cfg.tick_secs.max(1)))
            .with_start_delay(std::time::Duration::from_secs(cfg.start_delay_secs));
        s.add_task(
            Arc::new(IngestTask::new(ingestor.clone(), ListingKind::Job)),
            cfg.job_interval(),
        );
        s.add_task(
            Arc::new(IngestTask::new(ingestor.clone(), ListingKind::Course)),
            cfg.course_interval(),
        );
        s.add_task(
            Arc::new(SweepTask::new(ingestor)),
            cfg.cleanup_interval(),
        );
        s
    }

    pub fn with_start_delay(mut self, delay: std::time::Duration) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn add_task(&mut self, task: Arc<dyn ScheduledTask>, interval: Duration) {
        tracing::info!(target: "scheduler", task = task.name(), interval_secs = interval.num_seconds(), "task scheduled");
        self.entries.push(Entry {
            task,
            interval,
            state: TaskState::Idle,
        });
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self, name: &str) -> Option<TaskState> {
        self.entries
            .iter()
            .find(|e| e.task.name() == name)
            .map(|e| e.state)
    }

    /// Run every task due at `now`, sequentially. A failed task goes back
    /// to its previous state so it is retried on the next tick.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        for entry in self.entries.iter_mut() {
            if !entry.is_due(now) {
                continue;
            }
            let name = entry.task.name().to_string();
            let previous = entry.state;
            entry.state = TaskState::Running { started_at: now };
            counter!("scheduler_task_runs_total", "task" => name.clone()).increment(1);

            match entry.task.run(now).await {
                Ok(()) => {
                    entry.state = TaskState::Cooldown { last_run: now };
                    tracing::info!(target: "scheduler", task = %name, "task completed");
                    report.ran.push(name);
                }
                Err(e) => {
                    entry.state = previous;
                    counter!("scheduler_task_failures_total", "task" => name.clone()).increment(1);
                    tracing::warn!(target: "scheduler", task = %name, error = ?e, "task failed");
                    report.failed.push(name);
                }
            }
        }
        report
    }

    /// Tick until stopped. The stop flag is checked at tick boundaries; a
    /// task that is already running is never cancelled.
    pub async fn run(mut self) {
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        tracing::info!(target: "scheduler", tasks = self.entries.len(), "scheduler started");
        let mut ticker = tokio::time::interval(self.tick_every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if self.stop.is_stopped() {
                break;
            }
            self.tick(Utc::now()).await;
        }
        tracing::info!(target: "scheduler", "scheduler stopped");
    }

    pub fn spawn(self) -> (JoinHandle<()>, StopHandle) {
        let stop = self.stop_handle();
        (tokio::spawn(self.run()), stop)
    }
}

/// Periodic ingestion for one collection.
pub struct IngestTask {
    ingestor: Arc<Ingestor>,
    kind: ListingKind,
    name: String,
}

impl IngestTask {
    pub fn new(ingestor: Arc<Ingestor>, kind: ListingKind) -> Self {
        let name = match kind {
            ListingKind::Job => "job_fetcher",
            ListingKind::Course => "course_fetcher",
        };
        Self {
            ingestor,
            kind,
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl ScheduledTask for IngestTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, now: DateTime<Utc>) -> anyhow::Result<()> {
        let report = match self.kind {
            ListingKind::Job => self.ingestor.run_job_ingestion_at(now).await?,
            ListingKind::Course => self.ingestor.run_course_ingestion_at(now).await?,
        };
        for (source, error) in &report.failed_sources {
            tracing::warn!(target: "scheduler", task = %self.name, %source, %error, "source skipped this run");
        }
        Ok(())
    }
}

/// Physical removal of expired listings.
pub struct SweepTask {
    ingestor: Arc<Ingestor>,
}

impl SweepTask {
    pub fn new(ingestor: Arc<Ingestor>) -> Self {
        Self { ingestor }
    }
}

#[async_trait]
impl ScheduledTask for SweepTask {
    fn name(&self) -> &str {
        "cleanup"
    }

    async fn run(&self, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.ingestor.sweep(now).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Flaky {
        name: &'static str,
        calls: AtomicUsize,
        fail_first: usize,
        stop: Option<StopHandle>,
    }

    impl Flaky {
        fn new(name: &'static str, fail_first: usize) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
                fail_first,
                stop: None,
            })
        }
    }

    #[async_trait]
    impl ScheduledTask for Flaky {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(&self, _now: DateTime<Utc>) -> anyhow::Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(s) = &self.stop {
                s.stop();
            }
            if n < self.fail_first {
                anyhow::bail!("attempt {n} failed");
            }
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-10T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn runs_when_due_and_respects_interval() {
        let task = Flaky::new("a", 0);
        let mut s = Scheduler::new(std::time::Duration::from_secs(60));
        s.add_task(task.clone(), Duration::hours(6));

        assert_eq!(s.state("a"), Some(TaskState::Idle));
        let r = s.tick(t0()).await;
        assert_eq!(r.ran, vec!["a"]);
        assert_eq!(s.state("a"), Some(TaskState::Cooldown { last_run: t0() }));

        let r = s.tick(t0() + Duration::hours(5)).await;
        assert!(r.ran.is_empty());

        let r = s.tick(t0() + Duration::hours(6)).await;
        assert_eq!(r.ran, vec!["a"]);
        assert_eq!(task.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failure_keeps_previous_state_and_retries_next_tick() {
        let task = Flaky::new("flaky", 1);
        let mut s = Scheduler::new(std::time::Duration::from_secs(60));
        s.add_task(task.clone(), Duration::hours(6));

        let r = s.tick(t0()).await;
        assert_eq!(r.failed, vec!["flaky"]);
        assert_eq!(s.state("flaky"), Some(TaskState::Idle));

        let next = t0() + Duration::minutes(1);
        let r = s.tick(next).await;
        assert_eq!(r.ran, vec!["flaky"]);
        assert_eq!(s.state("flaky"), Some(TaskState::Cooldown { last_run: next }));
    }

    #[tokio::test]
    async fn tasks_run_in_registration_order() {
        let mut s = Scheduler::new(std::time::Duration::from_secs(60));
        s.add_task(Flaky::new("jobs", 0), Duration::hours(6));
        s.add_task(Flaky::new("courses", 0), Duration::hours(6));
        s.add_task(Flaky::new("cleanup", 0), Duration::hours(24));
        let r = s.tick(t0()).await;
        assert_eq!(r.ran, vec!["jobs", "courses", "cleanup"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_flag_is_seen_at_next_tick() {
        let mut s = Scheduler::new(std::time::Duration::from_secs(60));
        let task = Arc::new(Flaky {
            name: "once",
            calls: AtomicUsize::new(0),
            fail_first: 0,
            stop: Some(s.stop_handle()),
        });
        s.add_task(task.clone(), Duration::seconds(1));
        let (handle, stop) = s.spawn();
        handle.await.unwrap();
        assert!(stop.is_stopped());
        assert_eq!(task.calls.load(Ordering::SeqCst), 1);
    }
}
