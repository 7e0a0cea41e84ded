// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::http::{RetryPolicy, DEFAULT_USER_AGENT};

pub const ENV_CONFIG_PATH: &str = "INGEST_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/ingest.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub tick_secs: u64,
    /// Delay before the first tick after startup.
    pub start_delay_secs: u64,
    pub job_interval_hours: u64,
    pub course_interval_hours: u64,
    pub cleanup_interval_hours: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick_secs: 60,
            start_delay_secs: 10,
            job_interval_hours: 6,
            course_interval_hours: 6,
            cleanup_interval_hours: 24,
        }
    }
}

impl ScheduleConfig {
    pub fn job_interval(&self) -> chrono::Duration {
        hours(self.job_interval_hours)
    }

    pub fn course_interval(&self) -> chrono::Duration {
        hours(self.course_interval_hours)
    }

    pub fn cleanup_interval(&self) -> chrono::Duration {
        hours(self.cleanup_interval_hours)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    pub job_hours: u64,
    pub course_hours: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            job_hours: 24,
            course_hours: 48,
        }
    }
}

impl TtlConfig {
    pub fn job(&self) -> chrono::Duration {
        hours(self.job_hours)
    }

    pub fn course(&self) -> chrono::Duration {
        hours(self.course_hours)
    }
}

fn hours(h: u64) -> chrono::Duration {
    chrono::Duration::hours(i64::try_from(h).unwrap_or(i64::MAX / 3_600_000))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub timeout_secs: u64,
    pub max_concurrency: usize,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 1_000,
            timeout_secs: 10,
            max_concurrency: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory for `jobs.json` / `courses.json` snapshots. In-memory only
    /// when unset.
    pub snapshot_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub schedule: ScheduleConfig,
    pub ttl: TtlConfig,
    pub http: HttpConfig,
    pub store: StoreConfig,
    pub server: ServerConfig,
    /// Source names skipped when building fetchers (case-insensitive).
    pub disabled_sources: Vec<String>,
}

impl IngestConfig {
    pub fn parse(s: &str) -> Result<Self> {
        let mut cfg: IngestConfig = toml::from_str(s).context("parsing ingest config")?;
        cfg.disabled_sources = clean_list(cfg.disabled_sources);
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load config from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading ingest config from {}", path.display()))?;
        Self::parse(&content)
    }

    /// Load config using env var + fallbacks:
    /// 1) $INGEST_CONFIG_PATH
    /// 2) config/ingest.toml
    /// 3) defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            } else {
                return Err(anyhow!("INGEST_CONFIG_PATH points to non-existent path"));
            }
        }
        let toml_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        Ok(Self::default())
    }

    fn validate(&self) -> Result<()> {
        if self.schedule.tick_secs == 0 {
            return Err(anyhow!("schedule.tick_secs must be > 0"));
        }
        if self.http.timeout_secs == 0 {
            return Err(anyhow!("http.timeout_secs must be > 0"));
        }
        if self.ttl.job_hours == 0 || self.ttl.course_hours == 0 {
            return Err(anyhow!("ttl hours must be > 0"));
        }
        Ok(())
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    use std::collections::BTreeSet;
    let mut set = BTreeSet::new();
    for it in items {
        let t = it.trim();
        if !t.is_empty() {
            set.insert(t.to_string());
        }
    }
    set.into_iter().collect()
}
