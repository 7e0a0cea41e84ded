//! # Canonical listings
//!
//! The two shapes every source is normalized into: [`Job`] and [`Course`].
//! Both carry a content hash that identifies the logical listing across runs
//! and sources; the store keys records by it.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::store::ListingFilter;

/// Which collection a listing belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingKind {
    Job,
    Course,
}

impl ListingKind {
    pub fn collection(self) -> &'static str {
        match self {
            ListingKind::Job => "jobs",
            ListingKind::Course => "courses",
        }
    }
}

impl fmt::Display for ListingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Remote,
    Onsite,
    Hybrid,
}

impl JobType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" => Some(JobType::Remote),
            "onsite" => Some(JobType::Onsite),
            "hybrid" => Some(JobType::Hybrid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Some(Difficulty::Beginner),
            "intermediate" => Some(Difficulty::Intermediate),
            "advanced" => Some(Difficulty::Advanced),
            _ => None,
        }
    }
}

/// A job posting after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub title: String,
    pub company: String,
    pub location: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub category: String,
    pub salary: Option<String>,
    pub description: String,
    pub url: String,
    pub source: String,
    pub tags: Vec<String>,
    pub country: String,
    pub posted_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub content_hash: String,
}

/// A course after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub title: String,
    pub platform: String,
    pub instructor: Option<String>,
    pub difficulty: Difficulty,
    pub duration: Option<String>,
    pub category: String,
    pub description: String,
    pub url: String,
    pub thumbnail: Option<String>,
    pub rating: Option<f32>,
    pub language: String,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub content_hash: String,
}

/// Behaviour shared by [`Job`] and [`Course`] that the dedup and store
/// layers rely on.
pub trait Listing: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    const KIND: ListingKind;

    fn title(&self) -> &str;
    /// `company` for jobs, `platform` for courses.
    fn secondary_key(&self) -> &str;
    fn url(&self) -> &str;
    fn source(&self) -> &str;
    fn category(&self) -> &str;
    fn fetched_at(&self) -> DateTime<Utc>;
    fn expires_at(&self) -> DateTime<Utc>;

    /// Empty until [`Listing::seal`] has run.
    fn content_hash(&self) -> &str;
    #[doc(hidden)]
    fn hash_slot(&mut self) -> &mut String;

    fn matches(&self, filter: &ListingFilter) -> bool;

    /// Compute and store the content hash. A hash that is already set is
    /// never recomputed.
    fn seal(&mut self) -> &str {
        if self.content_hash().is_empty() {
            let h = content_hash(self.title(), self.secondary_key(), self.url());
            *self.hash_slot() = h;
        }
        self.content_hash()
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at() <= now
    }
}

/// Deterministic identity of a listing: SHA-256 over the trimmed,
/// lower-cased `title|secondary|url`, as lowercase hex.
pub fn content_hash(title: &str, secondary: &str, url: &str) -> String {
    let data = format!(
        "{}|{}|{}",
        title.trim().to_lowercase(),
        secondary.trim().to_lowercase(),
        url.trim().to_lowercase()
    );
    let digest = Sha256::digest(data.as_bytes());
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// `fetched_at + ttl`, never equal to `fetched_at`.
pub fn expiry_for(fetched_at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let ttl = if ttl <= Duration::zero() {
        Duration::seconds(1)
    } else {
        ttl
    };
    fetched_at + ttl
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn eq_ci(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

impl Listing for Job {
    const KIND: ListingKind = ListingKind::Job;

    fn title(&self) -> &str {
        &self.title
    }
    fn secondary_key(&self) -> &str {
        &self.company
    }
    fn url(&self) -> &str {
        &self.url
    }
    fn source(&self) -> &str {
        &self.source
    }
    fn category(&self) -> &str {
        &self.category
    }
    fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
    fn content_hash(&self) -> &str {
        &self.content_hash
    }
    fn hash_slot(&mut self) -> &mut String {
        &mut self.content_hash
    }

    fn matches(&self, filter: &ListingFilter) -> bool {
        if let Some(c) = &filter.category {
            if !eq_ci(&self.category, c) {
                return false;
            }
        }
        if let Some(t) = filter.job_type {
            if self.job_type != t {
                return false;
            }
        }
        if let Some(c) = &filter.country {
            if !eq_ci(&self.country, c) {
                return false;
            }
        }
        if let Some(q) = filter.text_lower() {
            let hit = contains_ci(&self.title, &q)
                || contains_ci(&self.company, &q)
                || contains_ci(&self.description, &q)
                || self.tags.iter().any(|t| contains_ci(t, &q));
            if !hit {
                return false;
            }
        }
        true
    }
}

impl Listing for Course {
    const KIND: ListingKind = ListingKind::Course;

    fn title(&self) -> &str {
        &self.title
    }
    fn secondary_key(&self) -> &str {
        &self.platform
    }
    fn url(&self) -> &str {
        &self.url
    }
    fn source(&self) -> &str {
        &self.source
    }
    fn category(&self) -> &str {
        &self.category
    }
    fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
    fn content_hash(&self) -> &str {
        &self.content_hash
    }
    fn hash_slot(&mut self) -> &mut String {
        &mut self.content_hash
    }

    fn matches(&self, filter: &ListingFilter) -> bool {
        if let Some(c) = &filter.category {
            if !eq_ci(&self.category, c) {
                return false;
            }
        }
        if let Some(p) = &filter.platform {
            if !eq_ci(&self.platform, p) {
                return false;
            }
        }
        if let Some(d) = filter.difficulty {
            if self.difficulty != d {
                return false;
            }
        }
        if let Some(l) = &filter.language {
            if !eq_ci(&self.language, l) {
                return false;
            }
        }
        if let Some(q) = filter.text_lower() {
            let hit = contains_ci(&self.title, &q)
                || contains_ci(&self.description, &q)
                || self
                    .instructor
                    .as_deref()
                    .is_some_and(|i| contains_ci(i, &q))
                || contains_ci(&self.platform, &q);
            if !hit {
                return false;
            }
        }
        true
    }
}
