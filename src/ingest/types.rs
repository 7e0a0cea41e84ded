// src/ingest/types.rs
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON object as returned by an API source, after per-source field
/// projection. Keys are looked up by the normalizer's fallback chains.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiRecord {
    pub fields: Map<String, Value>,
}

impl ApiRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// First key in `keys` holding a non-empty scalar, rendered as text.
    pub fn first_text(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|k| self.fields.get(*k))
            .find_map(value_text)
    }

    /// First key in `keys` whose value is present and not null.
    pub fn first_value(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .filter_map(|k| self.fields.get(*k))
            .find(|v| !v.is_null())
    }
}

/// Scalar → text. Arrays of strings are joined with ", ".
pub fn value_text(v: &Value) -> Option<String> {
    let s = match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(|i| i.as_str())
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null | Value::Object(_) => return None,
    };
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// One RSS item or Atom entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub link: Option<String>,
    pub published: Option<String>,
    pub author: Option<String>,
}

/// One card scraped from a static HTML listing page. `link` is absolute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedRecord {
    pub title: String,
    pub link: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    Api(ApiRecord),
    Feed(FeedEntry),
    Scraped(ScrapedRecord),
}

impl RawRecord {
    pub fn variant(&self) -> &'static str {
        match self {
            RawRecord::Api(_) => "api",
            RawRecord::Feed(_) => "feed",
            RawRecord::Scraped(_) => "html",
        }
    }
}

fn default_country() -> String {
    "global".to_string()
}

/// Per-source metadata: identity, normalization overrides and content filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceProfile {
    pub name: String,
    #[serde(default = "default_country")]
    pub country: String,
    /// Forced company (jobs). Overrides anything in the record.
    #[serde(default)]
    pub company: Option<String>,
    /// Forced location (jobs).
    #[serde(default)]
    pub location: Option<String>,
    /// Forced category. Overrides inference.
    #[serde(default)]
    pub category: Option<String>,
    /// Forced platform (courses).
    #[serde(default)]
    pub platform: Option<String>,
    /// Instructor used when the record has none (courses).
    #[serde(default)]
    pub instructor: Option<String>,
    /// Keep only entries whose title contains one of these (case-insensitive).
    #[serde(default)]
    pub title_keywords: Vec<String>,
    /// Feed titles shaped "Title - Location".
    #[serde(default)]
    pub split_title_location: bool,
    /// Max records per request.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SourceProfile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            country: default_country(),
            company: None,
            location: None,
            category: None,
            platform: None,
            instructor: None,
            title_keywords: Vec::new(),
            split_title_location: false,
            limit: None,
        }
    }

    pub fn title_passes(&self, title: &str) -> bool {
        if self.title_keywords.is_empty() {
            return true;
        }
        let t = title.to_lowercase();
        self.title_keywords
            .iter()
            .any(|k| t.contains(&k.to_lowercase()))
    }
}

/// A raw record together with the profile of the source that produced it.
#[derive(Debug, Clone)]
pub struct SourcedRecord {
    pub profile: Arc<SourceProfile>,
    pub record: RawRecord,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{url}: gave up after {attempts} attempts: {reason}")]
    Exhausted {
        url: String,
        attempts: u32,
        reason: String,
    },
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("source misconfigured: {0}")]
    Config(String),
}

#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Raw records from this source, filtered by its profile.
    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError>;

    fn profile(&self) -> &Arc<SourceProfile>;

    fn name(&self) -> &str {
        &self.profile().name
    }
}
