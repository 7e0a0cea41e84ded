//! Raw record → canonical [`Job`] / [`Course`].
//!
//! Each [`RawRecord`] variant has its own mapping into an intermediate field
//! set; the shared builder then applies profile overrides, inference rules
//! and cleaning. Fallback key chains for API records follow the schema
//! variance seen across sources.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};
use url::Url;

use crate::ingest::types::{ApiRecord, FeedEntry, RawRecord, ScrapedRecord, SourceProfile};
use crate::listing::{expiry_for, Course, Difficulty, Job, JobType};

pub const DESCRIPTION_MAX_CHARS: usize = 500;
pub const MAX_TAGS: usize = 10;

const JOB_TITLE_KEYS: &[&str] = &["title", "job_title", "position"];
const JOB_COMPANY_KEYS: &[&str] = &["company", "company_name", "employer"];
const JOB_LOCATION_KEYS: &[&str] = &["location", "job_location"];
const JOB_DESCRIPTION_KEYS: &[&str] = &["description", "job_description"];
const JOB_URL_KEYS: &[&str] = &["url", "link", "apply_url"];
const JOB_SALARY_KEYS: &[&str] = &["salary", "salary_range"];
const JOB_TAG_KEYS: &[&str] = &["tags", "skills"];
const JOB_POSTED_KEYS: &[&str] = &["posted_at", "publication_date", "created_at", "posted_date"];

const COURSE_TITLE_KEYS: &[&str] = &["title", "name"];
const COURSE_PLATFORM_KEYS: &[&str] = &["platform"];
const COURSE_INSTRUCTOR_KEYS: &[&str] = &["instructor", "author", "instructors"];
const COURSE_DESCRIPTION_KEYS: &[&str] = &["description", "summary", "short_description"];
const COURSE_URL_KEYS: &[&str] = &["url", "link", "marketing_url"];
const COURSE_DIFFICULTY_KEYS: &[&str] = &["difficulty", "level", "level_type"];
const COURSE_DURATION_KEYS: &[&str] = &["duration", "length", "workload"];
const COURSE_THUMBNAIL_KEYS: &[&str] = &["thumbnail", "image", "photoUrl"];

const REMOTE_TERMS: &[&str] = &["remote", "work from home", "wfh", "anywhere"];
const GOVERNMENT_SOURCE_HINTS: &[&str] = &["sarkari", "govt", "government"];
const IT_KEYWORDS: &[&str] = &[
    "software",
    "developer",
    "engineer",
    "programmer",
    "python",
    "java",
    "devops",
    "data",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("record has no url")]
    MissingUrl,
    #[error("url is not absolute http(s): {0}")]
    InvalidUrl(String),
}

/// Decode entities, drop tags, collapse whitespace, trim.
pub fn clean_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max).collect::<String>().trim_end().to_string()
    } else {
        s.to_string()
    }
}

fn clean_opt(s: Option<String>) -> Option<String> {
    s.map(|v| clean_text(&v)).filter(|v| !v.is_empty())
}

pub fn determine_job_type(title: &str, description: &str, location: &str) -> JobType {
    let text = format!("{title} {description} {location}").to_lowercase();
    if REMOTE_TERMS.iter().any(|t| text.contains(t)) {
        JobType::Remote
    } else if text.contains("hybrid") {
        JobType::Hybrid
    } else {
        JobType::Onsite
    }
}

pub fn determine_job_category(title: &str, description: &str, source: &str) -> &'static str {
    let source = source.to_lowercase();
    if GOVERNMENT_SOURCE_HINTS.iter().any(|h| source.contains(h)) {
        return "government";
    }
    let text = format!("{title} {description}").to_lowercase();
    if text.contains("intern") {
        return "internship";
    }
    if IT_KEYWORDS.iter().any(|k| text.contains(k)) {
        return "IT";
    }
    "general"
}

/// Ordered substring rules checked against an explicit raw category.
const RAW_COURSE_CATEGORIES: &[(&str, &[&str])] = &[
    ("python", &["python"]),
    ("cybersecurity", &["security", "cyber"]),
    ("ai", &["ai", "machine learning"]),
    ("web_development", &["web"]),
];

/// Ordered substring rules checked against title and description.
const TEXT_COURSE_CATEGORIES: &[(&str, &[&str])] = &[
    ("python", &["python"]),
    ("cybersecurity", &["security", "hacking", "cyber"]),
    ("ai", &["ai", "machine learning", "ml"]),
    ("web_development", &["web development", "html", "css", "javascript"]),
    ("cloud", &["cloud", "aws", "azure", "devops"]),
    ("data_science", &["data science", "data analysis"]),
    ("mobile", &["mobile", "android", "ios", "flutter"]),
];

fn match_course_category(
    table: &[(&'static str, &[&str])],
    text: &str,
) -> Option<&'static str> {
    let text = text.to_lowercase();
    table
        .iter()
        .find(|(_, terms)| terms.iter().any(|t| text.contains(t)))
        .map(|(cat, _)| *cat)
}

pub fn determine_course_category(
    title: &str,
    description: &str,
    raw_category: Option<&str>,
) -> &'static str {
    raw_category
        .and_then(|raw| match_course_category(RAW_COURSE_CATEGORIES, raw))
        .or_else(|| {
            match_course_category(TEXT_COURSE_CATEGORIES, &format!("{title} {description}"))
        })
        .unwrap_or("general")
}

pub fn determine_difficulty(raw: Option<&str>) -> Difficulty {
    let Some(raw) = raw else {
        return Difficulty::Beginner;
    };
    let r = raw.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| r.contains(w));
    if has(&["beginner", "intro", "basic"]) {
        Difficulty::Beginner
    } else if has(&["advanced", "expert"]) {
        Difficulty::Advanced
    } else if has(&["intermediate", "medium"]) {
        Difficulty::Intermediate
    } else {
        Difficulty::Beginner
    }
}

/// Parse and clamp to `[0.0, 5.0]`; anything unparsable is `None`.
pub fn parse_rating(raw: Option<&str>) -> Option<f32> {
    let v = raw?.trim().parse::<f32>().ok()?;
    if v.is_finite() {
        Some(v.clamp(0.0, 5.0))
    } else {
        None
    }
}

pub fn extract_tags(raw: Option<&serde_json::Value>) -> Vec<String> {
    use serde_json::Value;
    let items: Vec<String> = match raw {
        Some(Value::Array(a)) => a
            .iter()
            .filter_map(crate::ingest::types::value_text)
            .collect(),
        Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };
    items
        .iter()
        .map(|t| clean_text(t))
        .filter(|t| !t.is_empty())
        .take(MAX_TAGS)
        .collect()
}

/// Best-effort timestamp parsing: RFC 3339, RFC 2822, common naive
/// formats, and unix seconds.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc2822) {
        return Utc.timestamp_opt(dt.unix_timestamp(), 0).single();
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(n) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&n));
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
    }
    if let Ok(secs) = s.parse::<i64>() {
        return Utc.timestamp_opt(secs, 0).single();
    }
    None
}

fn absolute_url(raw: Option<String>) -> Result<String, NormalizeError> {
    let raw = raw.map(|u| u.trim().to_string()).unwrap_or_default();
    if raw.is_empty() {
        return Err(NormalizeError::MissingUrl);
    }
    match Url::parse(&raw) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => Ok(raw),
        _ => Err(NormalizeError::InvalidUrl(raw)),
    }
}

#[derive(Debug, Default)]
struct JobFields {
    title: Option<String>,
    company: Option<String>,
    location: Option<String>,
    description: Option<String>,
    url: Option<String>,
    salary: Option<String>,
    tags: Vec<String>,
    posted: Option<String>,
}

impl JobFields {
    fn from_api(r: &ApiRecord) -> Self {
        Self {
            title: r.first_text(JOB_TITLE_KEYS),
            company: r.first_text(JOB_COMPANY_KEYS),
            location: r.first_text(JOB_LOCATION_KEYS),
            description: r.first_text(JOB_DESCRIPTION_KEYS),
            url: r.first_text(JOB_URL_KEYS),
            salary: r.first_text(JOB_SALARY_KEYS),
            tags: extract_tags(r.first_value(JOB_TAG_KEYS)),
            posted: r.first_text(JOB_POSTED_KEYS),
        }
    }

    fn from_feed(e: &FeedEntry, profile: &SourceProfile) -> Self {
        let mut title = e.title.clone();
        let mut location = None;
        if profile.split_title_location {
            if let Some(t) = e.title.as_deref() {
                let mut parts = t.split(" - ");
                title = parts.next().map(str::to_string);
                location = parts.next().map(str::to_string);
            }
        }
        Self {
            title,
            company: e.author.clone(),
            location,
            description: e.summary.clone(),
            url: e.link.clone(),
            posted: e.published.clone(),
            ..Self::default()
        }
    }

    fn from_scraped(s: &ScrapedRecord) -> Self {
        Self {
            title: Some(s.title.clone()),
            description: s.description.clone(),
            url: Some(s.link.clone()),
            ..Self::default()
        }
    }
}

/// Map one raw record from `profile`'s source into a [`Job`] fetched at `now`.
pub fn normalize_job(
    record: &RawRecord,
    profile: &SourceProfile,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<Job, NormalizeError> {
    let f = match record {
        RawRecord::Api(r) => JobFields::from_api(r),
        RawRecord::Feed(e) => JobFields::from_feed(e, profile),
        RawRecord::Scraped(s) => JobFields::from_scraped(s),
    };

    let url = absolute_url(f.url)?;
    let title = clean_opt(f.title).unwrap_or_else(|| "Untitled".to_string());
    let company = clean_opt(profile.company.clone().or(f.company))
        .unwrap_or_else(|| "Unknown".to_string());
    let location = clean_opt(profile.location.clone().or(f.location))
        .unwrap_or_else(|| "Not specified".to_string());
    let description_full = clean_opt(f.description).unwrap_or_default();

    let job_type = determine_job_type(&title, &description_full, &location);
    let category = profile.category.clone().unwrap_or_else(|| {
        determine_job_category(&title, &description_full, &profile.name).to_string()
    });

    Ok(Job {
        title,
        company,
        location,
        job_type,
        category,
        salary: clean_opt(f.salary),
        description: truncate_chars(&description_full, DESCRIPTION_MAX_CHARS),
        url,
        source: profile.name.clone(),
        tags: f.tags,
        country: profile.country.clone(),
        posted_at: f.posted.as_deref().and_then(parse_date),
        fetched_at: now,
        expires_at: expiry_for(now, ttl),
        content_hash: String::new(),
    })
}

#[derive(Debug, Default)]
struct CourseFields {
    title: Option<String>,
    platform: Option<String>,
    instructor: Option<String>,
    description: Option<String>,
    url: Option<String>,
    difficulty: Option<String>,
    category: Option<String>,
    duration: Option<String>,
    thumbnail: Option<String>,
    rating: Option<String>,
    language: Option<String>,
}

impl CourseFields {
    fn from_api(r: &ApiRecord) -> Self {
        Self {
            title: r.first_text(COURSE_TITLE_KEYS),
            platform: r.first_text(COURSE_PLATFORM_KEYS),
            instructor: r.first_text(COURSE_INSTRUCTOR_KEYS),
            description: r.first_text(COURSE_DESCRIPTION_KEYS),
            url: r.first_text(COURSE_URL_KEYS),
            difficulty: r.first_text(COURSE_DIFFICULTY_KEYS),
            category: r.first_text(&["category"]),
            duration: r.first_text(COURSE_DURATION_KEYS),
            thumbnail: r.first_text(COURSE_THUMBNAIL_KEYS),
            rating: r.first_text(&["rating"]),
            language: r.first_text(&["language"]),
        }
    }

    fn from_feed(e: &FeedEntry) -> Self {
        Self {
            title: e.title.clone(),
            instructor: e.author.clone(),
            description: e.summary.clone(),
            url: e.link.clone(),
            ..Self::default()
        }
    }

    fn from_scraped(s: &ScrapedRecord) -> Self {
        Self {
            title: Some(s.title.clone()),
            description: s.description.clone(),
            url: Some(s.link.clone()),
            ..Self::default()
        }
    }
}

/// Map one raw record from `profile`'s source into a [`Course`] fetched at `now`.
pub fn normalize_course(
    record: &RawRecord,
    profile: &SourceProfile,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<Course, NormalizeError> {
    let f = match record {
        RawRecord::Api(r) => CourseFields::from_api(r),
        RawRecord::Feed(e) => CourseFields::from_feed(e),
        RawRecord::Scraped(s) => CourseFields::from_scraped(s),
    };

    let url = absolute_url(f.url)?;
    let title = clean_opt(f.title).unwrap_or_else(|| "Untitled Course".to_string());
    let platform = clean_opt(profile.platform.clone().or(f.platform))
        .unwrap_or_else(|| profile.name.clone())
        .to_lowercase();
    let description_full = clean_opt(f.description).unwrap_or_default();
    let category = match &profile.category {
        Some(c) => c.clone(),
        None => {
            determine_course_category(&title, &description_full, f.category.as_deref()).to_string()
        }
    };

    Ok(Course {
        title,
        platform,
        instructor: clean_opt(f.instructor.or_else(|| profile.instructor.clone())),
        difficulty: determine_difficulty(f.difficulty.as_deref()),
        duration: clean_opt(f.duration),
        category,
        description: truncate_chars(&description_full, DESCRIPTION_MAX_CHARS),
        url,
        thumbnail: f.thumbnail.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
        rating: parse_rating(f.rating.as_deref()),
        language: clean_opt(f.language).unwrap_or_else(|| "en".to_string()),
        source: profile.name.clone(),
        fetched_at: now,
        expires_at: expiry_for(now, ttl),
        content_hash: String::new(),
    })
}
