// tests/ingest_normalize.rs
use chrono::{Duration, Utc};
use serde_json::json;

use listing_ingest::ingest::dedup::dedup;
use listing_ingest::ingest::normalize::{normalize_course, normalize_job, DESCRIPTION_MAX_CHARS};
use listing_ingest::ingest::types::{ApiRecord, RawRecord, SourceProfile};
use listing_ingest::listing::{content_hash, Difficulty, JobType};
use listing_ingest::Listing;

fn api(v: serde_json::Value) -> RawRecord {
    RawRecord::Api(ApiRecord::new(v.as_object().cloned().unwrap()))
}

#[test]
fn remote_python_developer_is_remote_it() {
    let rec = api(json!({
        "title": "Python Developer",
        "description": "work from home",
        "company": "Acme",
        "url": "https://acme.test/jobs/py"
    }));
    let job = normalize_job(
        &rec,
        &SourceProfile::named("remotive"),
        Utc::now(),
        Duration::hours(24),
    )
    .unwrap();
    assert_eq!(job.job_type, JobType::Remote);
    assert_eq!(job.category, "IT");
    assert_eq!(job.location, "Not specified");
}

#[test]
fn course_rating_above_five_is_clamped() {
    let rec = api(json!({
        "title": "Intro to Rust",
        "platform": "Udemy",
        "url": "https://courses.test/rust",
        "rating": "7.8",
        "level": "Intermediate Level"
    }));
    let c = normalize_course(
        &rec,
        &SourceProfile::named("udemy"),
        Utc::now(),
        Duration::hours(48),
    )
    .unwrap();
    assert_eq!(c.rating, Some(5.0));
    assert_eq!(c.platform, "udemy");
    assert_eq!(c.difficulty, Difficulty::Intermediate);
}

#[test]
fn numeric_rating_and_nested_fallbacks() {
    let rec = api(json!({
        "name": "Cloud Practitioner",
        "marketing_url": "https://www.edx.org/course/cloud",
        "short_description": "AWS basics",
        "level_type": "Advanced",
        "rating": 4.6,
        "image": {"src": "ignored-object"},
        "language": "es"
    }));
    let c = normalize_course(
        &rec,
        &SourceProfile::named("edx"),
        Utc::now(),
        Duration::hours(48),
    )
    .unwrap();
    assert_eq!(c.title, "Cloud Practitioner");
    assert_eq!(c.url, "https://www.edx.org/course/cloud");
    assert_eq!(c.category, "cloud");
    assert_eq!(c.difficulty, Difficulty::Advanced);
    assert_eq!(c.language, "es");
    assert_eq!(c.platform, "edx");
    assert_eq!(c.thumbnail, None);
    assert!((c.rating.unwrap() - 4.6).abs() < 1e-6);
}

#[test]
fn long_descriptions_are_cut() {
    let rec = api(json!({
        "title": "Data Engineer",
        "url": "https://x.test/de",
        "description": format!("<p>{}</p>", "word ".repeat(400))
    }));
    let job = normalize_job(&rec, &SourceProfile::named("x"), Utc::now(), Duration::hours(1))
        .unwrap();
    assert!(job.description.chars().count() <= DESCRIPTION_MAX_CHARS);
    assert!(!job.description.contains('<'));
}

#[test]
fn hash_is_deterministic_and_case_insensitive() {
    let a = content_hash("Rust Dev", "Acme", "https://acme.test/1");
    let b = content_hash("  rust dev ", "ACME", "HTTPS://ACME.TEST/1");
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert_ne!(a, content_hash("Rust Dev", "Acme", "https://acme.test/2"));
}

#[test]
fn dedup_keeps_first_normalized_occurrence() {
    let now = Utc::now();
    let mut first = SourceProfile::named("remotive");
    first.company = Some("Acme".into());
    let mut second = SourceProfile::named("arbeitnow");
    second.company = Some("ACME".into());

    let rec = api(json!({"title": "Rust Dev", "url": "https://acme.test/1"}));
    let a = normalize_job(&rec, &first, now, Duration::hours(24)).unwrap();
    let b = normalize_job(&rec, &second, now, Duration::hours(24)).unwrap();

    let (kept, removed) = dedup(vec![a, b]);
    assert_eq!(removed, 1);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].source, "remotive");
    assert_eq!(kept[0].content_hash(), content_hash("Rust Dev", "Acme", "https://acme.test/1"));
}
