use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::listing::{Course, Difficulty, Job, JobType, Listing};
use crate::store::{ListingFilter, ListingQuery, ListingStore};

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn ListingStore<Job>>,
    pub courses: Arc<dyn ListingStore<Course>>,
}

/// Read-only listing API. `/metrics` is merged in by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/jobs", get(list_jobs))
        .route("/courses", get(list_courses))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

type ApiError = (StatusCode, String);

#[derive(Debug, Deserialize)]
struct JobParams {
    category: Option<String>,
    #[serde(rename = "type")]
    job_type: Option<String>,
    country: Option<String>,
    q: Option<String>,
    page: Option<usize>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct CourseParams {
    category: Option<String>,
    platform: Option<String>,
    difficulty: Option<String>,
    language: Option<String>,
    q: Option<String>,
    page: Option<usize>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub page: usize,
    pub limit: usize,
    pub items: Vec<T>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// 1-based page, default size 10, capped at 50.
fn paging(page: Option<usize>, limit: Option<usize>) -> (usize, usize) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, limit)
}

async fn page_of<T: Listing>(
    store: &dyn ListingStore<T>,
    filter: ListingFilter,
    page: Option<usize>,
    limit: Option<usize>,
) -> Result<Json<Page<T>>, ApiError> {
    let (page, limit) = paging(page, limit);
    let query = ListingQuery {
        filter,
        skip: (page - 1).saturating_mul(limit),
        limit,
        ..ListingQuery::default()
    };
    let items = store.find(&query, Utc::now()).await.map_err(|e| {
        tracing::error!(target: "api", collection = T::KIND.collection(), error = %e, "query failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "store unavailable".to_string())
    })?;
    Ok(Json(Page { page, limit, items }))
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(p): Query<JobParams>,
) -> Result<Json<Page<Job>>, ApiError> {
    let job_type = match non_empty(p.job_type) {
        Some(t) => Some(JobType::parse(&t).ok_or_else(|| {
            (StatusCode::BAD_REQUEST, format!("unknown job type {t:?}"))
        })?),
        None => None,
    };
    let filter = ListingFilter {
        category: non_empty(p.category),
        job_type,
        country: non_empty(p.country),
        text: non_empty(p.q),
        ..ListingFilter::default()
    };
    page_of(state.jobs.as_ref(), filter, p.page, p.limit).await
}

async fn list_courses(
    State(state): State<AppState>,
    Query(p): Query<CourseParams>,
) -> Result<Json<Page<Course>>, ApiError> {
    let difficulty = match non_empty(p.difficulty) {
        Some(d) => Some(Difficulty::parse(&d).ok_or_else(|| {
            (StatusCode::BAD_REQUEST, format!("unknown difficulty {d:?}"))
        })?),
        None => None,
    };
    let filter = ListingFilter {
        category: non_empty(p.category),
        platform: non_empty(p.platform),
        difficulty,
        language: non_empty(p.language),
        text: non_empty(p.q),
        ..ListingFilter::default()
    };
    page_of(state.courses.as_ref(), filter, p.page, p.limit).await
}
