// tests/providers_http.rs
//
// Fetchers against a local mock HTTP server.

use std::collections::BTreeMap;
use std::time::Duration;

use listing_ingest::ingest::http::{HttpClient, RetryPolicy};
use listing_ingest::ingest::providers::{
    CardSelectors, HtmlFetcher, JsonApiFetcher, Projection, RssFetcher,
};
use listing_ingest::ingest::types::{FetchError, RawRecord, SourceFetcher, SourceProfile};
use mockito::Matcher;

const REMOTIVE: &str = include_str!("fixtures/remotive.json");
const JOBS_RSS: &str = include_str!("fixtures/jobs_rss.xml");
const COURSES_ATOM: &str = include_str!("fixtures/courses_atom.xml");
const FREEJOBALERT: &str = include_str!("fixtures/freejobalert.html");

fn fast_client() -> HttpClient {
    HttpClient::new(
        "listing-ingest-tests",
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(5),
            timeout: Duration::from_secs(2),
        },
        5,
    )
    .unwrap()
}

#[tokio::test]
async fn json_api_extracts_list_and_honours_limit() {
    let mut server = mockito::Server::new_async().await;
    let m = server
        .mock("GET", "/api/remote-jobs")
        .match_query(Matcher::UrlEncoded("limit".into(), "50".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(REMOTIVE)
        .expect(1)
        .create_async()
        .await;

    let mut profile = SourceProfile::named("remotive");
    profile.limit = Some(2);
    let f = JsonApiFetcher::new(
        profile,
        format!("{}/api/remote-jobs", server.url()),
        BTreeMap::from([("limit".to_string(), "50".to_string())]),
        Some("jobs".into()),
        Projection::default(),
        fast_client(),
    );

    let recs = f.fetch().await.unwrap();
    m.assert_async().await;
    assert_eq!(recs.len(), 2);
    match &recs[0] {
        RawRecord::Api(r) => {
            assert_eq!(
                r.first_text(&["company", "company_name"]).as_deref(),
                Some("Ferrous Labs")
            );
        }
        other => panic!("unexpected record {other:?}"),
    }
}

#[tokio::test]
async fn malformed_body_is_not_retried_and_yields_nothing() {
    let mut server = mockito::Server::new_async().await;
    let m = server
        .mock("GET", "/broken")
        .with_status(200)
        .with_body("<html>maintenance</html>")
        .expect(1)
        .create_async()
        .await;

    let f = JsonApiFetcher::new(
        SourceProfile::named("arbeitnow"),
        format!("{}/broken", server.url()),
        BTreeMap::new(),
        Some("data".into()),
        Projection::default(),
        fast_client(),
    );
    let recs = f.fetch().await.unwrap();
    assert!(recs.is_empty());
    m.assert_async().await;
}

#[tokio::test]
async fn non_200_is_retried_until_exhausted() {
    let mut server = mockito::Server::new_async().await;
    let m = server
        .mock("GET", "/feed")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let f = RssFetcher::new(
        SourceProfile::named("sarkari_exam"),
        vec![format!("{}/feed", server.url())],
        fast_client(),
    );
    let err = f.fetch().await.unwrap_err();
    m.assert_async().await;
    match err {
        FetchError::Exhausted {
            attempts, reason, ..
        } => {
            assert_eq!(attempts, 3);
            assert!(reason.contains("503"), "reason was {reason}");
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test]
async fn multi_url_feed_survives_one_bad_url() {
    let mut server = mockito::Server::new_async().await;
    let _a = server
        .mock("GET", "/rss/a")
        .with_status(200)
        .with_body(JOBS_RSS)
        .create_async()
        .await;
    let _b = server
        .mock("GET", "/rss/b")
        .with_status(404)
        .expect(3)
        .create_async()
        .await;

    let mut profile = SourceProfile::named("indeed");
    profile.limit = Some(2);
    profile.split_title_location = true;
    let f = RssFetcher::new(
        profile,
        vec![
            format!("{}/rss/a", server.url()),
            format!("{}/rss/b", server.url()),
        ],
        fast_client(),
    );
    let recs = f.fetch().await.unwrap();
    assert_eq!(recs.len(), 2);
}

#[tokio::test]
async fn atom_feed_with_keyword_filter() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/news/rss/")
        .with_status(200)
        .with_header("content-type", "application/atom+xml")
        .with_body(COURSES_ATOM)
        .create_async()
        .await;

    let mut profile = SourceProfile::named("freecodecamp");
    profile.title_keywords = vec!["course".into(), "tutorial".into(), "learn".into()];
    let f = RssFetcher::new(profile, vec![format!("{}/news/rss/", server.url())], fast_client());
    let recs = f.fetch().await.unwrap();
    assert_eq!(recs.len(), 1);
    match &recs[0] {
        RawRecord::Feed(e) => {
            assert_eq!(
                e.link.as_deref(),
                Some("https://news.example.org/docker-k8s-course")
            );
            assert_eq!(e.author.as_deref(), Some("Jane Doe"));
        }
        other => panic!("unexpected record {other:?}"),
    }
}

#[tokio::test]
async fn html_cards_resolve_relative_links() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/government-jobs/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(FREEJOBALERT)
        .create_async()
        .await;

    let f = HtmlFetcher::new(
        SourceProfile::named("freejobalert"),
        &format!("{}/government-jobs/", server.url()),
        CardSelectors {
            card: ".job-card, .job-listing, article".into(),
            title: "h2, h3, .job-title, a".into(),
            link: "a".into(),
            description: Some("p, .description, .summary".into()),
        },
        fast_client(),
    )
    .unwrap();

    let recs = f.fetch().await.unwrap();
    assert_eq!(recs.len(), 2);
    match &recs[0] {
        RawRecord::Scraped(s) => {
            assert_eq!(s.title, "UPSC Civil Services 2025");
            assert_eq!(
                s.link,
                format!("{}/upsc-civil-services-2025/", server.url())
            );
            assert!(s.description.as_deref().unwrap().contains("979 posts"));
        }
        other => panic!("unexpected record {other:?}"),
    }
}
