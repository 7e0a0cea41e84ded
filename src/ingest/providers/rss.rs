use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::ingest::http::HttpClient;
use crate::ingest::types::{FeedEntry, FetchError, RawRecord, SourceFetcher, SourceProfile};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    author: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Atom {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<String>,
    #[serde(default)]
    link: Vec<AtomLink>,
    summary: Option<String>,
    content: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    author: Option<AtomAuthor>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    name: Option<String>,
}

impl From<Item> for FeedEntry {
    fn from(it: Item) -> Self {
        FeedEntry {
            title: it.title,
            summary: it.description,
            link: it.link.map(|l| l.trim().to_string()),
            published: it.pub_date,
            author: it.author,
        }
    }
}

impl From<AtomEntry> for FeedEntry {
    fn from(e: AtomEntry) -> Self {
        // Prefer rel="alternate" (or no rel), else whatever link comes first.
        let link = e
            .link
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| e.link.first())
            .and_then(|l| l.href.clone());
        FeedEntry {
            title: e.title,
            summary: e.summary.or(e.content),
            link,
            published: e.published.or(e.updated),
            author: e.author.and_then(|a| a.name),
        }
    }
}

/// Parse an RSS 2.0 or Atom document into feed entries.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>, FetchError> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);

    let entries: Vec<FeedEntry> = match from_str::<Rss>(&xml_clean) {
        Ok(rss) => rss.channel.item.into_iter().map(FeedEntry::from).collect(),
        Err(rss_err) => match from_str::<Atom>(&xml_clean) {
            Ok(atom) => atom.entry.into_iter().map(FeedEntry::from).collect(),
            Err(atom_err) => {
                return Err(FetchError::Decode(format!(
                    "not rss ({rss_err}) nor atom ({atom_err})"
                )))
            }
        },
    };

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("ingest_parse_ms").record(ms);
    Ok(entries)
}

/// Feed fetcher. Several URLs (e.g. one per search query) are fetched
/// concurrently under the client's global ceiling.
pub struct RssFetcher {
    profile: Arc<SourceProfile>,
    urls: Vec<String>,
    http: HttpClient,
}

impl RssFetcher {
    pub fn new(profile: SourceProfile, urls: Vec<String>, http: HttpClient) -> Self {
        Self {
            profile: Arc::new(profile),
            urls,
            http,
        }
    }

    async fn fetch_one(&self, url: &str, bounded: bool) -> Result<Vec<RawRecord>, FetchError> {
        let body = if bounded {
            self.http.get_text_bounded(url, &[]).await?
        } else {
            self.http.get_text(url, &[]).await?
        };
        let entries = match parse_feed(&body) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(target: "ingest", source = %self.profile.name, %url, error = %e, "feed not parseable");
                counter!("ingest_decode_errors_total").increment(1);
                return Ok(Vec::new());
            }
        };
        if entries.is_empty() {
            tracing::warn!(target: "ingest", source = %self.profile.name, %url, "feed has no entries");
        }
        Ok(self.select(entries))
    }

    /// Apply the per-URL limit, then the title keyword filter.
    fn select(&self, entries: Vec<FeedEntry>) -> Vec<RawRecord> {
        let limit = self.profile.limit.unwrap_or(usize::MAX);
        entries
            .into_iter()
            .take(limit)
            .filter(|e| self.profile.title_passes(e.title.as_deref().unwrap_or_default()))
            .map(RawRecord::Feed)
            .collect()
    }
}

#[async_trait]
impl SourceFetcher for RssFetcher {
    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        match self.urls.as_slice() {
            [] => Err(FetchError::Config("feed source has no urls".into())),
            [url] => self.fetch_one(url, false).await,
            urls => {
                let results = join_all(urls.iter().map(|u| self.fetch_one(u, true))).await;
                let mut out = Vec::new();
                let mut last_err = None;
                let mut ok = 0usize;
                for (url, res) in urls.iter().zip(results) {
                    match res {
                        Ok(mut v) => {
                            ok += 1;
                            out.append(&mut v);
                        }
                        Err(e) => {
                            tracing::warn!(target: "ingest", source = %self.profile.name, %url, error = %e, "feed url skipped");
                            last_err = Some(e);
                        }
                    }
                }
                match last_err {
                    Some(e) if ok == 0 => Err(e),
                    _ => Ok(out),
                }
            }
        }
    }

    fn profile(&self) -> &Arc<SourceProfile> {
        &self.profile
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Jobs</title>
    <link>https://jobs.test</link>
    <item>
      <title>Python Developer - Pune</title>
      <link> https://jobs.test/1 </link>
      <pubDate>Tue, 10 Jun 2025 04:00:00 GMT</pubDate>
      <description><![CDATA[<p>Build&nbsp;APIs</p>]]></description>
      <author>Acme</author>
    </item>
    <item>
      <title>Market update</title>
      <link>https://jobs.test/2</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_rss_items() {
        let entries = parse_feed(RSS).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title.as_deref(), Some("Python Developer - Pune"));
        assert_eq!(entries[0].link.as_deref(), Some("https://jobs.test/1"));
        assert_eq!(entries[0].author.as_deref(), Some("Acme"));
        assert!(entries[0].summary.as_deref().unwrap().contains("Build"));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            parse_feed("{ \"not\": \"xml\" }"),
            Err(FetchError::Decode(_))
        ));
    }

    #[test]
    fn limit_applies_before_keyword_filter() {
        let mut profile = SourceProfile::named("hindu");
        profile.limit = Some(1);
        profile.title_keywords = vec!["update".into()];
        let http = HttpClient::new("test", Default::default(), 1).unwrap();
        let f = RssFetcher::new(profile, vec![], http);
        let picked = f.select(parse_feed(RSS).unwrap());
        // only the first entry is considered, and it lacks the keyword
        assert!(picked.is_empty());
    }
}
