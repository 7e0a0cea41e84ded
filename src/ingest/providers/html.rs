use std::sync::Arc;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::ingest::http::HttpClient;
use crate::ingest::types::{FetchError, RawRecord, ScrapedRecord, SourceFetcher, SourceProfile};

/// CSS selectors locating listing cards on a static page and the fields
/// inside each card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardSelectors {
    pub card: String,
    pub title: String,
    pub link: String,
    pub description: Option<String>,
}

struct Compiled {
    card: Selector,
    title: Selector,
    link: Selector,
    description: Option<Selector>,
}

fn compile(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::Config(format!("selector {css:?}: {e}")))
}

impl CardSelectors {
    fn compile(&self) -> Result<Compiled, FetchError> {
        Ok(Compiled {
            card: compile(&self.card)?,
            title: compile(&self.title)?,
            link: compile(&self.link)?,
            description: self.description.as_deref().map(compile).transpose()?,
        })
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").trim().to_string()
}

/// Extract cards from `html`. Relative links resolve against `page_url`;
/// cards without a title or a usable link are skipped.
pub fn scrape_cards(
    html: &str,
    page_url: &Url,
    selectors: &CardSelectors,
    limit: Option<usize>,
) -> Result<Vec<ScrapedRecord>, FetchError> {
    let sel = selectors.compile()?;
    let document = Html::parse_document(html);

    let limit = limit.unwrap_or(usize::MAX);
    let mut out = Vec::new();
    for card in document.select(&sel.card) {
        if out.len() >= limit {
            break;
        }
        let Some(title_el) = card.select(&sel.title).next() else {
            continue;
        };
        let Some(link_el) = card.select(&sel.link).next() else {
            continue;
        };
        let title = element_text(title_el);
        let href = link_el.value().attr("href").unwrap_or_default().trim();
        if title.is_empty() || href.is_empty() {
            continue;
        }
        let Ok(link) = page_url.join(href) else {
            continue;
        };
        let description = sel
            .description
            .as_ref()
            .and_then(|d| card.select(d).next())
            .map(element_text)
            .filter(|d| !d.is_empty());

        out.push(ScrapedRecord {
            title,
            link: link.to_string(),
            description,
        });
    }
    Ok(out)
}

/// Scraper for static listing pages. Never used for authenticated or
/// script-rendered content.
pub struct HtmlFetcher {
    profile: Arc<SourceProfile>,
    url: Url,
    selectors: CardSelectors,
    http: HttpClient,
}

impl HtmlFetcher {
    /// Fails on an unparsable page URL or selector.
    pub fn new(
        profile: SourceProfile,
        url: &str,
        selectors: CardSelectors,
        http: HttpClient,
    ) -> Result<Self, FetchError> {
        let url = Url::parse(url).map_err(|e| FetchError::Config(format!("url {url:?}: {e}")))?;
        selectors.compile()?;
        Ok(Self {
            profile: Arc::new(profile),
            url,
            selectors,
            http,
        })
    }
}

#[async_trait]
impl SourceFetcher for HtmlFetcher {
    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        let body = self.http.get_text(self.url.as_str(), &[]).await?;
        let cards = scrape_cards(&body, &self.url, &self.selectors, self.profile.limit)?;
        if cards.is_empty() {
            tracing::warn!(target: "ingest", source = %self.profile.name, "no cards matched on page");
        }
        Ok(cards
            .into_iter()
            .filter(|c| self.profile.title_passes(&c.title))
            .map(RawRecord::Scraped)
            .collect())
    }

    fn profile(&self) -> &Arc<SourceProfile> {
        &self.profile
    }
}
