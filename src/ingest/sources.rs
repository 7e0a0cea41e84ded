//! Declarative source catalog.
//!
//! Every source is one TOML table: its profile fields plus a `kind`
//! (`api`, `feed`, `html`) selecting the fetcher and its endpoint settings.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::ingest::http::HttpClient;
use crate::ingest::providers::{CardSelectors, HtmlFetcher, JsonApiFetcher, Projection, RssFetcher};
use crate::ingest::types::{SourceFetcher, SourceProfile};

pub const ENV_SOURCES_PATH: &str = "INGEST_SOURCES_PATH";
pub const DEFAULT_SOURCES_PATH: &str = "config/sources.toml";

const EMBEDDED_CATALOG: &str = include_str!("../../config/sources.toml");

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceSpec {
    #[serde(flatten)]
    pub profile: SourceProfile,
    #[serde(flatten)]
    pub endpoint: Endpoint,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Endpoint {
    Api {
        url: String,
        #[serde(default)]
        params: BTreeMap<String, String>,
        #[serde(default)]
        list_key: Option<String>,
        /// Canonical field → JSON pointer.
        #[serde(default)]
        fields: BTreeMap<String, String>,
        #[serde(default)]
        link_template: Option<String>,
    },
    Feed {
        urls: Vec<String>,
    },
    Html {
        url: String,
        card: String,
        title: String,
        link: String,
        #[serde(default)]
        description: Option<String>,
    },
}

impl Endpoint {
    pub fn kind(&self) -> &'static str {
        match self {
            Endpoint::Api { .. } => "api",
            Endpoint::Feed { .. } => "feed",
            Endpoint::Html { .. } => "html",
        }
    }
}

/// Job and course sources, in the order they are fetched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SourceCatalog {
    #[serde(default)]
    pub jobs: Vec<SourceSpec>,
    #[serde(default)]
    pub courses: Vec<SourceSpec>,
}

impl SourceCatalog {
    pub fn parse(s: &str) -> Result<Self> {
        let catalog: SourceCatalog = toml::from_str(s).context("parsing source catalog")?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading source catalog from {}", path.display()))?;
        Self::parse(&content)
    }

    /// 1) $INGEST_SOURCES_PATH
    /// 2) config/sources.toml
    /// 3) built-in catalog
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_SOURCES_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            } else {
                return Err(anyhow!("{ENV_SOURCES_PATH} points to non-existent path"));
            }
        }
        let p = PathBuf::from(DEFAULT_SOURCES_PATH);
        if p.exists() {
            return Self::load_from(&p);
        }
        Self::builtin()
    }

    pub fn builtin() -> Result<Self> {
        Self::parse(EMBEDDED_CATALOG)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for spec in self.jobs.iter().chain(&self.courses) {
            let name = spec.profile.name.trim();
            if name.is_empty() {
                return Err(anyhow!("source with empty name"));
            }
            if !seen.insert(name.to_string()) {
                return Err(anyhow!("duplicate source name {name:?}"));
            }
        }
        Ok(())
    }
}

/// Instantiate fetchers for every enabled spec, in catalog order.
pub fn build_fetchers(
    specs: &[SourceSpec],
    http: &HttpClient,
    disabled: &[String],
) -> Result<Vec<Arc<dyn SourceFetcher>>> {
    let mut out: Vec<Arc<dyn SourceFetcher>> = Vec::with_capacity(specs.len());
    for spec in specs {
        let name = &spec.profile.name;
        if disabled.iter().any(|d| d.eq_ignore_ascii_case(name)) {
            tracing::info!(target: "ingest", source = %name, "source disabled by config");
            continue;
        }
        let profile = spec.profile.clone();
        let fetcher: Arc<dyn SourceFetcher> = match &spec.endpoint {
            Endpoint::Api {
                url,
                params,
                list_key,
                fields,
                link_template,
            } => Arc::new(JsonApiFetcher::new(
                profile,
                url.clone(),
                params.clone(),
                list_key.clone(),
                Projection {
                    fields: fields.clone(),
                    link_template: link_template.clone(),
                },
                http.clone(),
            )),
            Endpoint::Feed { urls } => Arc::new(RssFetcher::new(profile, urls.clone(), http.clone())),
            Endpoint::Html {
                url,
                card,
                title,
                link,
                description,
            } => Arc::new(
                HtmlFetcher::new(
                    profile,
                    url,
                    CardSelectors {
                        card: card.clone(),
                        title: title.clone(),
                        link: link.clone(),
                        description: description.clone(),
                    },
                    http.clone(),
                )
                .with_context(|| format!("building html source {name:?}"))?,
            ),
        };
        out.push(fetcher);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_parses() {
        let c = SourceCatalog::builtin().unwrap();
        assert_eq!(c.jobs.len(), 11);
        assert_eq!(c.courses.len(), 4);

        let indeed = c.jobs.iter().find(|s| s.profile.name == "indeed").unwrap();
        assert!(indeed.profile.split_title_location);
        assert!(matches!(&indeed.endpoint, Endpoint::Feed { urls } if urls.len() == 4));

        let fja = c.jobs.iter().find(|s| s.profile.name == "freejobalert").unwrap();
        assert_eq!(fja.endpoint.kind(), "html");

        let coursera = c.courses.iter().find(|s| s.profile.name == "coursera").unwrap();
        match &coursera.endpoint {
            Endpoint::Api {
                list_key,
                link_template,
                ..
            } => {
                assert_eq!(list_key.as_deref(), Some("elements"));
                assert!(link_template.as_deref().unwrap().contains("{slug}"));
            }
            other => panic!("unexpected endpoint {other:?}"),
        }
    }

    #[test]
    fn duplicate_names_rejected() {
        let toml = r#"
            [[jobs]]
            name = "a"
            kind = "feed"
            urls = ["https://a.test/rss"]

            [[courses]]
            name = "a"
            kind = "feed"
            urls = ["https://b.test/rss"]
        "#;
        assert!(SourceCatalog::parse(toml).is_err());
    }

    #[test]
    fn disabled_sources_are_skipped() {
        let c = SourceCatalog::builtin().unwrap();
        let http = HttpClient::new("test", Default::default(), 2).unwrap();
        let all = build_fetchers(&c.jobs, &http, &[]).unwrap();
        let some = build_fetchers(&c.jobs, &http, &["Indeed".to_string()]).unwrap();
        assert_eq!(all.len(), 11);
        assert_eq!(some.len(), 10);
        assert!(some.iter().all(|f| f.name() != "indeed"));
    }
}
