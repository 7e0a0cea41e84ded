use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use metrics::{counter, histogram};

use crate::ingest::types::{SourceFetcher, SourcedRecord};

/// Fan-in result of one orchestrator call.
#[derive(Debug, Default)]
pub struct Harvest {
    /// Successful results, concatenated in fetcher order.
    pub records: Vec<SourcedRecord>,
    pub succeeded: Vec<String>,
    /// `(source, error)` for every fetcher that failed.
    pub failed: Vec<(String, String)>,
}

impl Harvest {
    /// True when fetchers were configured and none of them succeeded.
    pub fn all_failed(&self) -> bool {
        self.succeeded.is_empty() && !self.failed.is_empty()
    }
}

/// Run every fetcher concurrently and wait for all of them. A failure is
/// logged by source name and never propagated.
pub async fn harvest(fetchers: &[Arc<dyn SourceFetcher>]) -> Harvest {
    let runs = fetchers.iter().map(|f| async move {
        let t0 = Instant::now();
        let res = f.fetch().await;
        (f, t0.elapsed(), res)
    });

    let mut out = Harvest::default();
    for (fetcher, elapsed, res) in join_all(runs).await {
        let name = fetcher.name().to_string();
        histogram!("ingest_fetch_ms", "source" => name.clone())
            .record(elapsed.as_secs_f64() * 1_000.0);
        match res {
            Ok(records) => {
                tracing::debug!(target: "ingest", source = %name, records = records.len(), "source fetched");
                counter!("ingest_records_total", "source" => name.clone())
                    .increment(records.len() as u64);
                let profile = fetcher.profile().clone();
                out.records.extend(records.into_iter().map(|record| SourcedRecord {
                    profile: profile.clone(),
                    record,
                }));
                out.succeeded.push(name);
            }
            Err(e) => {
                tracing::warn!(target: "ingest", source = %name, error = %e, "source failed");
                counter!("ingest_source_errors_total", "source" => name.clone()).increment(1);
                out.failed.push((name, e.to_string()));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{FetchError, RawRecord, ScrapedRecord, SourceProfile};
    use async_trait::async_trait;

    struct Fixed {
        profile: Arc<SourceProfile>,
        out: Option<usize>,
    }

    #[async_trait]
    impl SourceFetcher for Fixed {
        async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
            match self.out {
                Some(n) => Ok((0..n)
                    .map(|i| {
                        RawRecord::Scraped(ScrapedRecord {
                            title: format!("{} {i}", self.profile.name),
                            link: format!("https://x.test/{}/{i}", self.profile.name),
                            description: None,
                        })
                    })
                    .collect()),
                None => Err(FetchError::Decode("boom".into())),
            }
        }

        fn profile(&self) -> &Arc<SourceProfile> {
            &self.profile
        }
    }

    fn fixed(name: &str, out: Option<usize>) -> Arc<dyn SourceFetcher> {
        Arc::new(Fixed {
            profile: Arc::new(SourceProfile::named(name)),
            out,
        })
    }

    #[tokio::test]
    async fn keeps_fetcher_order_and_isolates_failures() {
        let h = harvest(&[fixed("a", Some(2)), fixed("b", None), fixed("c", Some(1))]).await;
        assert_eq!(h.records.len(), 3);
        assert_eq!(h.records[0].profile.name, "a");
        assert_eq!(h.records[2].profile.name, "c");
        assert_eq!(h.succeeded, vec!["a", "c"]);
        assert_eq!(h.failed.len(), 1);
        assert_eq!(h.failed[0].0, "b");
        assert!(!h.all_failed());
    }

    #[tokio::test]
    async fn no_fetchers_is_not_a_failure() {
        let h = harvest(&[]).await;
        assert!(h.records.is_empty());
        assert!(!h.all_failed());
    }
}
