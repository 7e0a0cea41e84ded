use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::{Map, Value};

use crate::ingest::http::HttpClient;
use crate::ingest::types::{value_text, ApiRecord, FetchError, RawRecord, SourceFetcher, SourceProfile};

/// How an API item is reshaped before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    /// Canonical field name → JSON pointer into the item (e.g.
    /// `instructor = "/instructors/0/fullName"`).
    pub fields: BTreeMap<String, String>,
    /// `url` built from item fields, e.g. `https://site/learn/{slug}`.
    pub link_template: Option<String>,
}

impl Projection {
    fn apply(&self, item: &Map<String, Value>) -> Map<String, Value> {
        let mut out = item.clone();
        let root = Value::Object(item.clone());
        for (field, pointer) in &self.fields {
            if let Some(v) = root.pointer(pointer).filter(|v| !v.is_null()) {
                out.insert(field.clone(), v.clone());
            }
        }
        if let Some(tpl) = &self.link_template {
            if let Some(url) = render_template(tpl, item) {
                out.insert("url".into(), Value::String(url));
            }
        }
        out
    }
}

/// Fill `{key}` placeholders from top-level item fields. `None` when any
/// placeholder has no value.
fn render_template(tpl: &str, item: &Map<String, Value>) -> Option<String> {
    static RE_PLACEHOLDER: OnceCell<Regex> = OnceCell::new();
    let re = RE_PLACEHOLDER.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").unwrap());

    let mut missing = false;
    let rendered = re.replace_all(tpl, |caps: &regex::Captures<'_>| {
        match item.get(&caps[1]).and_then(value_text) {
            Some(v) => v.trim().to_string(),
            None => {
                missing = true;
                String::new()
            }
        }
    });
    if missing {
        None
    } else {
        Some(rendered.into_owned())
    }
}

/// Decode an API body and pull out the listing objects.
///
/// `list_key` is a top-level key or a JSON pointer; a body that is itself an
/// array is accepted either way. A body without the list yields no records.
pub fn extract_records(
    body: &str,
    list_key: Option<&str>,
    projection: &Projection,
    limit: Option<usize>,
) -> Result<Vec<ApiRecord>, FetchError> {
    let root: Value =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(format!("json: {e}")))?;

    let items = match (&root, list_key) {
        (Value::Array(a), _) => Some(a),
        (Value::Object(_), Some(k)) if k.starts_with('/') => {
            root.pointer(k).and_then(Value::as_array)
        }
        (Value::Object(o), Some(k)) => o.get(k).and_then(Value::as_array),
        _ => None,
    };
    let Some(items) = items else {
        return Ok(Vec::new());
    };

    Ok(items
        .iter()
        .filter_map(Value::as_object)
        .take(limit.unwrap_or(usize::MAX))
        .map(|item| ApiRecord::new(projection.apply(item)))
        .collect())
}

pub struct JsonApiFetcher {
    profile: Arc<SourceProfile>,
    url: String,
    params: Vec<(String, String)>,
    list_key: Option<String>,
    projection: Projection,
    http: HttpClient,
}

impl JsonApiFetcher {
    pub fn new(
        profile: SourceProfile,
        url: impl Into<String>,
        params: BTreeMap<String, String>,
        list_key: Option<String>,
        projection: Projection,
        http: HttpClient,
    ) -> Self {
        Self {
            profile: Arc::new(profile),
            url: url.into(),
            params: params.into_iter().collect(),
            list_key,
            projection,
            http,
        }
    }
}

#[async_trait]
impl SourceFetcher for JsonApiFetcher {
    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        let body = self.http.get_text(&self.url, &self.params).await?;
        match extract_records(
            &body,
            self.list_key.as_deref(),
            &self.projection,
            self.profile.limit,
        ) {
            Ok(records) => {
                if records.is_empty() {
                    tracing::warn!(target: "ingest", source = %self.profile.name, "no records in api response");
                }
                Ok(records.into_iter().map(RawRecord::Api).collect())
            }
            Err(e) => {
                tracing::warn!(target: "ingest", source = %self.profile.name, error = %e, "api response not decodable");
                counter!("ingest_decode_errors_total").increment(1);
                Ok(Vec::new())
            }
        }
    }

    fn profile(&self) -> &Arc<SourceProfile> {
        &self.profile
    }
}
