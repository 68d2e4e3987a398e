use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;

/// Typed view of a backend search response. `S` is the `_source` shape the
/// caller expects; hits without a `_source` decode to `source: None`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse<S> {
    #[serde(default = "Hits::default")]
    pub hits: Hits<S>,
    #[serde(default)]
    pub aggregations: HashMap<String, Aggregation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hits<S> {
    #[serde(default)]
    pub total: Option<TotalHits>,
    #[serde(default = "Vec::new")]
    pub hits: Vec<Hit<S>>,
}

impl<S> Default for Hits<S> {
    fn default() -> Self {
        Self {
            total: None,
            hits: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hit<S> {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(rename = "_source", default = "Option::default")]
    pub source: Option<S>,
}

/// `hits.total` is an object on current backends and a bare number on old ones.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum TotalHits {
    Object { value: u64 },
    Count(u64),
}

impl TotalHits {
    pub fn value(&self) -> u64 {
        match self {
            TotalHits::Object { value } | TotalHits::Count(value) => *value,
        }
    }
}

/// A named aggregation result: `buckets` for terms aggregations, a bare
/// `doc_count` for missing aggregations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Aggregation {
    #[serde(default)]
    pub buckets: Vec<AggBucket>,
    #[serde(default)]
    pub doc_count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggBucket {
    pub key: Value,
    #[serde(default)]
    pub key_as_string: Option<String>,
    pub doc_count: u64,
}

impl AggBucket {
    /// Bucket key as display text (numeric and boolean keys are stringified).
    pub fn key_text(&self) -> String {
        if let Some(ref s) = self.key_as_string {
            return s.clone();
        }
        match &self.key {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl<S> SearchResponse<S> {
    pub fn total(&self) -> u64 {
        self.hits.total.map(|t| t.value()).unwrap_or(0)
    }

    pub fn aggregation(&self, name: &str) -> Option<&Aggregation> {
        self.aggregations.get(name)
    }

    /// Sources of all hits that carried one, in response order.
    pub fn sources(&self) -> impl Iterator<Item = &S> {
        self.hits.hits.iter().filter_map(|h| h.source.as_ref())
    }
}

/// `#[serde(deserialize_with)]` helper: an explicit `null` decodes like an
/// absent field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Repository properties arrive either as plain strings or as string arrays.
pub(crate) fn lenient_text<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    let text = match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Array(items)) => items
            .into_iter()
            .find_map(|v| v.as_str().map(str::to_string)),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    Ok(text.filter(|s| !s.is_empty()))
}
