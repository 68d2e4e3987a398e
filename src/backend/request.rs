use serde::Serialize;
use serde_json::{json, Map, Value};

/// Structured search request: the `query`/`aggs`/`size`/`_source`/`sort` body
/// understood by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub aggs: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(rename = "_source", skip_serializing_if = "Option::is_none")]
    pub source: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_total_hits: Option<bool>,
}

impl SearchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn source<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.source = Some(fields.iter().map(|f| f.as_ref().to_string()).collect());
        self
    }

    pub fn sort_desc(mut self, field: &str) -> Self {
        self.sort.push(json!({ field: { "order": "desc" } }));
        self
    }

    pub fn agg(mut self, name: &str, agg: Value) -> Self {
        self.aggs.insert(name.to_string(), agg);
        self
    }

    pub fn track_total_hits(mut self) -> Self {
        self.track_total_hits = Some(true);
        self
    }
}
