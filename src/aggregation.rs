//! Attribute distribution reporting: terms/missing aggregations, top-N plus
//! "other" bucketing, and frequency tables built from buckets.

use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use crate::backend::{queries, QueryClient, SearchResponse};
use crate::error::{PortalyticsError, Result};
use crate::types::{Bucket, MISSING_KEY, OTHER_KEY};

/// Attributes the distribution report covers: (label, backend field).
pub const KNOWN_ATTRIBUTES: &[(&str, &str)] = &[
    ("thumbnail", "properties.ccm:thumbnailurl.keyword"),
    (
        "learning resource type",
        "i18n.de_DE.ccm:educationallearningresourcetype.keyword",
    ),
    ("duration", "properties.cclom:duration.keyword"),
    ("language", "properties.cclom:general_language.keyword"),
    ("source", "i18n.de_DE.ccm:replicationsource.keyword"),
    ("oer_label", "i18n.de_DE.ccm:license_oer.keyword"),
    ("license", "properties.ccm:commonlicense_key.keyword"),
    ("title", "properties.cclom:title.keyword"),
    ("description", "properties.cclom:general_description.keyword"),
    ("discipline", "i18n.de_DE.ccm:taxonid.keyword"),
    (
        "educational context",
        "i18n.de_DE.ccm:educationalcontext.keyword",
    ),
    ("login", "i18n.de_DE.ccm:conditionsOfAccess.keyword"),
    ("price", "i18n.de_DE.ccm:price.keyword"),
    (
        "contains advertisement",
        "i18n.de_DE.ccm:containsAdvertisement.keyword",
    ),
    ("associated collections", "collections.path.keyword"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
    Terms,
    Missing,
}

impl FromStr for AggKind {
    type Err = PortalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "terms" => Ok(AggKind::Terms),
            "missing" => Ok(AggKind::Missing),
            other => Err(PortalyticsError::Config(format!(
                "agg kind {:?} is not allowed, use one of [\"terms\", \"missing\"]",
                other
            ))),
        }
    }
}

impl fmt::Display for AggKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggKind::Terms => f.write_str("terms"),
            AggKind::Missing => f.write_str("missing"),
        }
    }
}

/// Runs aggregations over one target, optionally restricted by a query.
pub struct AttributeAggregator {
    client: QueryClient,
    target: String,
    scope: Option<Value>,
}

impl AttributeAggregator {
    /// Aggregate over every document in `target`.
    pub fn new(client: QueryClient, target: &str) -> Self {
        Self {
            client,
            target: target.to_string(),
            scope: None,
        }
    }

    /// Aggregate over published learning objects, optionally inside one collection.
    pub fn for_materials(client: QueryClient, target: &str, collection_id: Option<&str>) -> Self {
        Self {
            client,
            target: target.to_string(),
            scope: Some(queries::base_condition(collection_id, None)),
        }
    }

    /// `Terms`: up to `size` buckets in backend order (count descending).
    /// `Missing`: one [`MISSING_KEY`] bucket counting documents without the attribute.
    pub async fn aggregate(&self, attribute: &str, kind: AggKind, size: usize) -> Result<Vec<Bucket>> {
        let request = queries::attribute_aggregation(attribute, kind, size, self.scope.clone());
        let response: SearchResponse<Value> = self.client.query(&self.target, &request).await?;

        let agg = response
            .aggregation(queries::AGG_NAME)
            .ok_or_else(|| PortalyticsError::Decode {
                target: self.target.clone(),
                message: format!("{} aggregation on {} missing from response", kind, attribute),
            })?;

        let buckets = match kind {
            AggKind::Terms => agg
                .buckets
                .iter()
                .map(|b| Bucket::new(b.key_text(), b.doc_count))
                .collect(),
            AggKind::Missing => vec![Bucket::new(MISSING_KEY, agg.doc_count.unwrap_or(0))],
        };
        tracing::debug!(
            "[aggregation] {} {} on {}: {} buckets",
            self.target,
            kind,
            attribute,
            buckets.len()
        );
        Ok(buckets)
    }

    /// Top-`n` terms followed by an [`OTHER_KEY`] bucket for the remaining
    /// documents that carry the attribute.
    pub async fn top_n_with_other(&self, attribute: &str, n: usize) -> Result<Vec<Bucket>> {
        let mut buckets = self.aggregate(attribute, AggKind::Terms, n).await?;
        let total = self
            .client
            .count(&self.target, Some(self.with_attribute(attribute)))
            .await?;
        buckets.push(other_bucket(total, &buckets));
        Ok(buckets)
    }

    /// Top-`n` + other + missing: the full distribution of one attribute.
    pub async fn distribution(&self, attribute: &str, n: usize) -> Result<Vec<Bucket>> {
        let mut buckets = self.top_n_with_other(attribute, n).await?;
        buckets.extend(self.aggregate(attribute, AggKind::Missing, 0).await?);
        Ok(buckets)
    }

    /// The aggregator's scope narrowed to documents that have `attribute`.
    fn with_attribute(&self, attribute: &str) -> Value {
        let exists = json!({"exists": {"field": attribute}});
        match &self.scope {
            Some(scope) => json!({"bool": {"must": [scope, exists]}}),
            None => exists,
        }
    }
}

/// Documents outside the top-N. Never negative: the total and the terms come
/// from separate queries and multi-valued attributes count a document once
/// per value.
pub fn other_bucket(total: u64, top: &[Bucket]) -> Bucket {
    let shown: u64 = top.iter().map(|b| b.doc_count).sum();
    Bucket::new(OTHER_KEY, total.saturating_sub(shown))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyRow {
    pub key: String,
    pub doc_count: u64,
    /// Share of the table total, in percent.
    pub share: f64,
}

/// Buckets as rows with their share of the total.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrequencyTable {
    rows: Vec<FrequencyRow>,
    total: u64,
}

impl FrequencyTable {
    pub fn from_buckets(buckets: &[Bucket]) -> Self {
        let total: u64 = buckets.iter().map(|b| b.doc_count).sum();
        let rows = buckets
            .iter()
            .map(|b| FrequencyRow {
                key: b.key.clone(),
                doc_count: b.doc_count,
                share: if total == 0 {
                    0.0
                } else {
                    b.doc_count as f64 * 100.0 / total as f64
                },
            })
            .collect();
        Self { rows, total }
    }

    pub fn rows(&self) -> &[FrequencyRow] {
        &self.rows
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl fmt::Display for FrequencyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .rows
            .iter()
            .map(|r| r.key.chars().count())
            .max()
            .unwrap_or(0)
            .max(3);
        for row in &self.rows {
            writeln!(
                f,
                "{:<width$}  {:>8}  {:>6.2}%",
                row.key,
                row.doc_count,
                row.share,
                width = width
            )?;
        }
        write!(f, "{:<width$}  {:>8}", "sum", self.total, width = width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agg_kind_parse() {
        assert_eq!("terms".parse::<AggKind>().unwrap(), AggKind::Terms);
        assert_eq!("missing".parse::<AggKind>().unwrap(), AggKind::Missing);
        assert!("histogram".parse::<AggKind>().is_err());
    }

    #[test]
    fn test_other_bucket_is_remainder() {
        let top = vec![Bucket::new("a", 5), Bucket::new("b", 3)];
        assert_eq!(other_bucket(10, &top), Bucket::new(OTHER_KEY, 2));
    }

    #[test]
    fn test_other_bucket_clamps_at_zero() {
        let top = vec![Bucket::new("a", 5), Bucket::new("b", 3)];
        assert_eq!(other_bucket(6, &top).doc_count, 0);
        assert_eq!(other_bucket(0, &[]).doc_count, 0);
    }

    #[test]
    fn test_frequency_table_shares() {
        let table = FrequencyTable::from_buckets(&[
            Bucket::new("CC_BY", 3),
            Bucket::new(MISSING_KEY, 1),
        ]);
        assert_eq!(table.total(), 4);
        assert_eq!(table.rows()[0].share, 75.0);
        assert_eq!(table.rows()[1].share, 25.0);
        let rendered = table.to_string();
        assert!(rendered.contains("CC_BY"));
        assert!(rendered.contains("75.00%"));
    }

    #[test]
    fn test_frequency_table_zero_total() {
        let table = FrequencyTable::from_buckets(&[Bucket::new("a", 0)]);
        assert_eq!(table.total(), 0);
        assert_eq!(table.rows()[0].share, 0.0);
        assert!(FrequencyTable::from_buckets(&[]).is_empty());
    }
}
