use indexmap::IndexMap;
use std::collections::BTreeMap;

use crate::types::{BucketKey, ClickRecord};

/// Per-portal grouping of live records, rebuilt from the canonical record
/// set on every refresh. Buckets store resource ids, not records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortalBuckets {
    buckets: BTreeMap<BucketKey, Vec<String>>,
}

impl PortalBuckets {
    /// File every record under each of its portals (or once under
    /// [`BucketKey::Unattributed`]), most recent click first. Records with
    /// equal timestamps keep canonical insertion order.
    pub fn rebuild(records: &IndexMap<String, ClickRecord>) -> Self {
        let mut ordered: Vec<&ClickRecord> = records.values().collect();
        ordered.sort_by(|a, b| b.last_seen_timestamp.cmp(&a.last_seen_timestamp));

        let mut buckets: BTreeMap<BucketKey, Vec<String>> = BTreeMap::new();
        for record in ordered {
            for key in record.bucket_keys() {
                buckets
                    .entry(key)
                    .or_default()
                    .push(record.resource_id.clone());
            }
        }
        Self { buckets }
    }

    pub fn get(&self, key: &BucketKey) -> Option<&[String]> {
        self.buckets.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> impl Iterator<Item = &BucketKey> {
        self.buckets.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BucketKey, &[String])> {
        self.buckets.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of (bucket, record) filings across all buckets.
    pub fn total_filings(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}
