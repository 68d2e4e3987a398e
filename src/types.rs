use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{PortalyticsError, Result};

pub const PREVIEW_URL: &str = "https://redaktion.openeduhub.net/edu-sharing/preview?maxWidth=200&maxHeight=200&crop=true&storeProtocol=workspace&storeId=SpacesStore&nodeId=";

/// Key of the synthetic bucket counting documents without the attribute.
pub const MISSING_KEY: &str = "(missing)";
/// Key of the bucket holding everything outside the top-N.
pub const OTHER_KEY: &str = "(other)";

/// Offset applied when rendering click timestamps for the dashboard's audience.
const LOCAL_DISPLAY_OFFSET_HOURS: i64 = 2;

/// A top-level portal (editorial subject collection) clicks are attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portal {
    /// Node id; a resource belongs to the portal if this id appears in one of
    /// its collection paths.
    pub id: String,
    pub title: String,
    pub name: String,
    pub icon_url: Option<String>,
    pub content_url: Option<String>,
    pub subject_tag: Option<String>,
}

/// Everything the resolver learns about a resource. `Default` is the
/// "unnamed, unattributed" result of a failed lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedInfo {
    pub display_name: Option<String>,
    pub display_title: Option<String>,
    pub source_crawler: Option<String>,
    pub creator: Option<String>,
    pub portal_memberships: BTreeSet<String>,
    /// False when the lookup found nothing or failed.
    pub found: bool,
}

/// Per-resource accumulator of search-click history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClickRecord {
    pub resource_id: String,
    pub search_terms: IndexMap<String, u64>,
    pub click_count: u64,
    pub display_name: Option<String>,
    pub display_title: Option<String>,
    pub source_crawler: Option<String>,
    pub creator: Option<String>,
    pub last_seen_timestamp: String,
    pub portal_memberships: BTreeSet<String>,
    pub resolved: bool,
}

impl ClickRecord {
    /// First click on a resource.
    pub fn new(
        resource_id: &str,
        info: ResolvedInfo,
        search_term: Option<&str>,
        timestamp: &str,
    ) -> Self {
        let mut record = Self {
            resource_id: resource_id.to_string(),
            search_terms: IndexMap::new(),
            click_count: 1,
            display_name: info.display_name,
            display_title: info.display_title,
            source_crawler: info.source_crawler,
            creator: info.creator,
            last_seen_timestamp: timestamp.to_string(),
            portal_memberships: info.portal_memberships,
            resolved: info.found,
        };
        record.count_term(search_term);
        record
    }

    /// Fold one more click into the record. Labels and memberships stay as
    /// captured on creation.
    pub fn merge_click(&mut self, search_term: Option<&str>, timestamp: &str) {
        self.count_term(search_term);
        self.click_count += 1;
        if timestamp > self.last_seen_timestamp.as_str() {
            self.last_seen_timestamp = timestamp.to_string();
        }
    }

    fn count_term(&mut self, search_term: Option<&str>) {
        if let Some(term) = search_term {
            *self.search_terms.entry(term.to_string()).or_insert(0) += 1;
        }
    }

    pub fn is_attributed(&self) -> bool {
        !self.portal_memberships.is_empty()
    }

    /// Keys of every bucket this record is filed under.
    pub fn bucket_keys(&self) -> Vec<BucketKey> {
        if self.portal_memberships.is_empty() {
            return vec![BucketKey::Unattributed];
        }
        self.portal_memberships
            .iter()
            .map(|id| BucketKey::Portal(id.clone()))
            .collect()
    }

    /// Search terms rendered as `"term"(count)`, joined by `, `.
    pub fn formatted_terms(&self) -> String {
        self.search_terms
            .iter()
            .map(|(term, count)| format!("\"{}\"({})", term, count))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn thumbnail_url(&self) -> String {
        format!("{}{}", PREVIEW_URL, self.resource_id)
    }

    /// Last click shifted to the dashboard's display time zone.
    pub fn local_timestamp(&self) -> Option<String> {
        let parsed = DateTime::parse_from_rfc3339(&self.last_seen_timestamp).ok()?;
        let local = parsed.with_timezone(&Utc) + Duration::hours(LOCAL_DISPLAY_OFFSET_HOURS);
        Some(local.format("%Y-%m-%d %H:%M:%S").to_string())
    }

    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            id: self.resource_id.clone(),
            search_strings: self.formatted_terms(),
            clicks: self.click_count,
            name: self.display_name.clone().unwrap_or_default(),
            title: self.display_title.clone().unwrap_or_default(),
            crawler: self.source_crawler.clone().unwrap_or_default(),
            creator: self.creator.clone().unwrap_or_default(),
            timestamp: self.last_seen_timestamp.clone(),
            local_timestamp: self.local_timestamp(),
            thumbnail_url: self.thumbnail_url(),
        }
    }
}

/// One dashboard row per clicked resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSummary {
    pub id: String,
    pub search_strings: String,
    pub clicks: u64,
    pub name: String,
    pub title: String,
    pub crawler: String,
    pub creator: String,
    pub timestamp: String,
    pub local_timestamp: Option<String>,
    pub thumbnail_url: String,
}

/// Bucket of the per-portal grouping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BucketKey {
    Portal(String),
    Unattributed,
}

impl BucketKey {
    pub fn portal(id: &str) -> Self {
        BucketKey::Portal(id.to_string())
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKey::Portal(id) => write!(f, "{}", id),
            BucketKey::Unattributed => write!(f, "unattributed"),
        }
    }
}

/// A (key, count) pair from a terms/missing aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub key: String,
    pub doc_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordCloudEntry {
    pub text: String,
    pub value: u64,
}

impl Bucket {
    pub fn new(key: impl Into<String>, doc_count: u64) -> Self {
        Self {
            key: key.into(),
            doc_count,
        }
    }

    pub fn as_word_cloud(&self) -> WordCloudEntry {
        WordCloudEntry {
            text: self.key.clone(),
            value: self.doc_count,
        }
    }
}

/// Timestamp cursor marking the boundary of already-processed events.
///
/// Compared as strings, which only orders correctly between timestamps of
/// the same width. Events carry millisecond ISO-8601 UTC timestamps, so the
/// initial lookback boundary is rendered at that precision too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint(String);

impl Checkpoint {
    pub fn new(timestamp: impl Into<String>) -> Self {
        Self(timestamp.into())
    }

    /// `now` minus `days`, in the events' timestamp format.
    pub fn lookback(now: DateTime<Utc>, days: u32) -> Result<Self> {
        let start = now
            .checked_sub_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| {
                PortalyticsError::Config(format!(
                    "lookback of {} days reaches before the earliest representable date",
                    days
                ))
            })?;
        Ok(Self(start.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Move forward to `timestamp` if it is newer. Returns whether it moved.
    pub fn advance_to(&mut self, timestamp: &str) -> bool {
        if timestamp > self.0.as_str() {
            self.0 = timestamp.to_string();
            true
        } else {
            false
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
