//! Per-portal metadata quality: materials and collections missing key
//! attributes, license groups, a completeness score and collections that
//! hold too little content.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::backend::response::{lenient_text, null_as_default};
use crate::backend::{queries, QueryClient, SearchRequest, SearchResponse};
use crate::error::Result;
use crate::types::Bucket;

pub const NODE_URL: &str = "https://redaktion.openeduhub.net/edu-sharing/components/render/";
pub const COLLECTION_URL: &str =
    "https://redaktion.openeduhub.net/edu-sharing/components/collections?id=";

/// Default cap on the number of nodes listed per check.
pub const DEFAULT_MAX_ITEMS: usize = 10_000;

pub const OER_LICENSES: &[&str] = &["CC_0", "CC_BY", "CC_BY_SA", "PDM"];
pub const CC_LICENSES: &[&str] = &[
    "CC_BY_NC",
    "CC_BY_NC_ND",
    "CC_BY_NC_SA",
    "CC_BY_SA_NC",
    "CC_BY_ND",
];
pub const COPYRIGHT_LICENSES: &[&str] = &["COPYRIGHT_FREE", "COPYRIGHT_LICENSE", "CUSTOM"];

/// Material attributes whose absence lowers the score: (label, field).
pub const MATERIAL_CHECKS: &[(&str, &str)] = &[
    ("title", "properties.cclom:title"),
    ("subject", "properties.ccm:taxonid"),
    ("educational context", "properties.ccm:educationalcontext"),
    ("keywords", "properties.cclom:general_keyword"),
];

/// Collection attributes whose absence lowers the score: (label, field).
pub const COLLECTION_CHECKS: &[(&str, &str)] = &[
    ("keywords", "properties.cclom:general_keyword"),
    ("description", "properties.cm:description"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingScope {
    Material,
    Collection,
}

/// Named material filters on top of the base condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialCondition {
    /// License key present but one of [`queries::MISSING_LICENSE_KEYS`].
    MissingLicense,
}

/// Editor dialog to open for fixing a listed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EditAction {
    #[serde(rename = "OPTIONS.EDIT")]
    Edit,
    #[serde(rename = "OPTIONS.LICENSE")]
    License,
}

impl fmt::Display for EditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditAction::Edit => f.write_str("OPTIONS.EDIT"),
            EditAction::License => f.write_str("OPTIONS.LICENSE"),
        }
    }
}

/// A material or collection listed by a quality check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingItem {
    pub id: String,
    pub name: Option<String>,
    pub title: Option<String>,
    pub node_type: Option<String>,
    pub content_url: Option<String>,
    pub action: EditAction,
    /// Materials inside, for collections listed by content size.
    pub doc_count: u64,
}

impl MissingItem {
    pub fn is_collection(&self) -> bool {
        self.node_type.as_deref() == Some("ccm:map")
    }

    /// Repository page where the node can be fixed.
    pub fn edit_url(&self) -> String {
        if self.is_collection() {
            format!("{}{}", COLLECTION_URL, self.id)
        } else {
            format!("{}{}?action={}", NODE_URL, self.id, self.action)
        }
    }

    pub fn label(&self) -> &str {
        self.title
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }
}

/// Result of one check: the backend's total and the listed nodes (capped).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MissingSet {
    pub total: u64,
    pub items: Vec<MissingItem>,
}

impl MissingSet {
    fn merge(mut self, other: MissingSet) -> Self {
        self.total += other.total;
        self.items.extend(other.items);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseGroup {
    Oer,
    Cc,
    Copyright,
    Missing,
}

impl LicenseGroup {
    pub fn classify(key: &str) -> Option<Self> {
        if OER_LICENSES.contains(&key) {
            Some(LicenseGroup::Oer)
        } else if CC_LICENSES.contains(&key) {
            Some(LicenseGroup::Cc)
        } else if COPYRIGHT_LICENSES.contains(&key) {
            Some(LicenseGroup::Copyright)
        } else if queries::MISSING_LICENSE_KEYS.contains(&key) {
            Some(LicenseGroup::Missing)
        } else {
            None
        }
    }
}

/// Material counts per license group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LicenseSummary {
    pub oer: u64,
    pub cc: u64,
    pub copyright: u64,
    pub missing: u64,
    /// License keys outside every known group.
    pub unclassified: Vec<Bucket>,
}

impl LicenseSummary {
    /// Sum license buckets into their groups. `missing` only covers
    /// materials that carry an empty-ish key; materials without the
    /// attribute are added by [`QualityInspector::licenses`].
    pub fn from_buckets(buckets: &[Bucket]) -> Self {
        let mut summary = Self::default();
        for bucket in buckets {
            match LicenseGroup::classify(&bucket.key) {
                Some(LicenseGroup::Oer) => summary.oer += bucket.doc_count,
                Some(LicenseGroup::Cc) => summary.cc += bucket.doc_count,
                Some(LicenseGroup::Copyright) => summary.copyright += bucket.doc_count,
                Some(LicenseGroup::Missing) => summary.missing += bucket.doc_count,
                None => {
                    tracing::warn!("[quality] Unknown license key {:?}", bucket.key);
                    summary.unclassified.push(bucket.clone());
                }
            }
        }
        summary
    }
}

/// Mean share of complete materials over the scored checks, in percent.
/// Zero when there are no materials to score against.
pub fn quality_score(resources_total: u64, missing_counts: &[u64]) -> f64 {
    if resources_total == 0 || missing_counts.is_empty() {
        return 0.0;
    }
    let checks = missing_counts.len() as f64;
    let score: f64 = missing_counts
        .iter()
        .map(|&missing| {
            let share = (missing as f64 / resources_total as f64).min(1.0);
            (1.0 - share) / checks
        })
        .sum();
    (score * 100.0).round()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub portal_id: String,
    pub resources_total: u64,
    pub licenses: LicenseSummary,
    pub resources_no_license: MissingSet,
    /// One entry per [`MATERIAL_CHECKS`] item, in that order.
    pub materials_missing: Vec<(String, MissingSet)>,
    /// One entry per [`COLLECTION_CHECKS`] item, in that order.
    pub collections_missing: Vec<(String, MissingSet)>,
    pub quality_score: f64,
}

impl QualityReport {
    pub fn materials_missing(&self, label: &str) -> Option<&MissingSet> {
        find_check(&self.materials_missing, label)
    }

    pub fn collections_missing(&self, label: &str) -> Option<&MissingSet> {
        find_check(&self.collections_missing, label)
    }
}

fn find_check<'a>(checks: &'a [(String, MissingSet)], label: &str) -> Option<&'a MissingSet> {
    checks.iter().find(|(l, _)| l == label).map(|(_, set)| set)
}

#[derive(Debug, Default, Deserialize)]
struct NodeSource {
    #[serde(rename = "nodeRef", default, deserialize_with = "null_as_default")]
    node_ref: NodeRef,
    #[serde(rename = "type", default, deserialize_with = "lenient_text")]
    node_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    properties: NodeProperties,
}

#[derive(Debug, Default, Deserialize)]
struct NodeRef {
    #[serde(default, deserialize_with = "lenient_text")]
    id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NodeProperties {
    #[serde(rename = "cm:name", default, deserialize_with = "lenient_text")]
    name: Option<String>,
    #[serde(rename = "cclom:title", default, deserialize_with = "lenient_text")]
    title: Option<String>,
    #[serde(rename = "ccm:wwwurl", default, deserialize_with = "lenient_text")]
    www_url: Option<String>,
}

/// Runs the quality checks against the workspace target.
pub struct QualityInspector {
    client: QueryClient,
    target: String,
    max_items: usize,
}

impl QualityInspector {
    pub fn new(client: QueryClient, target: &str) -> Self {
        Self {
            client,
            target: target.to_string(),
            max_items: DEFAULT_MAX_ITEMS,
        }
    }

    /// Cap the number of nodes listed per check (0 lists totals only).
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    /// Materials or collections in `collection_id` lacking `attribute`.
    pub async fn missing_attribute(
        &self,
        collection_id: &str,
        attribute: &str,
        scope: MissingScope,
    ) -> Result<MissingSet> {
        let request = match scope {
            MissingScope::Material => {
                queries::materials_missing_attribute(collection_id, attribute, self.max_items)
            }
            MissingScope::Collection => {
                queries::collections_missing_attribute(collection_id, attribute, self.max_items)
            }
        };
        self.list_nodes(&request, EditAction::Edit).await
    }

    pub async fn materials_by_condition(
        &self,
        collection_id: &str,
        condition: Option<MaterialCondition>,
    ) -> Result<MissingSet> {
        let request = queries::materials_by_condition(collection_id, condition, self.max_items);
        let action = match condition {
            Some(MaterialCondition::MissingLicense) => EditAction::License,
            None => EditAction::Edit,
        };
        self.list_nodes(&request, action).await
    }

    /// Materials without a usable license: an empty-ish license key, or no
    /// license attribute at all.
    pub async fn missing_licenses(&self, collection_id: &str) -> Result<MissingSet> {
        let empty_key = self
            .materials_by_condition(collection_id, Some(MaterialCondition::MissingLicense))
            .await?;
        let request = queries::materials_missing_attribute(
            collection_id,
            queries::LICENSE_FIELD,
            self.max_items,
        );
        let absent = self.list_nodes(&request, EditAction::License).await?;
        Ok(empty_key.merge(absent))
    }

    /// Material total of `collection_id` and the value buckets of `attribute`.
    pub async fn statistic_counts(
        &self,
        collection_id: &str,
        attribute: &str,
    ) -> Result<(u64, Vec<Bucket>)> {
        let request = queries::statistic_counts(collection_id, attribute);
        let response: SearchResponse<serde_json::Value> =
            self.client.query(&self.target, &request).await?;
        let buckets = response
            .aggregation(queries::LICENSE_AGG)
            .map(|agg| {
                agg.buckets
                    .iter()
                    .map(|b| Bucket::new(b.key_text(), b.doc_count))
                    .collect()
            })
            .unwrap_or_default();
        Ok((response.total(), buckets))
    }

    pub async fn resources_total(&self, collection_id: &str) -> Result<u64> {
        let (total, _) = self.statistic_counts(collection_id, queries::LICENSE_FIELD).await?;
        Ok(total)
    }

    /// License groups of `collection_id`; `missing` counts every material
    /// without a usable license.
    pub async fn licenses(&self, collection_id: &str) -> Result<LicenseSummary> {
        let (_, buckets) = self.statistic_counts(collection_id, queries::LICENSE_FIELD).await?;
        let mut summary = LicenseSummary::from_buckets(&buckets);
        summary.missing = self.missing_licenses(collection_id).await?.total;
        Ok(summary)
    }

    /// Full report for one portal. Queries run in this order: statistic
    /// counts, missing licenses (empty key, then absent key), the
    /// [`MATERIAL_CHECKS`], then the [`COLLECTION_CHECKS`].
    pub async fn report(&self, portal_id: &str) -> Result<QualityReport> {
        let (resources_total, license_buckets) = self
            .statistic_counts(portal_id, queries::LICENSE_FIELD)
            .await?;
        let resources_no_license = self.missing_licenses(portal_id).await?;

        let mut materials_missing = Vec::with_capacity(MATERIAL_CHECKS.len());
        for (label, field) in MATERIAL_CHECKS {
            let set = self
                .missing_attribute(portal_id, field, MissingScope::Material)
                .await?;
            materials_missing.push((label.to_string(), set));
        }
        let mut collections_missing = Vec::with_capacity(COLLECTION_CHECKS.len());
        for (label, field) in COLLECTION_CHECKS {
            let set = self
                .missing_attribute(portal_id, field, MissingScope::Collection)
                .await?;
            collections_missing.push((label.to_string(), set));
        }

        let scored: Vec<u64> = materials_missing
            .iter()
            .chain(collections_missing.iter())
            .map(|(_, set)| set.total)
            .collect();
        let quality_score = quality_score(resources_total, &scored);

        let mut licenses = LicenseSummary::from_buckets(&license_buckets);
        licenses.missing = resources_no_license.total;

        tracing::info!(
            portal = portal_id,
            resources_total,
            quality_score,
            "[quality] Report complete"
        );
        Ok(QualityReport {
            portal_id: portal_id.to_string(),
            resources_total,
            licenses,
            resources_no_license,
            materials_missing,
            collections_missing,
            quality_score,
        })
    }

    /// Collections below `portal_id` holding at most `doc_threshold`
    /// materials, each with its material count.
    pub async fn collections_below_threshold(
        &self,
        portal_id: &str,
        doc_threshold: u64,
    ) -> Result<Vec<MissingItem>> {
        let request = queries::portal_collections(portal_id, self.max_items);
        let collections = self.list_nodes(&request, EditAction::Edit).await?;

        let mut sparse = Vec::new();
        for mut collection in collections.items {
            let doc_count = self
                .client
                .count(
                    &self.target,
                    Some(queries::base_condition(Some(&collection.id), None)),
                )
                .await?;
            if doc_count <= doc_threshold {
                collection.doc_count = doc_count;
                sparse.push(collection);
            }
        }
        tracing::debug!(
            "[quality] {}: {} collections with at most {} materials",
            portal_id,
            sparse.len(),
            doc_threshold
        );
        Ok(sparse)
    }

    /// [`collections_below_threshold`](Self::collections_below_threshold)
    /// for every portal in `portal_ids`, keyed by portal id.
    pub async fn collections_by_portal<'a>(
        &self,
        portal_ids: impl IntoIterator<Item = &'a str>,
        doc_threshold: u64,
    ) -> Result<BTreeMap<String, Vec<MissingItem>>> {
        let mut by_portal = BTreeMap::new();
        for portal_id in portal_ids {
            let sparse = self.collections_below_threshold(portal_id, doc_threshold).await?;
            by_portal.insert(portal_id.to_string(), sparse);
        }
        Ok(by_portal)
    }

    async fn list_nodes(
        &self,
        request: &SearchRequest,
        action: EditAction,
    ) -> Result<MissingSet> {
        let response: SearchResponse<NodeSource> = self.client.query(&self.target, request).await?;
        let total = response.total();
        let items = response
            .hits
            .hits
            .into_iter()
            .filter_map(|hit| {
                let source = hit.source.unwrap_or_default();
                let id = source.node_ref.id.or(hit.id)?;
                Some(MissingItem {
                    id,
                    name: source.properties.name,
                    title: source.properties.title,
                    node_type: source.node_type,
                    content_url: source.properties.www_url,
                    action,
                    doc_count: 0,
                })
            })
            .collect();
        Ok(MissingSet { total, items })
    }
}
