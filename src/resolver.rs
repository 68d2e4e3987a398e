//! Resource resolver: metadata and portal membership for one clicked resource.

use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};

use crate::backend::response::{lenient_text, null_as_default};
use crate::backend::{queries, QueryClient, SearchResponse};
use crate::error::Result;
use crate::types::ResolvedInfo;

pub struct ResourceResolver {
    client: QueryClient,
    target: String,
}

#[derive(Debug, Default, Deserialize)]
struct ResourceSource {
    #[serde(default, deserialize_with = "null_as_default")]
    properties: ResourceProperties,
    #[serde(default, deserialize_with = "null_as_default")]
    collections: Vec<Option<CollectionRef>>,
}

#[derive(Debug, Default, Deserialize)]
struct ResourceProperties {
    #[serde(rename = "cm:name", default, deserialize_with = "lenient_text")]
    name: Option<String>,
    #[serde(rename = "cclom:title", default, deserialize_with = "lenient_text")]
    title: Option<String>,
    #[serde(
        rename = "ccm:replicationsource",
        default,
        deserialize_with = "lenient_text"
    )]
    replication_source: Option<String>,
    #[serde(rename = "cm:creator", default, deserialize_with = "lenient_text")]
    creator: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CollectionRef {
    #[serde(default, deserialize_with = "null_as_default")]
    path: Vec<String>,
}

impl ResourceSource {
    fn into_info(self, known_portal_ids: &HashSet<String>) -> ResolvedInfo {
        let portal_memberships: BTreeSet<String> = self
            .collections
            .iter()
            .flatten()
            .flat_map(|c| c.path.iter())
            .filter(|node| known_portal_ids.contains(node.as_str()))
            .cloned()
            .collect();

        ResolvedInfo {
            display_name: self.properties.name,
            display_title: self.properties.title,
            source_crawler: self.properties.replication_source,
            creator: self.properties.creator,
            portal_memberships,
            found: true,
        }
    }
}

impl ResourceResolver {
    pub fn new(client: QueryClient, target: &str) -> Self {
        Self {
            client,
            target: target.to_string(),
        }
    }

    /// Look up `resource_id` and intersect its collection paths with
    /// `known_portal_ids`. Never fails: a miss or an error yields
    /// [`ResolvedInfo::default`].
    pub async fn resolve(&self, resource_id: &str, known_portal_ids: &HashSet<String>) -> ResolvedInfo {
        match self.lookup(resource_id, known_portal_ids).await {
            Ok(Some(info)) => {
                tracing::debug!(
                    "[resolver] {} resolved into {} portals",
                    resource_id,
                    info.portal_memberships.len()
                );
                info
            }
            Ok(None) => {
                tracing::warn!("[resolver] No document found for resource {}", resource_id);
                ResolvedInfo::default()
            }
            Err(e) => {
                tracing::warn!("[resolver] Failed to resolve resource {}: {}", resource_id, e);
                ResolvedInfo::default()
            }
        }
    }

    async fn lookup(
        &self,
        resource_id: &str,
        known_portal_ids: &HashSet<String>,
    ) -> Result<Option<ResolvedInfo>> {
        let response: SearchResponse<ResourceSource> = self
            .client
            .query(&self.target, &queries::resource_lookup(resource_id))
            .await?;

        Ok(response
            .hits
            .hits
            .into_iter()
            .next()
            .and_then(|hit| hit.source)
            .map(|source| source.into_info(known_portal_ids)))
    }
}
