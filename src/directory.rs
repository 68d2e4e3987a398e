//! Collection directory: the list of top-level portals clicks are attributed to.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::backend::retry::RetryPolicy;
use crate::backend::transport::is_unavailable;
use crate::config::PortalyticsConfig;
use crate::error::{PortalyticsError, Result};
use crate::types::Portal;

#[async_trait]
pub trait PortalDirectory: Send + Sync {
    /// Portals in repository order.
    async fn list_portals(&self) -> Result<Vec<Portal>>;
}

/// Directory backed by the repository's collection listing endpoint.
pub struct HttpPortalDirectory {
    url: String,
    http_client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpPortalDirectory {
    pub fn new(url: &str, timeout: Duration, retry: RetryPolicy) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            url: url.to_string(),
            http_client,
            retry,
        }
    }

    pub fn from_config(config: &PortalyticsConfig) -> Self {
        Self::new(
            &config.directory_url,
            config.request_timeout,
            config.retry_policy(),
        )
    }

    async fn fetch_once(&self) -> Result<CollectionListing> {
        let response = self
            .http_client
            .get(&self.url)
            .header("Accept", "application/json")
            .query(&[
                ("scope", "TYPE_EDITORIAL"),
                ("skipCount", "0"),
                ("maxItems", "1247483647"),
                ("sortProperties", "cm:created"),
                ("sortAscending", "true"),
            ])
            .send()
            .await?;

        let status = response.status();
        if is_unavailable(status) {
            return Err(PortalyticsError::Connection(format!(
                "{} answered {}",
                self.url, status
            )));
        }
        if !status.is_success() {
            return Err(PortalyticsError::Directory(format!(
                "{} answered {}",
                self.url, status
            )));
        }

        response
            .json::<CollectionListing>()
            .await
            .map_err(|e| PortalyticsError::Directory(format!("malformed listing: {}", e)))
    }
}

#[async_trait]
impl PortalDirectory for HttpPortalDirectory {
    async fn list_portals(&self) -> Result<Vec<Portal>> {
        tracing::info!("[directory] Collecting portals from {}", self.url);
        let listing = self
            .retry
            .run("collections", move || self.fetch_once())
            .await?;
        let portals = listing.into_portals();
        tracing::debug!("[directory] {} portals listed", portals.len());
        Ok(portals)
    }
}

#[derive(Debug, Deserialize)]
struct CollectionListing {
    collections: Vec<RawCollection>,
}

#[derive(Debug, Deserialize)]
struct RawCollection {
    #[serde(default)]
    name: String,
    #[serde(default)]
    title: String,
    #[serde(rename = "iconURL", default)]
    icon_url: Option<String>,
    #[serde(default)]
    content: Option<RawContent>,
    #[serde(default)]
    properties: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawContent {
    #[serde(default)]
    url: Option<String>,
}

impl CollectionListing {
    fn into_portals(self) -> Vec<Portal> {
        self.collections
            .into_iter()
            .filter_map(|raw| {
                let portal = raw.into_portal();
                if portal.is_none() {
                    tracing::warn!("[directory] Skipping collection without sys:node-uuid");
                }
                portal
            })
            .collect()
    }
}

impl RawCollection {
    fn into_portal(self) -> Option<Portal> {
        let id = first_property(&self.properties, "sys:node-uuid")?;
        let subject_tag = first_property(&self.properties, "ccm:taxonid");
        Some(Portal {
            id,
            title: self.title,
            name: self.name,
            icon_url: self.icon_url,
            content_url: self.content.and_then(|c| c.url),
            subject_tag,
        })
    }
}

/// Repository properties are string arrays; take the first entry.
fn first_property(properties: &HashMap<String, Value>, key: &str) -> Option<String> {
    match properties.get(key)? {
        Value::Array(values) => values.first().and_then(|v| v.as_str()).map(str::to_string),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
    .filter(|s| !s.is_empty())
}

/// Alphabetical presentation order (the directory itself keeps repository order).
pub fn sort_portals_by_title(portals: &mut [Portal]) {
    portals.sort_by_cached_key(|p| p.title.to_lowercase());
}
