use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::buckets::PortalBuckets;
use super::event::{term_tally, AttributableClick, ClickEvent};
use crate::backend::{queries, QueryClient, SearchResponse};
use crate::config::PortalyticsConfig;
use crate::directory::{HttpPortalDirectory, PortalDirectory};
use crate::error::Result;
use crate::resolver::ResourceResolver;
use crate::types::{BucketKey, Checkpoint, ClickRecord, Portal, ResolvedInfo};

/// Outcome of one refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Events returned by the backend.
    pub fetched: usize,
    /// Result clicks merged into records.
    pub merged: usize,
    /// Records created in this cycle.
    pub new_records: usize,
    /// Well-formed events with another action tag.
    pub ignored: usize,
    /// Malformed events (no action, no resource id, no timestamp, bad shape).
    pub dropped: usize,
    /// Distinct non-blank search strings in the batch.
    pub distinct_terms: usize,
    pub checkpoint: String,
    pub checkpoint_advanced: bool,
}

/// Incremental search-click attribution.
///
/// Owns the canonical record set (keyed by resource id), the checkpoint,
/// the cached portal list and the per-portal buckets. `refresh` takes
/// `&mut self`, so one engine can never run two refreshes at once.
pub struct ClickAttributionEngine {
    client: QueryClient,
    directory: Arc<dyn PortalDirectory>,
    resolver: ResourceResolver,
    analytics_target: String,
    page_size: usize,
    records: IndexMap<String, ClickRecord>,
    checkpoint: Checkpoint,
    portals: Vec<Portal>,
    buckets: PortalBuckets,
    last_term_tally: HashMap<String, u64>,
}

impl ClickAttributionEngine {
    /// Fails only if `config.lookback_days` cannot be subtracted from now.
    pub fn new(
        client: QueryClient,
        directory: Arc<dyn PortalDirectory>,
        config: &PortalyticsConfig,
    ) -> Result<Self> {
        let resolver = ResourceResolver::new(client.clone(), &config.workspace_target);
        Ok(Self {
            client,
            directory,
            resolver,
            analytics_target: config.analytics_target.clone(),
            page_size: config.page_size,
            records: IndexMap::new(),
            checkpoint: Checkpoint::lookback(Utc::now(), config.lookback_days)?,
            portals: Vec::new(),
            buckets: PortalBuckets::default(),
            last_term_tally: HashMap::new(),
        })
    }

    /// Engine talking HTTP to the configured backend and collection directory.
    pub fn from_config(config: &PortalyticsConfig) -> Result<Self> {
        let client = QueryClient::from_config(config);
        let directory = Arc::new(HttpPortalDirectory::from_config(config));
        Self::new(client, directory, config)
    }

    pub fn with_checkpoint(mut self, checkpoint: Checkpoint) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    /// Refresh from the current checkpoint with the configured page size.
    pub async fn poll(&mut self) -> Result<RefreshReport> {
        self.refresh(None, self.page_size).await
    }

    /// Fetch up to `max_events` events newer than `since` (default: the
    /// checkpoint), merge result clicks into the record set, advance the
    /// checkpoint and rebuild the portal buckets.
    ///
    /// On error nothing is modified: the checkpoint stays put so the same
    /// window is fetched again on the next call, and the previous records
    /// and buckets stay readable.
    pub async fn refresh(&mut self, since: Option<&str>, max_events: usize) -> Result<RefreshReport> {
        let since = since.unwrap_or(self.checkpoint.as_str()).to_string();
        tracing::info!("[attribution] Fetching up to {} events after {}", max_events, since);

        let response: SearchResponse<Value> = self
            .client
            .query(&self.analytics_target, &queries::click_events(&since, max_events))
            .await?;

        let mut report = RefreshReport {
            fetched: response.hits.hits.len(),
            ..Default::default()
        };

        let mut events = Vec::with_capacity(report.fetched);
        for hit in &response.hits.hits {
            match hit.source.as_ref().and_then(ClickEvent::from_source) {
                Some(event) => events.push(event),
                None => {
                    report.dropped += 1;
                    tracing::debug!(
                        "[attribution] Dropping hit {:?}: not an event object",
                        hit.id
                    );
                }
            }
        }

        let tally = term_tally(&events);
        report.distinct_terms = tally.len();

        let mut clicks: Vec<AttributableClick<'_>> = Vec::new();
        for event in &events {
            match event.attributable() {
                Ok(click) => clicks.push(click),
                Err(skip) if skip.is_drop() => {
                    report.dropped += 1;
                    tracing::debug!("[attribution] Dropping event: {}", skip);
                }
                Err(_) => report.ignored += 1,
            }
        }

        let portals = self.directory.list_portals().await?;
        let known_portal_ids: HashSet<String> = portals.iter().map(|p| p.id.clone()).collect();

        let mut resolved = self.resolve_new(&clicks, &known_portal_ids).await;
        report.new_records = resolved.len();

        // Nothing below can fail: from here on the cycle commits as a whole.
        self.portals = portals;
        for click in &clicks {
            self.merge(click, &mut resolved);
        }
        report.merged = clicks.len();

        let newest = events.iter().filter_map(|e| e.timestamp.as_deref()).max();
        if let Some(newest) = newest {
            report.checkpoint_advanced = self.checkpoint.advance_to(newest);
        }
        report.checkpoint = self.checkpoint.to_string();

        self.buckets = PortalBuckets::rebuild(&self.records);
        self.last_term_tally = tally;

        tracing::info!(
            fetched = report.fetched,
            merged = report.merged,
            new_records = report.new_records,
            ignored = report.ignored,
            dropped = report.dropped,
            live_records = self.records.len(),
            checkpoint = %self.checkpoint,
            "[attribution] Refresh complete"
        );
        Ok(report)
    }

    /// Resolve every resource id in `clicks` that has no live record yet,
    /// once each, in first-seen order.
    async fn resolve_new(
        &self,
        clicks: &[AttributableClick<'_>],
        known_portal_ids: &HashSet<String>,
    ) -> IndexMap<String, ResolvedInfo> {
        let mut resolved = IndexMap::new();
        for click in clicks {
            if self.records.contains_key(click.resource_id)
                || resolved.contains_key(click.resource_id)
            {
                continue;
            }
            tracing::info!(
                "[attribution] {} not present, creating entry",
                click.resource_id
            );
            let info = self
                .resolver
                .resolve(click.resource_id, known_portal_ids)
                .await;
            resolved.insert(click.resource_id.to_string(), info);
        }
        resolved
    }

    fn merge(&mut self, click: &AttributableClick<'_>, resolved: &mut IndexMap<String, ResolvedInfo>) {
        if let Some(record) = self.records.get_mut(click.resource_id) {
            tracing::debug!("[attribution] {} present, updating", click.resource_id);
            record.merge_click(click.search_string, click.timestamp);
            return;
        }
        let info = resolved
            .shift_remove(click.resource_id)
            .unwrap_or_default();
        let record = ClickRecord::new(
            click.resource_id,
            info,
            click.search_string,
            click.timestamp,
        );
        self.records.insert(click.resource_id.to_string(), record);
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    /// Operator override; the only way to move the checkpoint backwards.
    pub fn set_checkpoint(&mut self, timestamp: &str) {
        tracing::warn!(
            "[attribution] Checkpoint overridden: {} -> {}",
            self.checkpoint,
            timestamp
        );
        self.checkpoint = Checkpoint::new(timestamp);
    }

    pub fn record(&self, resource_id: &str) -> Option<&ClickRecord> {
        self.records.get(resource_id)
    }

    /// Live records in first-seen order.
    pub fn records(&self) -> impl Iterator<Item = &ClickRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn buckets(&self) -> &PortalBuckets {
        &self.buckets
    }

    /// Records filed under `key`, most recent click first.
    pub fn bucket_records(&self, key: &BucketKey) -> Vec<&ClickRecord> {
        self.buckets
            .get(key)
            .unwrap_or_default()
            .iter()
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    /// Every live record once, most recent click first.
    pub fn records_by_last_click(&self) -> Vec<&ClickRecord> {
        let mut all: Vec<&ClickRecord> = self.records.values().collect();
        all.sort_by(|a, b| b.last_seen_timestamp.cmp(&a.last_seen_timestamp));
        all
    }

    /// Portals from the last successful refresh, in repository order.
    pub fn portals(&self) -> &[Portal] {
        &self.portals
    }

    pub fn portal(&self, id: &str) -> Option<&Portal> {
        self.portals.iter().find(|p| p.id == id)
    }

    /// Raw term frequencies of the last batch.
    pub fn last_term_tally(&self) -> &HashMap<String, u64> {
        &self.last_term_tally
    }

    /// The `n` most frequent terms of the last batch, ties alphabetical.
    pub fn top_terms(&self, n: usize) -> Vec<(&str, u64)> {
        let mut terms: Vec<(&str, u64)> = self
            .last_term_tally
            .iter()
            .map(|(term, count)| (term.as_str(), *count))
            .collect();
        terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        terms.truncate(n);
        terms
    }
}
