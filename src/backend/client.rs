use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use super::request::SearchRequest;
use super::response::SearchResponse;
use super::retry::RetryPolicy;
use super::transport::{HttpTransport, SearchTransport};
use crate::config::PortalyticsConfig;
use crate::error::{PortalyticsError, Result};

/// Backend query client: serializes requests, retries transient failures
/// and decodes responses into typed shapes at the boundary.
#[derive(Clone)]
pub struct QueryClient {
    transport: Arc<dyn SearchTransport>,
    retry: RetryPolicy,
    pretty: bool,
}

impl QueryClient {
    pub fn new(transport: Arc<dyn SearchTransport>, retry: RetryPolicy) -> Self {
        Self {
            transport,
            retry,
            pretty: true,
        }
    }

    pub fn from_config(config: &PortalyticsConfig) -> Self {
        let transport = HttpTransport::new(&config.backend_url, config.request_timeout);
        Self::new(Arc::new(transport), config.retry_policy())
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Send `request` to `target` and return the raw response document.
    pub async fn query_raw(&self, target: &str, request: &SearchRequest) -> Result<Value> {
        let body = serde_json::to_value(request)?;
        tracing::debug!("[backend] {} <- {}", target, body);

        let transport = Arc::clone(&self.transport);
        let pretty = self.pretty;
        let body = &body;
        self.retry
            .run(target, move || {
                let transport = Arc::clone(&transport);
                async move { transport.search(target, body, pretty).await }
            })
            .await
            .inspect_err(|e| {
                if !matches!(e, PortalyticsError::RetriesExhausted { .. }) {
                    tracing::error!("[backend] Query against {} failed: {}", target, e);
                }
            })
    }

    /// Send `request` and decode hits' `_source` as `S`.
    pub async fn query<S: DeserializeOwned>(
        &self,
        target: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse<S>> {
        let raw = self.query_raw(target, request).await?;
        serde_json::from_value(raw).map_err(|e| PortalyticsError::Decode {
            target: target.to_string(),
            message: e.to_string(),
        })
    }

    /// Number of documents matching `query` (`hits.total.value`).
    pub async fn count(&self, target: &str, query: Option<Value>) -> Result<u64> {
        let mut request = SearchRequest::new().size(0).track_total_hits();
        request.query = query;
        let resp: SearchResponse<Value> = self.query(target, &request).await?;
        Ok(resp.total())
    }
}
