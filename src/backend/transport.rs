use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::error::{PortalyticsError, Result};

/// One round trip to the search backend. Implementations report
/// connection-level failures as [`PortalyticsError::Connection`] so the
/// retry policy can tell them apart from rejected queries.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    async fn search(&self, target: &str, body: &Value, pretty: bool) -> Result<Value>;
}

/// HTTP transport speaking the `POST /{target}/_search` protocol.
pub struct HttpTransport {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl SearchTransport for HttpTransport {
    async fn search(&self, target: &str, body: &Value, pretty: bool) -> Result<Value> {
        let url = format!("{}/{}/_search", self.base_url, target);

        let mut request = self.http_client.post(&url).json(body);
        if pretty {
            request = request.query(&[("pretty", "true")]);
        }
        let response = request.send().await?;

        let status = response.status();
        if is_unavailable(status) {
            return Err(PortalyticsError::Connection(format!(
                "{} answered {}",
                url, status
            )));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PortalyticsError::Rejected {
                target: target.to_string(),
                status: status.as_u16(),
                message: truncate(&text, 500),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| PortalyticsError::Decode {
                target: target.to_string(),
                message: e.to_string(),
            })
    }
}

/// Gateway/availability statuses mean the backend is not reachable right now.
pub(crate) fn is_unavailable(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 502..=504)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}
