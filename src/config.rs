use std::str::FromStr;
use std::time::Duration;

use crate::backend::retry::{RetryCeiling, RetryPolicy};
use crate::error::{PortalyticsError, Result};

/// Editorial collections below the repository root node; each child is a portal.
pub const DEFAULT_DIRECTORY_URL: &str = "https://redaktion.openeduhub.net/edu-sharing/rest/collection/v1/collections/local/5e40e372-735c-4b17-bbf7-e827a5702b57/children/collections";

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:9200";
pub const DEFAULT_ANALYTICS_TARGET: &str = "oeh-search-analytics";
pub const DEFAULT_WORKSPACE_TARGET: &str = "workspace";
/// Upper bound for `PORTALYTICS_LOOKBACK_DAYS` (one century).
pub const MAX_LOOKBACK_DAYS: u32 = 36_525;

/// Process-level configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct PortalyticsConfig {
    /// Base URL of the search backend.
    pub backend_url: String,
    /// Retries allowed per request after a connection failure.
    pub max_connection_retries: RetryCeiling,
    /// Fixed delay between two attempts.
    pub retry_delay: Duration,
    /// Width of the initial analytics window, in days.
    pub lookback_days: u32,
    /// Maximum number of events fetched per refresh.
    pub page_size: usize,
    /// Collection directory listing endpoint.
    pub directory_url: String,
    /// Target holding search/click log events.
    pub analytics_target: String,
    /// Target holding resource metadata.
    pub workspace_target: String,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl Default for PortalyticsConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            max_connection_retries: RetryCeiling::Unbounded,
            retry_delay: Duration::from_secs(30),
            lookback_days: 30,
            page_size: 1000,
            directory_url: DEFAULT_DIRECTORY_URL.to_string(),
            analytics_target: DEFAULT_ANALYTICS_TARGET.to_string(),
            workspace_target: DEFAULT_WORKSPACE_TARGET.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl PortalyticsConfig {
    /// Load configuration from `PORTALYTICS_*` environment variables.
    ///
    /// Unset variables fall back to defaults; a variable that is set but
    /// cannot be parsed is a configuration error.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            backend_url: env_or("PORTALYTICS_BACKEND_URL", defaults.backend_url),
            max_connection_retries: env_parse(
                "PORTALYTICS_MAX_CONNECTION_RETRIES",
                defaults.max_connection_retries,
            )?,
            retry_delay: Duration::from_secs(env_parse(
                "PORTALYTICS_RETRY_DELAY_SECS",
                defaults.retry_delay.as_secs(),
            )?),
            lookback_days: env_parse("PORTALYTICS_LOOKBACK_DAYS", defaults.lookback_days)?,
            page_size: env_parse("PORTALYTICS_PAGE_SIZE", defaults.page_size)?,
            directory_url: env_or("PORTALYTICS_DIRECTORY_URL", defaults.directory_url),
            analytics_target: env_or("PORTALYTICS_ANALYTICS_TARGET", defaults.analytics_target),
            workspace_target: env_or("PORTALYTICS_WORKSPACE_TARGET", defaults.workspace_target),
            request_timeout: Duration::from_secs(env_parse(
                "PORTALYTICS_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    /// Config pointing at a local backend with a short retry delay (for tests).
    pub fn for_backend(backend_url: &str) -> Self {
        Self {
            backend_url: backend_url.trim_end_matches('/').to_string(),
            max_connection_retries: RetryCeiling::Limited(2),
            retry_delay: Duration::from_millis(10),
            directory_url: format!("{}/collections", backend_url.trim_end_matches('/')),
            request_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_connection_retries, self.retry_delay)
    }

    fn validate(&self) -> Result<()> {
        if !(self.backend_url.starts_with("http://") || self.backend_url.starts_with("https://")) {
            return Err(PortalyticsError::Config(format!(
                "PORTALYTICS_BACKEND_URL must be an http(s) URL, got: {}",
                self.backend_url
            )));
        }
        if self.lookback_days > MAX_LOOKBACK_DAYS {
            return Err(PortalyticsError::Config(format!(
                "PORTALYTICS_LOOKBACK_DAYS must be at most {}, got: {}",
                MAX_LOOKBACK_DAYS, self.lookback_days
            )));
        }
        if self.page_size == 0 {
            return Err(PortalyticsError::Config(
                "PORTALYTICS_PAGE_SIZE must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
            PortalyticsError::Config(format!("Invalid {}: {}", name, raw))
        }),
        _ => Ok(default),
    }
}
