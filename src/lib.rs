//! # Portalytics
//!
//! Search-click attribution over a content repository's search index.
//!
//! Portalytics polls a search-analytics log for result clicks, merges them
//! into one record per clicked resource, works out which portals (top-level
//! subject collections) each resource lives in, and keeps a per-portal view
//! of the aggregate up to date across polling cycles without reprocessing
//! history.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use portalytics::{ClickAttributionEngine, PortalyticsConfig};
//!
//! # async fn run() -> portalytics::Result<()> {
//! let config = PortalyticsConfig::from_env()?;
//! let mut engine = ClickAttributionEngine::from_config(&config)?;
//!
//! // One polling cycle: fetch new events, merge, regroup by portal.
//! let report = engine.poll().await?;
//! println!("merged {} clicks, checkpoint {}", report.merged, report.checkpoint);
//!
//! for (portal, ids) in engine.buckets().iter() {
//!     println!("{}: {} resources", portal, ids.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Attribute distributions
//!
//! ```rust,no_run
//! use portalytics::aggregation::{AttributeAggregator, FrequencyTable};
//! use portalytics::{PortalyticsConfig, QueryClient};
//!
//! # async fn run() -> portalytics::Result<()> {
//! let config = PortalyticsConfig::from_env()?;
//! let client = QueryClient::from_config(&config);
//! let aggregator = AttributeAggregator::for_materials(client, &config.workspace_target, None);
//!
//! let buckets = aggregator
//!     .distribution("properties.ccm:commonlicense_key.keyword", 10)
//!     .await?;
//! println!("{}", FrequencyTable::from_buckets(&buckets));
//! # Ok(())
//! # }
//! ```

pub mod aggregation;
pub mod attribution;
pub mod backend;
pub mod config;
pub mod directory;
pub mod error;
pub mod quality;
pub mod resolver;
pub mod types;

pub use attribution::{ClickAttributionEngine, RefreshReport};
pub use backend::{QueryClient, RetryCeiling, RetryPolicy, SearchRequest};
pub use config::PortalyticsConfig;
pub use directory::{HttpPortalDirectory, PortalDirectory};
pub use error::{PortalyticsError, Result};
pub use quality::{QualityInspector, QualityReport};
pub use resolver::ResourceResolver;
pub use types::*;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the default log subscriber: `RUST_LOG` filter (default `info`)
/// and a formatting layer. Call once at startup.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
