//! Click attribution engine.
//!
//! Consumes batches of search-analytics events, merges result clicks into a
//! per-resource aggregate keyed by resource id, and republishes the
//! aggregate grouped by portal. Records go from absent to live on their
//! first click and are never evicted; later clicks merge in place.

pub mod buckets;
pub mod engine;
pub mod event;

pub use buckets::PortalBuckets;
pub use engine::{ClickAttributionEngine, RefreshReport};
pub use event::{ClickEvent, RESULT_CLICK};
