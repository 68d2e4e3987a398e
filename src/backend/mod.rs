//! Backend query client.
//!
//! Requests are plain serializable structs, responses are decoded into
//! typed shapes once at this boundary, and every round trip goes through a
//! fixed-delay [`RetryPolicy`] that repeats connection-level failures up to
//! the configured ceiling.

pub mod client;
pub mod queries;
pub mod request;
pub mod response;
pub mod retry;
pub mod transport;

pub use client::QueryClient;
pub use request::SearchRequest;
pub use response::{AggBucket, Aggregation, Hit, SearchResponse};
pub use retry::{RetryCeiling, RetryPolicy};
pub use transport::{HttpTransport, SearchTransport};
