use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{PortalyticsError, Result};

/// How many times a request may be repeated after a connection failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCeiling {
    Unbounded,
    Limited(u32),
}

impl RetryCeiling {
    /// Whether another retry is allowed after `retries_so_far` retries.
    pub fn allows(&self, retries_so_far: u32) -> bool {
        match self {
            RetryCeiling::Unbounded => true,
            RetryCeiling::Limited(max) => retries_so_far < *max,
        }
    }
}

impl FromStr for RetryCeiling {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("unbounded") || s.eq_ignore_ascii_case("inf") {
            return Ok(RetryCeiling::Unbounded);
        }
        s.parse::<u32>()
            .map(RetryCeiling::Limited)
            .map_err(|_| format!("expected a retry count or \"unbounded\", got {:?}", s))
    }
}

impl fmt::Display for RetryCeiling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryCeiling::Unbounded => write!(f, "unbounded"),
            RetryCeiling::Limited(n) => write!(f, "{}", n),
        }
    }
}

/// Fixed-delay retry loop shared by the query client and the collection directory.
///
/// Only transient (connection-level) errors are retried. The retry counter
/// lives on the stack of each `run` call, so a success implicitly resets it.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    ceiling: RetryCeiling,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(ceiling: RetryCeiling, delay: Duration) -> Self {
        Self { ceiling, delay }
    }

    pub fn ceiling(&self) -> RetryCeiling {
        self.ceiling
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds, fails non-transiently, or the ceiling is hit.
    pub async fn run<T, F, Fut>(&self, target: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries: u32 = 0;
        loop {
            match op().await {
                Ok(value) => {
                    if retries > 0 {
                        tracing::info!("[backend] {} reachable again after {} retries", target, retries);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() => {
                    if !self.ceiling.allows(retries) {
                        tracing::error!(
                            "[backend] Giving up on {} after {} retries: {}",
                            target,
                            retries,
                            e
                        );
                        return Err(PortalyticsError::RetriesExhausted {
                            target: target.to_string(),
                            retries,
                            last_error: e.to_string(),
                        });
                    }
                    retries += 1;
                    tracing::error!(
                        attempt = retries,
                        ceiling = %self.ceiling,
                        "[backend] Connection error on {}, trying again in {:?}: {}",
                        target,
                        self.delay,
                        e
                    );
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
