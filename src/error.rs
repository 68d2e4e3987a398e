use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PortalyticsError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Backend unreachable after {retries} retries ({target}): {last_error}")]
    RetriesExhausted {
        target: String,
        retries: u32,
        last_error: String,
    },

    #[error("Backend rejected request to {target} ({status}): {message}")]
    Rejected {
        target: String,
        status: u16,
        message: String,
    },

    #[error("Unexpected response shape from {target}: {message}")]
    Decode { target: String, message: String },

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Collection directory error: {0}")]
    Directory(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PortalyticsError>;

impl PortalyticsError {
    /// Only connection-level failures are worth repeating verbatim.
    pub fn is_transient(&self) -> bool {
        matches!(self, PortalyticsError::Connection(_))
    }

    /// Fatal for the current refresh cycle (everything except a transient
    /// failure that still has retries left, which never escapes the client).
    pub fn is_fatal(&self) -> bool {
        !self.is_transient()
    }
}

impl From<serde_json::Error> for PortalyticsError {
    fn from(e: serde_json::Error) -> Self {
        PortalyticsError::Json(e.to_string())
    }
}

impl From<reqwest::Error> for PortalyticsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            return PortalyticsError::Connection(e.to_string());
        }
        if e.is_decode() {
            return PortalyticsError::Decode {
                target: e
                    .url()
                    .map(|u| u.path().to_string())
                    .unwrap_or_default(),
                message: e.to_string(),
            };
        }
        PortalyticsError::Rejected {
            target: e
                .url()
                .map(|u| u.path().to_string())
                .unwrap_or_default(),
            status: e.status().map(|s| s.as_u16()).unwrap_or(0),
            message: e.to_string(),
        }
    }
}
