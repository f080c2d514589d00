use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors generated in `flowwatch`.
///
/// The aggregation and alarm paths themselves are infallible; these errors only
/// surface at the edges (configuration, channel decoding and socket plumbing).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Error)]
pub enum FlowError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("window must contain at least one bucket")]
    EmptyWindow,

    #[error("bucket unit must be at least one second and fit the maximum window width, got {0}s")]
    InvalidBucketUnit(i64),

    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    #[error("no metric selected for tracking")]
    NoMetricSelected,

    #[error("failed to decode channel record: {0}")]
    Decode(String),

    #[error("SocketError: {0}")]
    Socket(String),
}

impl FlowError {
    /// Determine if an error requires a channel connection to be re-established.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_terminal(&self) -> bool {
        match self {
            FlowError::Socket(error_msg) => {
                let error_lower = error_msg.to_lowercase();
                error_lower.contains("terminated")
                    || error_lower.contains("connectionclosed")
                    || error_lower.contains("alreadyclosed")
                    || error_lower.contains("io(")
                    || error_lower.contains("timeout")
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}
