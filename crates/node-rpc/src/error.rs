use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Transport failure, timeout or a body that is not JSON-RPC at all.
    #[error("node unavailable: {0}")]
    Unavailable(String),

    /// The node answered with a structured JSON-RPC error.
    #[error("node rejected request ({code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("invalid node response: {0}")]
    InvalidResponse(String),
}

impl NodeError {
    /// Only transport-level failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, NodeError::Unavailable(_))
    }
}

impl From<reqwest::Error> for NodeError {
    fn from(e: reqwest::Error) -> Self {
        NodeError::Unavailable(e.to_string())
    }
}
