use thiserror::Error;

/// Client-side errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure talking to the API
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    /// A payload did not have the expected shape
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// Statuses that will not change by retrying the same request.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ClientError::Status { status, .. } if matches!(status, 400 | 401 | 403 | 404))
    }
}
