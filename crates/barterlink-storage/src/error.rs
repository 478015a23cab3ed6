use thiserror::Error;

/// Errors returned by the object storage client.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// 5xx from the storage service.
    #[error("storage service returned {status}")]
    ServerError { status: u16 },

    /// The storage service refused the request (4xx). Retrying will not help.
    #[error("storage rejected upload with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid storage base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// The object path is empty or escapes the bucket.
    #[error("invalid object path: {0}")]
    InvalidPath(String),
}

impl StorageError {
    /// `true` for failures worth retrying after a back-off delay: timeouts,
    /// connection failures and 5xx responses.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::ServerError { .. } => true,
            Self::Rejected { .. } | Self::InvalidBaseUrl { .. } | Self::InvalidPath(_) => false,
        }
    }
}
