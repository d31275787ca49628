use thiserror::Error;

/// Transport-level failures shared by every collaborator.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} responded with status {status}")]
    Status { status: u16, url: String },
    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
    #[error("invalid service description: {0}")]
    InvalidServiceInfo(#[from] serde_json::Error),
}

impl ServiceError {
    /// Whether repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ServiceError::Status { status, .. } => *status == 429 || *status >= 500,
            ServiceError::RetriesExhausted { .. } | ServiceError::InvalidServiceInfo(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("no match for address '{0}'")]
    NoMatch(String),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[derive(Debug, Error)]
pub enum PointCloudSourceError {
    #[error("no point cloud data available near ({lat}, {lon})")]
    NoDataAvailable { lat: f64, lon: f64 },
    #[error("failed to download dataset {dataset}: {message}")]
    DownloadFailure { dataset: String, message: String },
    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[derive(Debug, Error)]
pub enum ExportFailure {
    /// The requested image exceeds the service's size limit; a smaller
    /// request may succeed.
    #[error("requested image size {width}x{height} exceeds the service limit")]
    SizeLimit { width: u32, height: u32 },
    #[error("image service returned an error: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("failed to store exported image: {0}")]
    Io(#[from] std::io::Error),
    #[error("image export was cancelled")]
    Cancelled,
}
