use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PreviewError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Scrape failed: {0}")]
    ScrapeFailed(String),

    #[error("Too many redirects (limit {0})")]
    TooManyRedirects(usize),

    #[error("Unexpected HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Image decode failed: {0}")]
    ImageDecode(String),

    #[error("Worker pool closed")]
    PoolClosed,

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl PreviewError {
    /// Short label used as a log field and metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            PreviewError::InvalidUrl(_) => "invalid_url",
            PreviewError::ScrapeFailed(_) => "scrape",
            PreviewError::TooManyRedirects(_) => "redirects",
            PreviewError::HttpStatus { .. } => "http_status",
            PreviewError::NetworkError(_) => "network",
            PreviewError::ImageDecode(_) => "image_decode",
            PreviewError::PoolClosed => "pool_closed",
            PreviewError::ConfigurationError(_) => "config",
            PreviewError::IoError(_) => "io",
            PreviewError::SerializationError(_) => "serialization",
        }
    }
}

impl From<std::io::Error> for PreviewError {
    fn from(err: std::io::Error) -> Self {
        PreviewError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for PreviewError {
    fn from(err: serde_json::Error) -> Self {
        PreviewError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for PreviewError {
    fn from(err: reqwest::Error) -> Self {
        PreviewError::NetworkError(err.to_string())
    }
}

impl From<url::ParseError> for PreviewError {
    fn from(err: url::ParseError) -> Self {
        PreviewError::InvalidUrl(err.to_string())
    }
}

impl From<image::ImageError> for PreviewError {
    fn from(err: image::ImageError) -> Self {
        PreviewError::ImageDecode(err.to_string())
    }
}
