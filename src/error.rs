use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ScraperError {
    #[error("invalid category id: {0}")]
    InvalidCategoryId(String),

    #[error("invalid stain pattern {pattern:?} for {stain}: {message}")]
    InvalidPattern {
        stain: String,
        pattern: String,
        message: String,
    },

    #[error("max images ({max}) cannot be less than min images ({min})")]
    #[diagnostic(help("raise --max-images or lower --min-images"))]
    InvalidImageBounds { min: usize, max: usize },

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("request timed out: {0}")]
    HttpTimeout(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("server returned status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("failed to read response body: {0}")]
    BodyRead(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to serialize ledger: {0}")]
    LedgerSerialize(String),

    #[error("logging setup failed: {0}")]
    Logging(String),
}

impl ScraperError {
    /// Faults worth another attempt: the same request may succeed later.
    pub fn is_transient(&self) -> bool {
        match self {
            ScraperError::HttpTimeout(_) | ScraperError::Http(_) | ScraperError::BodyRead(_) => {
                true
            }
            ScraperError::HttpStatus { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}
