use thiserror::Error;

/// Application-wide error types for calcrawl.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed (fetching a listing or detail page).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request or navigation timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Headless browser failed to launch, navigate, or evaluate a script.
    #[error("Browser error: {0}")]
    BrowserError(String),

    /// Detail page had no usable title.
    #[error("Unable to find title for {url}")]
    MissingTitle { url: String },

    /// Detail page had no date text at all.
    #[error("Unable to find date for {url}")]
    MissingDate { url: String },

    /// Date text was present but no date could be recognised in it.
    #[error("Could not find a date in '{0}'")]
    NoDateFound(String),

    /// Configured IANA time zone is unknown.
    #[error("Invalid time zone: {0}")]
    InvalidTimezone(String),

    /// HTML-to-Markdown conversion failed.
    #[error("Cleaner error: {0}")]
    CleanerError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The ingestion channel was closed before the event could be sent.
    #[error("Ingestion channel closed")]
    ChannelClosed,

    /// Work was abandoned because shutdown was requested.
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true for network/page-load failures. The unit of work (page or
    /// event) is skipped and its siblings continue.
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            AppError::HttpError(_)
                | AppError::NetworkError(_)
                | AppError::Timeout(_)
                | AppError::BrowserError(_)
        )
    }

    /// Returns true when the page loaded but an event could not be recovered
    /// from it. The event is dropped.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            AppError::MissingTitle { .. } | AppError::MissingDate { .. } | AppError::NoDateFound(_)
        )
    }
}
