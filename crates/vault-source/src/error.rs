//! Source error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Business-level rejection; `message` is the server text, unmodified.
    #[error("{message}")]
    Rejected { code: String, message: String },

    #[error("Response decode error: {0}")]
    Decode(String),

    #[error("Page limit of {max_pages} reached before the end of the list")]
    PageLimit { max_pages: u32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SourceResult<T> = Result<T, SourceError>;
