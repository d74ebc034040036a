//! Error types for the scraper engine.

use thiserror::Error;

use crate::catalog::CatalogError;

/// Errors returned by scrape operations.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// No definition or mapping block exists for the requested identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// The matched definition or strategy does not implement the capability.
    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("maximum number of HTTP redirects reached: {0}")]
    MaxRedirectsExceeded(String),

    /// Malformed JSON or unparsable markup.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// GraphQL transport or validation error from a remote catalog.
    #[error("remote protocol error: {0}")]
    RemoteProtocol(String),

    /// Invalid or self-contradictory definition file.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The caller supplied an input that violates the scrape contract.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("HTTP error {status} fetching {url}")]
    Http { status: u16, url: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("subprocess error: {0}")]
    Subprocess(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("scrape cancelled")]
    Cancelled,

    #[error("scrape deadline exceeded")]
    DeadlineExceeded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScrapeError {
    /// Prefix the message of string-carrying variants with context.
    pub fn context(self, prefix: impl std::fmt::Display) -> Self {
        match self {
            ScrapeError::NotFound(m) => ScrapeError::NotFound(format!("{}: {}", prefix, m)),
            ScrapeError::NotSupported(m) => {
                ScrapeError::NotSupported(format!("{}: {}", prefix, m))
            }
            ScrapeError::Transport(m) => ScrapeError::Transport(format!("{}: {}", prefix, m)),
            ScrapeError::Subprocess(m) => ScrapeError::Subprocess(format!("{}: {}", prefix, m)),
            other => other,
        }
    }
}

impl From<reqwest::Error> for ScrapeError {
    fn from(e: reqwest::Error) -> Self {
        let url = e.url().map(|u| u.to_string()).unwrap_or_default();
        if e.is_redirect() {
            return ScrapeError::MaxRedirectsExceeded(url);
        }
        if let Some(status) = e.status() {
            return ScrapeError::Http {
                status: status.as_u16(),
                url,
            };
        }
        ScrapeError::Transport(e.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ScrapeError>;
