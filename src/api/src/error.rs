//! Error types for the scrape pipeline.
//!
//! Expected failures (maintenance window, changed page layout, network or
//! navigation trouble) surface as [`ScrapeError::Abort`]; anything else is
//! [`ScrapeError::Unexpected`].

use std::time::Duration;

/// Failures of a single fetch or browser navigation.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    /// HTTP request failed (network, DNS, TLS, timeout, etc.).
    #[error("failed to fetch {url}: {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },

    /// Server returned a non-success HTTP status code.
    #[error("unexpected status {status} for {url}")]
    UnexpectedStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    /// Browser options rejected before launch.
    #[error("invalid browser configuration: {0}")]
    BrowserConfig(String),

    /// Browser launch, page or CDP command failure.
    #[error("browser {context} failed: {source}")]
    Browser {
        context: String,
        source: chromiumoxide::error::CdpError,
    },

    /// A navigation step did not settle in time.
    #[error("browser {context} timed out after {after:?}")]
    Timeout { context: String, after: Duration },

    /// No link with matching visible text on the current page.
    #[error("no link matching /{pattern}/ on {page}")]
    LinkNotFound { pattern: String, page: String },

    /// The racecard index listed no venue announcements.
    #[error("no venue links found on the racecard index")]
    NoVenues,

    /// Local HTML file could not be read.
    #[error("failed to read {path}: {source}")]
    File {
        path: String,
        source: std::io::Error,
    },
}

/// Racecard page did not have the expected layout.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("{0} not found; page structure may have changed")]
    StructureNotFound(&'static str),
}

/// Outcome of a failed scrape call.
#[derive(thiserror::Error, Debug)]
pub enum ScrapeError {
    /// Expected, retry-later condition. Nothing is written.
    #[error("{reason}")]
    Abort {
        reason: String,
        #[source]
        cause: Option<FetchError>,
    },

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl ScrapeError {
    pub fn abort(reason: impl Into<String>) -> Self {
        Self::Abort {
            reason: reason.into(),
            cause: None,
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Abort { .. })
    }
}

impl From<FetchError> for ScrapeError {
    fn from(err: FetchError) -> Self {
        Self::Abort {
            reason: err.to_string(),
            cause: Some(err),
        }
    }
}

impl From<ParseError> for ScrapeError {
    fn from(err: ParseError) -> Self {
        Self::abort(err.to_string())
    }
}
