// src/error.rs

//! Unified error handling for the ingestion service.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for courier operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Feed repository failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Search index failure
    #[error("Index error for {context}: {message}")]
    Index { context: String, message: String },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create an index error with context.
    pub fn index(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Index {
            context: context.into(),
            message: message.to_string(),
        }
    }
}

/// Failure of a single conditional feed fetch.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Source asked us to come back later (rate limit or transient status).
    #[error("retry later: HTTP {status}")]
    RetryLater {
        status: u16,
        retry_after: Option<Duration>,
    },

    /// Network-level fault worth retrying with default backoff.
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// Any other non-success status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Body could not be parsed as a feed.
    #[error("feed parse error: {0}")]
    Parse(String),

    /// Request could not be built or sent for a non-retryable reason.
    #[error("request error: {0}")]
    Request(String),
}

impl FetchError {
    /// HTTP status carried by this failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RetryLater { status, .. } | Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Per-source failure reported by one crawl tick.
///
/// None of these abort the tick. Skipping a source because of an active
/// backoff window is not an error and has no variant here.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Network-layer failure, retried via default backoff.
    #[error("transient fetch failure: {0}")]
    TransientFetch(String),

    /// Server signalled "retry later".
    #[error("retry later (HTTP {status}){}", suggested_suffix(.suggested))]
    RetryLaterFetch {
        status: u16,
        suggested: Option<Duration>,
    },

    /// Parse failure or unexpected status.
    #[error("fetch failed: {message}")]
    FatalFetch {
        status: Option<u16>,
        message: String,
    },

    /// Crawl state could not be written; items were not processed.
    #[error("update crawl state: {0}")]
    CrawlStatePersist(String),

    /// One or more entries failed to upsert; siblings were still processed.
    #[error("{} item upsert(s) failed: {}", .failures.len(), .failures.join("; "))]
    ItemUpsert { failures: Vec<String> },

    /// A bulk index call failed and the fallback path was taken.
    #[error("index batch of {batch_size} failed: {message}")]
    IndexFlush { batch_size: usize, message: String },

    /// A single document failed during fallback; the rest of that flush was abandoned.
    #[error("index document {document_id} failed ({abandoned} abandoned): {message}")]
    IndexDocument {
        document_id: String,
        abandoned: usize,
        message: String,
    },

    /// Unexpected fault while processing one source.
    #[error("source fault: {0}")]
    SourceFault(String),
}

impl IngestError {
    /// Short machine-friendly reason used in tick logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::TransientFetch(_) => "transient fetch",
            Self::RetryLaterFetch { .. } => "retry scheduled",
            Self::FatalFetch { .. } => "fetch failed",
            Self::CrawlStatePersist(_) => "update source",
            Self::ItemUpsert { .. } => "item upsert",
            Self::IndexFlush { .. } | Self::IndexDocument { .. } => "search upsert",
            Self::SourceFault(_) => "fault",
        }
    }
}

impl From<FetchError> for IngestError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::RetryLater {
                status,
                retry_after,
            } => Self::RetryLaterFetch {
                status,
                suggested: retry_after,
            },
            FetchError::Transient(message) => Self::TransientFetch(message),
            other => Self::FatalFetch {
                status: other.status(),
                message: other.to_string(),
            },
        }
    }
}

fn suggested_suffix(suggested: &Option<Duration>) -> String {
    match suggested {
        Some(d) => format!(", server suggested {}s", d.as_secs()),
        None => String::new(),
    }
}
