// src/services/fetcher.rs

//! Conditional feed fetching.
//!
//! One GET per call, carrying `If-None-Match` / `If-Modified-Since` when the
//! source has validators. Responses are classified so the orchestrator can
//! pick a retry policy without inspecting HTTP details.

use std::error::Error as _;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};

use crate::error::{FetchError, Result};
use crate::models::{FetcherConfig, ParsedFeed};
use crate::utils::http::create_async_client;

use super::parser::parse_feed;

/// Bytes of an unexpected response body kept for the error message.
const ERROR_BODY_LIMIT: usize = 512;

/// Opaque cache validators, persisted verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validators {
    pub fn new(etag: Option<String>, last_modified: Option<String>) -> Self {
        Self {
            etag: etag.filter(|v| !v.is_empty()),
            last_modified: last_modified.filter(|v| !v.is_empty()),
        }
    }

    /// Prefer freshly returned validators, falling back to `prior` per field.
    fn or(self, prior: &Validators) -> Self {
        Self {
            etag: self.etag.or_else(|| prior.etag.clone()),
            last_modified: self.last_modified.or_else(|| prior.last_modified.clone()),
        }
    }
}

/// Successful outcome of one conditional fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    /// Source reported "unchanged".
    NotModified { validators: Validators },

    /// Source returned a body. `feed` is `None` when the body was empty.
    Fetched {
        status: u16,
        feed: Option<ParsedFeed>,
        validators: Validators,
    },
}

impl FetchResult {
    pub fn status(&self) -> u16 {
        match self {
            Self::NotModified { .. } => StatusCode::NOT_MODIFIED.as_u16(),
            Self::Fetched { status, .. } => *status,
        }
    }

    pub fn validators(&self) -> &Validators {
        match self {
            Self::NotModified { validators } | Self::Fetched { validators, .. } => validators,
        }
    }
}

/// Performs conditional feed requests.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        prior: &Validators,
    ) -> std::result::Result<FetchResult, FetchError>;
}

/// [`FeedFetcher`] over HTTP.
pub struct HttpFeedFetcher {
    client: Client,
}

impl HttpFeedFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn classify(
        response: Response,
        prior: &Validators,
    ) -> std::result::Result<FetchResult, FetchError> {
        let status = response.status();
        let returned = Validators::new(
            header_string(&response, ETAG),
            header_string(&response, LAST_MODIFIED),
        );

        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchResult::NotModified {
                validators: returned.or(prior),
            });
        }

        if is_retry_later(status) {
            let retry_after = header_string(&response, RETRY_AFTER)
                .and_then(|v| parse_retry_after(&v, Utc::now()));
            return Err(FetchError::RetryLater {
                status: status.as_u16(),
                retry_after,
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let body = response.text().await.map_err(classify_reqwest_error)?;
        let feed = parse_feed(&body)?;
        Ok(FetchResult::Fetched {
            status: status.as_u16(),
            feed,
            validators: returned.or(prior),
        })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(
        &self,
        url: &str,
        prior: &Validators,
    ) -> std::result::Result<FetchResult, FetchError> {
        let mut request = self.client.get(url);
        if let Some(etag) = &prior.etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = &prior.last_modified {
            request = request.header(IF_MODIFIED_SINCE, last_modified);
        }

        let response = request.send().await.map_err(classify_reqwest_error)?;
        log::debug!("GET {} -> {}", url, response.status());
        Self::classify(response, prior).await
    }
}

/// Rate limiting plus the statuses that signal a temporary server problem.
fn is_retry_later(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::REQUEST_TIMEOUT
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn header_string(response: &Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse `Retry-After` as delta seconds or an HTTP date relative to `now`.
///
/// Dates in the past and unparsable values give no suggestion.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    (at - now).to_std().ok().filter(|d| !d.is_zero())
}

fn classify_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() || err.is_connect() || has_transient_io_cause(&err) {
        return FetchError::Transient(err.to_string());
    }
    if err.is_decode() || err.is_body() {
        return FetchError::Transient(format!("reading body: {err}"));
    }
    FetchError::Request(err.to_string())
}

fn has_transient_io_cause(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::HostUnreachable
                    | io::ErrorKind::NetworkUnreachable
                    | io::ErrorKind::NetworkDown
            );
        }
        source = cause.source();
    }
    false
}

fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((cut, _)) => body[..cut].trim().to_string(),
        None => body.trim().to_string(),
    }
}
