//! Registered feed sources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered feed endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    /// Stable identifier, never reassigned
    pub id: String,

    /// Feed URL
    pub url: String,

    /// Display title, overwritten only by a non-empty fetched title
    #[serde(default)]
    pub title: String,

    /// Opaque `ETag` validator from the last successful fetch
    #[serde(default)]
    pub etag: Option<String>,

    /// Opaque `Last-Modified` validator from the last successful fetch
    #[serde(default)]
    pub last_modified: Option<String>,

    #[serde(default)]
    pub last_crawled_at: Option<DateTime<Utc>>,

    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Source {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: String::new(),
            etag: None,
            last_modified: None,
            last_crawled_at: None,
            active: true,
        }
    }

    /// Title for display, falling back to the URL for never-crawled sources.
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.url
        } else {
            &self.title
        }
    }

    /// Apply a crawl state update in place.
    pub fn apply(&mut self, update: &CrawlStateUpdate) {
        self.etag = update.etag.clone();
        self.last_modified = update.last_modified.clone();
        self.last_crawled_at = Some(update.crawled_at);
        if let Some(title) = update.title.as_deref().map(str::trim) {
            if !title.is_empty() {
                self.title = title.to_string();
            }
        }
    }
}

/// Crawl state written after a successful fetch with content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlStateUpdate {
    pub source_id: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub crawled_at: DateTime<Utc>,
    /// Fetched feed title; blank or absent keeps the stored one
    pub title: Option<String>,
}
