//! Parsed feed payloads.

use chrono::{DateTime, Utc};

/// A feed after dialect-specific parsing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub items: Vec<FeedItem>,
}

/// One item of a parsed feed, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedItem {
    pub guid: Option<String>,
    pub link: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    /// Full HTML body (`content:encoded`, Atom `content`)
    pub content: Option<String>,
    /// Summary HTML (`description`, Atom `summary`)
    pub description: Option<String>,
    pub published: Option<DateTime<Utc>>,
}
