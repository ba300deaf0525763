//! Feed entries and their derivation from parsed items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::feed::FeedItem;
use crate::utils::{Fingerprint, clean, fingerprint, normalize};

/// A persisted entry belonging to one source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entry {
    pub id: String,
    #[serde(flatten)]
    pub fields: NewEntry,
}

/// Entry attributes as derived from a feed item, ready for upsert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewEntry {
    pub source_id: String,

    /// Authoritative identity when present
    #[serde(default)]
    pub guid: Option<String>,

    /// Canonical URL
    pub url: String,

    pub title: String,

    #[serde(default)]
    pub author: Option<String>,

    pub content_html: String,

    /// Sanitized text, bounded in length
    pub content_text: String,

    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,

    pub retrieved_at: DateTime<Utc>,

    pub fingerprint: Fingerprint,
}

impl NewEntry {
    /// Derive an entry from a parsed feed item.
    ///
    /// The HTML body prefers the item's full content over its description;
    /// when the body reduces to no text the description is sanitized instead.
    pub fn from_feed_item(
        source_id: &str,
        item: &FeedItem,
        retrieved_at: DateTime<Utc>,
        max_text_len: usize,
    ) -> Self {
        let guid = non_blank(item.guid.as_deref()).map(String::from);
        let author = non_blank(item.author.as_deref()).map(String::from);
        let title = item.title.as_deref().unwrap_or_default().trim().to_string();
        let url = normalize(item.link.as_deref().unwrap_or_default());

        let description = item.description.as_deref().unwrap_or_default();
        let content_html = non_blank(item.content.as_deref())
            .unwrap_or(description.trim())
            .to_string();

        let mut content_text = clean(&content_html, max_text_len);
        if content_text.is_empty() {
            content_text = clean(description, max_text_len);
        }

        let fingerprint = fingerprint([
            source_id,
            guid.as_deref().unwrap_or_default(),
            &url,
            &title,
            &content_text,
        ]);

        Self {
            source_id: source_id.to_string(),
            guid,
            url,
            title,
            author,
            content_html,
            content_text,
            published_at: item.published,
            retrieved_at,
            fingerprint,
        }
    }

    /// Upsert identity within the source: GUID if supplied, else canonical URL.
    pub fn identity(&self) -> &str {
        self.guid.as_deref().unwrap_or(&self.url)
    }

    /// Which field [`identity`](Self::identity) came from, so that a GUID
    /// spelled like another item's URL keys a different entry.
    pub fn identity_kind(&self) -> &'static str {
        if self.guid.is_some() { "guid" } else { "url" }
    }

    /// Label for log lines.
    pub fn label(&self) -> &str {
        if self.title.is_empty() {
            self.identity()
        } else {
            &self.title
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Result of one repository upsert.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub entry: Entry,
    pub inserted: bool,
    /// Newly inserted, or stored fingerprint differed
    pub changed: bool,
}
