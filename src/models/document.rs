//! Search index documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entry::Entry;
use super::source::Source;

/// Document pushed to the search index for one changed entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Entry id, also the index primary key
    pub id: String,
    pub source_id: String,
    pub source_title: String,
    pub title: String,
    pub content_text: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl Document {
    /// Build a document, or `None` when the entry does not belong to `source`.
    pub fn for_entry(entry: &Entry, source: &Source) -> Option<Self> {
        let fields = &entry.fields;
        if fields.source_id != source.id {
            return None;
        }
        Some(Self {
            id: entry.id.clone(),
            source_id: source.id.clone(),
            source_title: source.title.clone(),
            title: fields.title.clone(),
            content_text: fields.content_text.clone(),
            url: fields.url.clone(),
            published_at: fields.published_at,
        })
    }
}
