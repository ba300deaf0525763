//! Durable storage of sources and entries.
//!
//! The ingestion pipeline only depends on [`FeedRepository`]; the bundled
//! [`LocalRepository`] keeps everything in a single JSON file.
//!
//! ```text
//! storage/
//! ├── config.toml     # Service configuration
//! └── courier.json    # Sources and entries
//! ```

pub mod local;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CrawlStateUpdate, NewEntry, Source, UpsertOutcome};

pub use local::LocalRepository;

/// Store of registered sources and their entries.
#[async_trait]
pub trait FeedRepository: Send + Sync {
    /// All sources eligible for crawling.
    async fn list_active_sources(&self) -> Result<Vec<Source>>;

    /// Record validators, crawl time and (non-blank) title after a fetch with content.
    async fn update_crawl_state(&self, update: &CrawlStateUpdate) -> Result<Source>;

    /// Insert or replace the entry identified by `(source_id, guid-or-url)`.
    ///
    /// `changed` is true when the entry is new or its fingerprint differs
    /// from the stored one.
    async fn upsert_entry(&self, entry: &NewEntry) -> Result<UpsertOutcome>;
}
