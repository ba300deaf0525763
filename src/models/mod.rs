// src/models/mod.rs

//! Domain models for the ingestion service.

mod config;
mod document;
mod entry;
mod feed;
mod source;

pub use config::{
    BackoffConfig, Config, FetcherConfig, IndexConfig, IngestConfig, LoggingConfig, StorageConfig,
};
pub use document::Document;
pub use entry::{Entry, NewEntry, UpsertOutcome};
pub use feed::{FeedItem, ParsedFeed};
pub use source::{CrawlStateUpdate, Source};
