//! Service layer for the ingestion pipeline.
//!
//! - Conditional feed fetching (`HttpFeedFetcher`)
//! - Feed document parsing (`parse_feed`)
//! - Search index upserts (`MeiliIndexer`)

mod fetcher;
mod indexer;
mod parser;

#[cfg(test)]
mod test_server;

pub use fetcher::{FeedFetcher, FetchResult, HttpFeedFetcher, Validators, parse_retry_after};
pub use indexer::{DocumentIndexer, MeiliIndexer};
pub use parser::parse_feed;
