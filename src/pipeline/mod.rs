//! Ingestion pipeline.
//!
//! - `Ingestor::run_tick`: one pass over all active sources
//! - `run_scheduler`: periodic ticks until shutdown
//! - `BackoffTracker`: per-source retry windows
//! - `PendingDocuments`: documents awaiting an index flush

pub mod backoff;
pub mod ingest;
pub mod pending;
pub mod schedule;

#[cfg(test)]
pub(crate) mod testing;

pub use backoff::BackoffTracker;
pub use ingest::{IngestSettings, Ingestor, SourceReport, SourceState, TickSummary};
pub use pending::{Checkpoint, PendingDocuments};
pub use schedule::run_scheduler;
