// src/pipeline/ingest.rs

//! Crawl tick orchestration.
//!
//! One tick walks the active sources sequentially: skip sources inside a
//! backoff window, fetch the rest conditionally, persist crawl state, upsert
//! entries, and queue documents for entries whose fingerprint changed.
//! Queued documents are flushed to the index in fixed-size batches, falling
//! back to one-at-a-time upserts when a batch is rejected.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::StatusCode;
use tokio::time::{Instant, timeout_at};

use super::backoff::BackoffTracker;
use super::pending::PendingDocuments;
use crate::error::{AppError, FetchError, IngestError, Result};
use crate::models::{CrawlStateUpdate, Document, IngestConfig, NewEntry, Source};
use crate::services::{DocumentIndexer, FeedFetcher, FetchResult, Validators};
use crate::storage::FeedRepository;

/// Tunables for one [`Ingestor`].
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub batch_size: usize,
    pub max_text_len: usize,
}

impl From<&IngestConfig> for IngestSettings {
    fn from(config: &IngestConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_text_len: config.max_text_len,
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

/// Terminal state of one source within a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceState {
    /// Inside a backoff window; not fetched.
    Skipped { retry_in: Duration },
    /// Fetch failed; the next attempt waits `retry_in`.
    FetchFailed { retry_in: Duration },
    /// Source reported no change.
    NotModified,
    /// Success without a feed body.
    NoContent,
    /// Crawl state could not be written; no items were processed.
    PersistFailed,
    /// Crawl state persisted and `items` entries processed.
    Mutated { items: usize, enqueued: usize },
    /// Processing was aborted by an unexpected fault.
    Faulted { discarded: usize },
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped { .. } => f.write_str("skipped"),
            Self::FetchFailed { .. } => f.write_str("fetch failed"),
            Self::NotModified => f.write_str("not modified"),
            Self::NoContent => f.write_str("no content"),
            Self::PersistFailed => f.write_str("persist failed"),
            Self::Mutated { .. } => f.write_str("mutated"),
            Self::Faulted { .. } => f.write_str("faulted"),
        }
    }
}

/// Outcome of one source within a tick.
#[derive(Debug)]
pub struct SourceReport {
    pub source_id: String,
    pub url: String,
    pub status: Option<u16>,
    pub state: SourceState,
    pub errors: Vec<IngestError>,
}

impl SourceReport {
    fn new(source: &Source, status: Option<u16>, state: SourceState) -> Self {
        Self {
            source_id: source.id.clone(),
            url: source.url.clone(),
            status,
            state,
            errors: Vec::new(),
        }
    }

    fn with_error(mut self, error: IngestError) -> Self {
        self.errors.push(error);
        self
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self.state,
            SourceState::FetchFailed { .. } | SourceState::PersistFailed | SourceState::Faulted { .. }
        )
    }

    fn retry_in(&self) -> Option<Duration> {
        match self.state {
            SourceState::Skipped { retry_in } | SourceState::FetchFailed { retry_in } => {
                Some(retry_in)
            }
            _ => None,
        }
    }

    fn log(&self) {
        let status = self.status.map(|s| s.to_string()).unwrap_or_else(|| "-".into());
        let retry = self
            .retry_in()
            .map(|d| format!(" retry_in={}s", d.as_secs()))
            .unwrap_or_default();

        match &self.state {
            SourceState::Skipped { .. } => {
                log::info!("Feed skipped {} ({}): backoff active{}", self.source_id, self.url, retry);
            }
            SourceState::Mutated { items, enqueued } if self.errors.is_empty() => {
                log::info!(
                    "Feed processed {} ({}): status={} items={} enqueued={}",
                    self.source_id,
                    self.url,
                    status,
                    items,
                    enqueued
                );
            }
            SourceState::NotModified | SourceState::NoContent => {
                log::info!(
                    "Feed processed {} ({}): status={} {}",
                    self.source_id,
                    self.url,
                    status,
                    self.state
                );
            }
            state => {
                for error in &self.errors {
                    log::error!(
                        "Feed error {} ({}): {} status={} reason={}{}: {}",
                        self.source_id,
                        self.url,
                        state,
                        status,
                        error.reason(),
                        retry,
                        error
                    );
                }
            }
        }
    }
}

/// Result of one crawl tick.
#[derive(Debug, Default)]
pub struct TickSummary {
    pub reports: Vec<SourceReport>,
    /// Sources fetched without a source-level failure
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Sources not reached before the deadline
    pub unvisited: usize,
    /// Documents confirmed by the index
    pub indexed: usize,
    /// Documents given up on this tick
    pub abandoned: usize,
    /// Index failures; these are not tied to a single source
    pub index_errors: Vec<IngestError>,
}

impl TickSummary {
    fn record(&mut self, report: SourceReport) {
        match report.state {
            SourceState::Skipped { .. } => self.skipped += 1,
            _ if report.is_failure() => self.failed += 1,
            _ => self.processed += 1,
        }
        self.reports.push(report);
    }

    pub fn log(&self) {
        log::info!(
            "Tick complete: processed={} skipped={} failed={} unvisited={} indexed={} abandoned={}",
            self.processed,
            self.skipped,
            self.failed,
            self.unvisited,
            self.indexed,
            self.abandoned
        );
    }
}

#[derive(Debug, Default)]
struct FlushOutcome {
    indexed: usize,
    abandoned: usize,
    errors: Vec<IngestError>,
}

/// Drives crawl ticks. Owns the backoff state and the pending document queue.
pub struct Ingestor {
    repository: Arc<dyn FeedRepository>,
    fetcher: Arc<dyn FeedFetcher>,
    indexer: Arc<dyn DocumentIndexer>,
    backoff: BackoffTracker,
    pending: PendingDocuments,
    settings: IngestSettings,
}

impl Ingestor {
    pub fn new(
        repository: Arc<dyn FeedRepository>,
        fetcher: Arc<dyn FeedFetcher>,
        indexer: Arc<dyn DocumentIndexer>,
        backoff: BackoffTracker,
        settings: IngestSettings,
    ) -> Self {
        Self {
            repository,
            fetcher,
            indexer,
            backoff,
            pending: PendingDocuments::new(),
            settings: IngestSettings {
                batch_size: settings.batch_size.max(1),
                ..settings
            },
        }
    }

    pub fn backoff(&self) -> &BackoffTracker {
        &self.backoff
    }

    /// Run one tick. Network and index calls are bounded by `deadline`.
    ///
    /// Only a failure to list sources is returned as `Err`; everything else
    /// is reported per source in the summary.
    pub async fn run_tick(&mut self, deadline: Instant) -> Result<TickSummary> {
        log::info!("Crawl tick");
        let sources = self.repository.list_active_sources().await.map_err(|e| {
            log::error!("List sources failed: {e}");
            e
        })?;

        let mut summary = TickSummary::default();
        for (position, source) in sources.iter().enumerate() {
            if Instant::now() >= deadline {
                summary.unvisited = sources.len() - position;
                log::warn!(
                    "Tick deadline reached; {} source(s) not visited",
                    summary.unvisited
                );
                break;
            }

            let report = self.supervise(source, deadline).await;
            report.log();
            summary.record(report);

            while self.pending.len() >= self.settings.batch_size {
                let batch = self.pending.take(self.settings.batch_size);
                self.flush(batch, deadline, &mut summary).await;
            }
        }

        while !self.pending.is_empty() {
            let batch = self.pending.take(self.settings.batch_size);
            self.flush(batch, deadline, &mut summary).await;
        }

        summary.log();
        Ok(summary)
    }

    /// Process one source, turning a fault into a report and discarding the
    /// documents the source queued before it.
    async fn supervise(&mut self, source: &Source, deadline: Instant) -> SourceReport {
        let checkpoint = self.pending.checkpoint();
        match self.process_source(source, deadline).await {
            Ok(report) => report,
            Err(fault) => {
                let discarded = self.pending.rollback(checkpoint);
                SourceReport::new(source, None, SourceState::Faulted { discarded })
                    .with_error(fault)
            }
        }
    }

    async fn process_source(
        &mut self,
        source: &Source,
        deadline: Instant,
    ) -> std::result::Result<SourceReport, IngestError> {
        let retry_in = self.backoff.remaining(&source.id, Utc::now());
        if !retry_in.is_zero() {
            return Ok(SourceReport::new(source, None, SourceState::Skipped { retry_in }));
        }

        let prior = Validators::new(source.etag.clone(), source.last_modified.clone());
        let fetched = timeout_at(deadline, self.fetcher.fetch(&source.url, &prior))
            .await
            .unwrap_or_else(|_| {
                Err(FetchError::Transient(
                    "tick deadline elapsed during fetch".into(),
                ))
            });

        let result = match fetched {
            Ok(result) => result,
            Err(err) => {
                let status = err.status();
                let err = IngestError::from(err);
                let suggested = match &err {
                    IngestError::RetryLaterFetch { suggested, .. } => *suggested,
                    _ => None,
                };
                let retry_in = self.backoff.schedule(&source.id, Utc::now(), suggested);
                return Ok(
                    SourceReport::new(source, status, SourceState::FetchFailed { retry_in })
                        .with_error(err),
                );
            }
        };

        self.backoff.reset(&source.id);

        let (status, feed, validators) = match result {
            FetchResult::NotModified { .. } => {
                return Ok(SourceReport::new(
                    source,
                    Some(StatusCode::NOT_MODIFIED.as_u16()),
                    SourceState::NotModified,
                ));
            }
            FetchResult::Fetched {
                status,
                feed,
                validators,
            } => (status, feed, validators),
        };
        let Some(feed) = feed else {
            return Ok(SourceReport::new(source, Some(status), SourceState::NoContent));
        };

        let update = CrawlStateUpdate {
            source_id: source.id.clone(),
            etag: validators.etag,
            last_modified: validators.last_modified,
            crawled_at: Utc::now(),
            title: feed.title.clone(),
        };
        let source = match self.repository.update_crawl_state(&update).await {
            Ok(updated) if updated.id == source.id => updated,
            Ok(other) => {
                return Err(IngestError::SourceFault(format!(
                    "crawl state update for {} returned source {}",
                    source.id, other.id
                )));
            }
            Err(e) => {
                return Ok(
                    SourceReport::new(source, Some(status), SourceState::PersistFailed)
                        .with_error(IngestError::CrawlStatePersist(e.to_string())),
                );
            }
        };

        let retrieved_at = Utc::now();
        let mut failures = Vec::new();
        let mut enqueued = 0;
        for item in &feed.items {
            let entry =
                NewEntry::from_feed_item(&source.id, item, retrieved_at, self.settings.max_text_len);
            let outcome = match self.repository.upsert_entry(&entry).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::warn!("Upsert failed for {} in {}: {}", entry.label(), source.id, e);
                    failures.push(format!("{}: {}", entry.label(), e));
                    continue;
                }
            };
            if !outcome.changed {
                continue;
            }
            let document = Document::for_entry(&outcome.entry, &source).ok_or_else(|| {
                IngestError::SourceFault(format!(
                    "entry {} belongs to source {}, not {}",
                    outcome.entry.id, outcome.entry.fields.source_id, source.id
                ))
            })?;
            self.pending.push(document);
            enqueued += 1;
        }

        let state = SourceState::Mutated {
            items: feed.items.len(),
            enqueued,
        };
        let report = SourceReport::new(&source, Some(status), state);
        Ok(if failures.is_empty() {
            report
        } else {
            report.with_error(IngestError::ItemUpsert { failures })
        })
    }

    /// Push one batch; on rejection, upsert one at a time in order and stop
    /// at the first document that fails.
    async fn flush(&self, batch: Vec<Document>, deadline: Instant, summary: &mut TickSummary) {
        let outcome = self.flush_batch(&batch, deadline).await;
        summary.indexed += outcome.indexed;
        summary.abandoned += outcome.abandoned;
        summary.index_errors.extend(outcome.errors);
    }

    async fn flush_batch(&self, batch: &[Document], deadline: Instant) -> FlushOutcome {
        log::info!("Flush search batch: batch_size={}", batch.len());
        let bulk = bounded(deadline, self.indexer.upsert_batch(batch)).await;
        let Err(bulk_error) = bulk else {
            return FlushOutcome {
                indexed: batch.len(),
                ..FlushOutcome::default()
            };
        };

        log::error!(
            "Flush search batch failed: batch_size={}: {}",
            batch.len(),
            bulk_error
        );
        let mut outcome = FlushOutcome::default();
        outcome.errors.push(IngestError::IndexFlush {
            batch_size: batch.len(),
            message: bulk_error.to_string(),
        });

        for (position, document) in batch.iter().enumerate() {
            if let Err(e) = bounded(deadline, self.indexer.upsert_one(document)).await {
                let rest = &batch[position + 1..];
                log::error!(
                    "Fallback search upsert failed for {}: {}; abandoned this tick: [{}]",
                    document.id,
                    e,
                    rest.iter().map(|d| d.id.as_str()).collect::<Vec<_>>().join(", ")
                );
                outcome.abandoned = batch.len() - position;
                outcome.errors.push(IngestError::IndexDocument {
                    document_id: document.id.clone(),
                    abandoned: outcome.abandoned,
                    message: e.to_string(),
                });
                break;
            }
            outcome.indexed += 1;
        }
        outcome
    }
}

/// Apply the tick deadline to an index call.
async fn bounded<F>(deadline: Instant, call: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    timeout_at(deadline, call)
        .await
        .unwrap_or_else(|_| Err(AppError::index("flush", "tick deadline elapsed")))
}
