//! In-memory collaborators for orchestrator tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{AppError, FetchError, Result};
use crate::models::{CrawlStateUpdate, Document, Entry, NewEntry, Source, UpsertOutcome};
use crate::services::{DocumentIndexer, FeedFetcher, FetchResult, Validators};
use crate::storage::FeedRepository;

type Scripted = std::result::Result<FetchResult, FetchError>;

/// Returns queued responses per URL and records every call.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, VecDeque<Scripted>>>,
    hanging: Mutex<HashSet<String>>,
    calls: Mutex<Vec<(String, Validators)>>,
}

impl ScriptedFetcher {
    pub fn push(&self, url: &str, response: Scripted) {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    /// Never answer requests for `url`.
    pub fn hang(&self, url: &str) {
        self.hanging.lock().unwrap().insert(url.to_string());
    }

    pub fn calls(&self) -> Vec<(String, Validators)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, prior: &Validators) -> Scripted {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), prior.clone()));
        let hang = self.hanging.lock().unwrap().contains(url);
        if hang {
            std::future::pending::<()>().await;
        }
        self.responses
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(FetchError::Request(format!("no response scripted for {url}"))))
    }
}

/// Repository with failure injection.
#[derive(Default)]
pub struct MemoryRepository {
    sources: Mutex<Vec<Source>>,
    entries: Mutex<Vec<Entry>>,
    writes: AtomicUsize,
    fail_listing: AtomicBool,
    fail_crawl_state: AtomicBool,
    failing_guids: Mutex<HashSet<String>>,
    misattributed_titles: Mutex<HashSet<String>>,
}

impl MemoryRepository {
    /// Sources with ids from `ids` and URLs `https://{id}.example.com/feed`.
    pub fn with_sources(ids: &[&str]) -> Self {
        let sources = ids
            .iter()
            .map(|id| Source::new(*id, format!("https://{id}.example.com/feed")))
            .collect();
        Self {
            sources: Mutex::new(sources),
            ..Self::default()
        }
    }

    pub fn fail_listing(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }

    pub fn fail_crawl_state(&self) {
        self.fail_crawl_state.store(true, Ordering::SeqCst);
    }

    pub fn fail_upsert_for(&self, guid: &str) {
        self.failing_guids.lock().unwrap().insert(guid.to_string());
    }

    /// Report entries with this title as belonging to another source.
    pub fn misattribute(&self, title: &str) {
        self.misattributed_titles
            .lock()
            .unwrap()
            .insert(title.to_string());
    }

    /// Crawl state updates plus entry upserts that succeeded.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn entries(&self) -> Vec<NewEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.fields.clone())
            .collect()
    }

    pub fn source(&self, id: &str) -> Source {
        self.sources
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .unwrap()
    }
}

#[async_trait]
impl FeedRepository for MemoryRepository {
    async fn list_active_sources(&self) -> Result<Vec<Source>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(AppError::storage("database unavailable"));
        }
        Ok(self.sources.lock().unwrap().clone())
    }

    async fn update_crawl_state(&self, update: &CrawlStateUpdate) -> Result<Source> {
        if self.fail_crawl_state.load(Ordering::SeqCst) {
            return Err(AppError::storage("write rejected"));
        }
        let mut sources = self.sources.lock().unwrap();
        let source = sources
            .iter_mut()
            .find(|s| s.id == update.source_id)
            .ok_or_else(|| AppError::storage("unknown source"))?;
        source.apply(update);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(source.clone())
    }

    async fn upsert_entry(&self, entry: &NewEntry) -> Result<UpsertOutcome> {
        if let Some(guid) = &entry.guid {
            if self.failing_guids.lock().unwrap().contains(guid) {
                return Err(AppError::storage(format!("constraint violation on {guid}")));
            }
        }

        let mut entries = self.entries.lock().unwrap();
        let id = format!(
            "{}:{}:{}",
            entry.source_id,
            entry.identity_kind(),
            entry.identity()
        );
        let stored = Entry {
            id: id.clone(),
            fields: entry.clone(),
        };
        let (inserted, changed) = match entries.iter_mut().find(|e| e.id == id) {
            Some(existing) => {
                let changed = existing.fields.fingerprint != entry.fingerprint;
                *existing = stored.clone();
                (false, changed)
            }
            None => {
                entries.push(stored.clone());
                (true, true)
            }
        };
        self.writes.fetch_add(1, Ordering::SeqCst);

        let mut returned = stored;
        if self.misattributed_titles.lock().unwrap().contains(&entry.title) {
            returned.fields.source_id = "elsewhere".into();
        }
        Ok(UpsertOutcome {
            entry: returned,
            inserted,
            changed,
        })
    }
}

/// Records indexed documents, optionally rejecting batches or documents.
#[derive(Default)]
pub struct RecordingIndexer {
    batches: Mutex<Vec<Vec<Document>>>,
    singles: Mutex<Vec<String>>,
    indexed: Mutex<Vec<Document>>,
    reject_batches: AtomicBool,
    hanging: AtomicBool,
    rejected_titles: Mutex<HashSet<String>>,
}

impl RecordingIndexer {
    pub fn fail_batches(&self) {
        self.reject_batches.store(true, Ordering::SeqCst);
    }

    /// Never answer any upsert.
    pub fn hang(&self) {
        self.hanging.store(true, Ordering::SeqCst);
    }

    pub fn fail_document_titled(&self, title: &str) {
        self.rejected_titles.lock().unwrap().insert(title.to_string());
    }

    /// Titles of each accepted batch.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .map(|b| b.iter().map(|d| d.title.clone()).collect())
            .collect()
    }

    /// Titles of every single-document attempt, successful or not.
    pub fn singles(&self) -> Vec<String> {
        self.singles.lock().unwrap().clone()
    }

    /// Text of every document accepted, in order.
    pub fn indexed_texts(&self) -> Vec<String> {
        self.indexed
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.content_text.clone())
            .collect()
    }
}

#[async_trait]
impl DocumentIndexer for RecordingIndexer {
    async fn upsert_batch(&self, documents: &[Document]) -> Result<()> {
        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.reject_batches.load(Ordering::SeqCst) {
            return Err(AppError::index("batch", "payload too large"));
        }
        self.batches.lock().unwrap().push(documents.to_vec());
        self.indexed.lock().unwrap().extend_from_slice(documents);
        Ok(())
    }

    async fn upsert_one(&self, document: &Document) -> Result<()> {
        self.singles.lock().unwrap().push(document.title.clone());
        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.rejected_titles.lock().unwrap().contains(&document.title) {
            return Err(AppError::index(&document.id, "invalid document"));
        }
        self.indexed.lock().unwrap().push(document.clone());
        Ok(())
    }
}
