//! Local filesystem repository.
//!
//! Sources and entries live in one JSON document that is rewritten
//! atomically (temp file, then rename) after every mutation. A failed write
//! leaves the in-memory state as it was before the call.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{CrawlStateUpdate, Entry, NewEntry, Source, UpsertOutcome};
use crate::storage::FeedRepository;
use crate::utils::hash::short_id;
use crate::utils::normalize;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RepositoryState {
    #[serde(default)]
    sources: BTreeMap<String, Source>,
    #[serde(default)]
    entries: BTreeMap<String, Entry>,
}

/// JSON-file backed [`FeedRepository`].
pub struct LocalRepository {
    path: PathBuf,
    state: Mutex<RepositoryState>,
}

impl LocalRepository {
    /// Open the repository at `path`, starting empty if the file is missing.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RepositoryState::default(),
            Err(e) => return Err(AppError::Io(e)),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register a feed URL. The URL is canonicalized; registering the same
    /// feed twice is a validation error.
    pub async fn add_source(&self, raw_url: &str) -> Result<Source> {
        let canonical = normalize(raw_url);
        let parsed = url::Url::parse(&canonical)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::validation(format!(
                "unsupported feed scheme: {}",
                parsed.scheme()
            )));
        }

        let mut state = self.state.lock().await;
        if let Some(existing) = state.sources.values().find(|s| s.url == canonical) {
            return Err(AppError::validation(format!(
                "source already registered as {}: {}",
                existing.id, canonical
            )));
        }

        let source = Source::new(short_id(["source", canonical.as_str()]), canonical);
        state.sources.insert(source.id.clone(), source.clone());
        if let Err(e) = self.persist(&state).await {
            state.sources.remove(&source.id);
            return Err(e);
        }

        log::info!("Registered source {} ({})", source.id, source.url);
        Ok(source)
    }

    /// Enable or disable crawling of a source.
    pub async fn set_active(&self, id: &str, active: bool) -> Result<Source> {
        let mut state = self.state.lock().await;
        let source = state
            .sources
            .get_mut(id)
            .ok_or_else(|| AppError::storage(format!("unknown source {id}")))?;
        let previous = source.active;
        source.active = active;
        let updated = source.clone();

        if let Err(e) = self.persist(&state).await {
            if let Some(source) = state.sources.get_mut(id) {
                source.active = previous;
            }
            return Err(e);
        }
        Ok(updated)
    }

    /// All registered sources, active or not.
    pub async fn list_sources(&self) -> Vec<Source> {
        self.state.lock().await.sources.values().cloned().collect()
    }

    /// Entries stored for one source.
    pub async fn list_entries(&self, source_id: &str) -> Vec<Entry> {
        self.state
            .lock()
            .await
            .entries
            .values()
            .filter(|e| e.fields.source_id == source_id)
            .cloned()
            .collect()
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn persist(&self, state: &RepositoryState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl FeedRepository for LocalRepository {
    async fn list_active_sources(&self) -> Result<Vec<Source>> {
        let state = self.state.lock().await;
        Ok(state.sources.values().filter(|s| s.active).cloned().collect())
    }

    async fn update_crawl_state(&self, update: &CrawlStateUpdate) -> Result<Source> {
        let mut state = self.state.lock().await;
        let source = state
            .sources
            .get_mut(&update.source_id)
            .ok_or_else(|| AppError::storage(format!("unknown source {}", update.source_id)))?;
        let previous = source.clone();
        source.apply(update);
        let updated = source.clone();

        if let Err(e) = self.persist(&state).await {
            state.sources.insert(previous.id.clone(), previous);
            return Err(e);
        }
        Ok(updated)
    }

    async fn upsert_entry(&self, entry: &NewEntry) -> Result<UpsertOutcome> {
        let mut state = self.state.lock().await;
        if !state.sources.contains_key(&entry.source_id) {
            return Err(AppError::storage(format!(
                "entry for unknown source {}",
                entry.source_id
            )));
        }
        if entry.identity().is_empty() {
            return Err(AppError::validation(format!(
                "entry {:?} has neither guid nor url",
                entry.title
            )));
        }

        let id = short_id([
            entry.source_id.as_str(),
            entry.identity_kind(),
            entry.identity(),
        ]);
        let stored = Entry {
            id: id.clone(),
            fields: entry.clone(),
        };
        let previous = state.entries.insert(id.clone(), stored.clone());

        if let Err(e) = self.persist(&state).await {
            match previous {
                Some(prev) => state.entries.insert(id, prev),
                None => state.entries.remove(&id),
            };
            return Err(e);
        }

        let inserted = previous.is_none();
        let changed = previous.is_none_or(|prev| prev.fields.fingerprint != entry.fingerprint);
        Ok(UpsertOutcome {
            entry: stored,
            inserted,
            changed,
        })
    }
}
