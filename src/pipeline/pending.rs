// src/pipeline/pending.rs

//! Documents awaiting a flush to the search index.

use std::collections::VecDeque;

use crate::models::Document;

/// Queue length at a point in time; see [`PendingDocuments::rollback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

/// Ordered queue of documents accumulated during one tick.
#[derive(Debug, Default)]
pub struct PendingDocuments {
    queue: VecDeque<Document>,
}

impl PendingDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, document: Document) {
        self.queue.push_back(document);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.queue.len())
    }

    /// Discard everything pushed since `checkpoint`, returning how many
    /// documents were dropped. Nothing may be taken from the queue between
    /// the checkpoint and the rollback.
    pub fn rollback(&mut self, checkpoint: Checkpoint) -> usize {
        let dropped = self.queue.len().saturating_sub(checkpoint.0);
        self.queue.truncate(checkpoint.0);
        dropped
    }

    /// Remove up to `n` documents from the front, in order.
    pub fn take(&mut self, n: usize) -> Vec<Document> {
        let n = n.min(self.queue.len());
        self.queue.drain(..n).collect()
    }
}
