// src/services/indexer.rs

//! Search index client.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::{Document, IndexConfig};
use crate::utils::http::create_index_client;

/// Bulk and single-document upserts into the search index.
#[async_trait]
pub trait DocumentIndexer: Send + Sync {
    async fn upsert_batch(&self, documents: &[Document]) -> Result<()>;

    async fn upsert_one(&self, document: &Document) -> Result<()> {
        self.upsert_batch(std::slice::from_ref(document)).await
    }
}

/// [`DocumentIndexer`] for a Meilisearch instance.
///
/// Writes are accepted asynchronously by the engine; a success here means the
/// update task was enqueued.
pub struct MeiliIndexer {
    client: Client,
    base_url: String,
    index: String,
    api_key: Option<String>,
}

impl MeiliIndexer {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let base = url::Url::parse(&config.url)?;
        Ok(Self {
            client: create_index_client(config.timeout_secs)?,
            base_url: base.as_str().trim_end_matches('/').to_string(),
            index: config.name.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    /// Create the index if missing and apply searchable/filterable settings.
    pub async fn ensure_index(&self) -> Result<()> {
        let response = self
            .authorized(self.client.get(self.endpoint("")))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            log::info!("Creating search index {}", self.index);
            let response = self
                .authorized(self.client.post(format!("{}/indexes", self.base_url)))
                .json(&json!({ "uid": self.index, "primaryKey": "id" }))
                .send()
                .await?;
            Self::check(response, "create index").await?;
        } else {
            Self::check(response, "get index").await?;
        }

        let response = self
            .authorized(self.client.patch(self.endpoint("/settings")))
            .json(&json!({
                "searchableAttributes": ["title", "content_text"],
                "filterableAttributes": ["source_id", "published_at"],
            }))
            .send()
            .await?;
        Self::check(response, "update settings").await
    }

    fn endpoint(&self, suffix: &str) -> String {
        format!("{}/indexes/{}{}", self.base_url, self.index, suffix)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn check(response: Response, context: &str) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(AppError::index(context, format!("HTTP {status}: {body}")))
    }
}

#[async_trait]
impl DocumentIndexer for MeiliIndexer {
    async fn upsert_batch(&self, documents: &[Document]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let response = self
            .authorized(self.client.put(self.endpoint("/documents")))
            .query(&[("primaryKey", "id")])
            .json(documents)
            .send()
            .await
            .map_err(|e| AppError::index(format!("upsert {} documents", documents.len()), e))?;
        Self::check(response, &format!("upsert {} documents", documents.len())).await
    }
}
