//! Elasticsearch backend speaking the REST API through reqwest.

use super::{DocumentStore, SaveOutcome};
use crate::error::StoreError;
use crate::types::VersionDocument;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

/// Connection to one index of an Elasticsearch cluster.
#[derive(Clone)]
pub struct ElasticStore {
    client: reqwest::Client,
    base: Url,
    index: String,
}

#[derive(Deserialize)]
struct WriteResponse {
    #[serde(rename = "_id")]
    id: String,
    result: String,
}

impl ElasticStore {
    pub fn new(base: Url, index: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unreachable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base,
            index: index.into(),
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::Unreachable(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Cluster root request, used by `doctor` to check reachability.
    pub async fn ping(&self) -> Result<String, StoreError> {
        let resp = self.client.get(self.base.clone()).send().await?;
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }
        Ok(body["version"]["number"]
            .as_str()
            .unwrap_or("unknown")
            .to_string())
    }
}

/// Index mapping matching the documents the analysis job reads.
pub fn index_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "id": {
                    "type": "text",
                    "analyzer": "snowball",
                    "fields": { "raw": { "type": "keyword" } }
                },
                "shortversion": { "type": "text" },
                "version": { "type": "text" },
                "date": { "type": "date" },
                "analyzed": { "type": "boolean" }
            }
        }
    })
}

async fn rejected(resp: reqwest::Response) -> StoreError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    StoreError::Rejected { status, body }
}

#[async_trait]
impl DocumentStore for ElasticStore {
    async fn ensure_index(&self) -> Result<(), StoreError> {
        let url = self.url(&[&self.index])?;
        let exists = self.client.head(url.clone()).send().await?;
        match exists.status() {
            s if s.is_success() => return Ok(()),
            StatusCode::NOT_FOUND => {}
            _ => return Err(rejected(exists).await),
        }

        let resp = self.client.put(url).json(&index_mapping()).send().await?;
        if resp.status().is_success() {
            tracing::info!(index = %self.index, "created index");
            return Ok(());
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        // Another writer may have created it in the meantime.
        if status == 400 && body.contains("resource_already_exists_exception") {
            return Ok(());
        }
        Err(StoreError::Rejected { status, body })
    }

    async fn save(&self, doc: &VersionDocument) -> Result<SaveOutcome, StoreError> {
        let url = self.url(&[&self.index, "_doc", &doc.id])?;
        let body = serde_json::to_value(doc)?;
        let resp = self.client.put(url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(rejected(resp).await);
        }
        let written: WriteResponse = resp
            .json()
            .await
            .map_err(|e| StoreError::Unreachable(format!("unreadable write response: {e}")))?;
        tracing::info!(
            index = %self.index,
            id = %written.id,
            result = %written.result,
            "document stored"
        );
        Ok(SaveOutcome {
            id: written.id,
            created: written.result == "created",
        })
    }
}
