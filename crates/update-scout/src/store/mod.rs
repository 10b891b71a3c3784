//! Document store abstraction for version metadata.
//!
//! Defines the `DocumentStore` trait implemented by the Elasticsearch REST
//! backend and by an in-memory store used when no index is needed.

pub mod elastic;

use crate::error::StoreError;
use crate::types::VersionDocument;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Index holding one document per discovered update.
pub const UPDATE_INDEX: &str = "update-details";

/// How repeated discoveries of the same version are recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Every run inserts a new document under a fresh id.
    #[default]
    Append,
    /// The version is the document id; rediscovery replaces the document.
    UpsertByVersion,
}

/// Result of a single save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    pub id: String,
    /// `false` when an existing document was replaced.
    pub created: bool,
}

/// A place version documents are written to.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Make sure the index exists with the expected mapping.
    async fn ensure_index(&self) -> Result<(), StoreError>;
    /// Store a document under its `id`, replacing any document with that id.
    async fn save(&self, doc: &VersionDocument) -> Result<SaveOutcome, StoreError>;
}

/// A store that keeps documents in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<Vec<VersionDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of stored documents in insertion order.
    pub async fn documents(&self) -> Vec<VersionDocument> {
        self.docs.lock().await.clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ensure_index(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn save(&self, doc: &VersionDocument) -> Result<SaveOutcome, StoreError> {
        let mut docs = self.docs.lock().await;
        let created = match docs.iter_mut().find(|d| d.id == doc.id) {
            Some(existing) => {
                *existing = doc.clone();
                false
            }
            None => {
                docs.push(doc.clone());
                true
            }
        };
        Ok(SaveOutcome {
            id: doc.id.clone(),
            created,
        })
    }
}
