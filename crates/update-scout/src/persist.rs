//! Recording a discovered update: the version document and the release notes.
//!
//! The two writes are independent. A failed archive after a successful
//! persist leaves the document in the store; nothing is rolled back.

use crate::error::{ArchiveError, StoreError};
use crate::session::DriverSession;
use crate::store::{DocumentStore, WriteMode};
use crate::types::{UpdateRecord, UpdateVersion, VersionDocument};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// File name the release notes of a version are archived under.
pub fn archive_file_name(version: &UpdateVersion) -> String {
    format!("Updates_{version}.html")
}

pub struct RecordPersister {
    store: Arc<dyn DocumentStore>,
    mode: WriteMode,
    download_dir: PathBuf,
    create_index: bool,
}

impl RecordPersister {
    pub fn new(store: Arc<dyn DocumentStore>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            mode: WriteMode::default(),
            download_dir: download_dir.into(),
            create_index: true,
        }
    }

    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_create_index(mut self, create_index: bool) -> Self {
        self.create_index = create_index;
        self
    }

    /// Store a new version document for the record.
    pub async fn persist(&self, record: &UpdateRecord) -> Result<VersionDocument, StoreError> {
        if self.create_index {
            self.store.ensure_index().await?;
        }

        let id = match self.mode {
            WriteMode::Append => Uuid::new_v4().to_string(),
            WriteMode::UpsertByVersion => record.version.to_string(),
        };
        let doc = VersionDocument::from_record(id, record);
        let outcome = self.store.save(&doc).await?;
        if !outcome.created {
            tracing::info!(version = %doc.version, "replaced existing document");
        }
        Ok(doc)
    }

    /// Load the record's release notes in the session and write the page to
    /// `Updates_<version>.html` in the download directory.
    ///
    /// The page is written to a hidden sibling first and renamed into place,
    /// so the final name only ever holds a complete file. An existing file
    /// is replaced.
    pub async fn archive(
        &self,
        record: &UpdateRecord,
        session: &mut DriverSession,
    ) -> Result<PathBuf, ArchiveError> {
        session
            .open(record.download_link.as_str())
            .await
            .map_err(ArchiveError::Fetch)?;
        let source = session
            .driver()
            .page_source()
            .await
            .map_err(ArchiveError::Fetch)?;

        let name = archive_file_name(&record.version);
        let path = self.download_dir.join(&name);
        let partial = self.download_dir.join(format!(".{name}.part"));

        tokio::fs::write(&partial, source.as_bytes())
            .await
            .map_err(|source| ArchiveError::Write {
                path: partial.clone(),
                source,
            })?;
        if let Err(source) = tokio::fs::rename(&partial, &path).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(ArchiveError::Write { path, source });
        }

        tracing::info!(path = %path.display(), bytes = source.len(), "release notes archived");
        Ok(path)
    }
}
