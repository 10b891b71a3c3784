//! Run history: one JSON line per discovery run.
//!
//! When the file reaches its size limit it is shifted to `<name>.1`, older
//! generations move up by one and the oldest beyond `MAX_ROTATIONS` is
//! dropped.

use crate::error::Stage;
use chrono::Utc;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Size at which the run log is rotated.
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Rotated generations kept next to the live file.
const MAX_ROTATIONS: u32 = 5;

/// Outcome of one discovery run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunEntry {
    pub timestamp: String,
    pub host: String,
    pub ok: bool,
    pub failed_stage: Option<Stage>,
    pub version: Option<String>,
    pub document_id: Option<String>,
    pub archive_path: Option<String>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl RunEntry {
    /// Start an entry stamped with the current time.
    pub fn now(host: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            host: host.into(),
            ..Self::default()
        }
    }
}

/// Run history file, appended to after every run.
pub struct RunLog {
    file: File,
    path: PathBuf,
    current_size: u64,
    max_size: u64,
}

impl RunLog {
    /// Open or create the run log file.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            current_size,
            max_size: MAX_LOG_SIZE,
        })
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn append(&mut self, entry: &RunEntry) -> std::io::Result<()> {
        if self.current_size >= self.max_size {
            self.rotate()?;
        }

        let json = serde_json::to_string(entry)?;
        writeln!(self.file, "{json}")?;
        self.current_size += json.len() as u64 + 1;
        Ok(())
    }

    /// Shift every generation up by one and start an empty live file.
    fn rotate(&mut self) -> std::io::Result<()> {
        self.file.flush()?;

        let oldest = rotation_path(&self.path, MAX_ROTATIONS);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }
        for i in (1..MAX_ROTATIONS).rev() {
            let from = rotation_path(&self.path, i);
            if from.exists() {
                std::fs::rename(&from, rotation_path(&self.path, i + 1))?;
            }
        }
        std::fs::rename(&self.path, rotation_path(&self.path, 1))?;

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.current_size = 0;
        Ok(())
    }
}

/// `runs.jsonl` with generation 2 is `runs.jsonl.2`.
fn rotation_path(base: &Path, index: u32) -> PathBuf {
    let name = format!(
        "{}.{index}",
        base.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("runs.jsonl")
    );
    base.with_file_name(name)
}
