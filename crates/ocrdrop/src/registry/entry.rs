use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing status of a tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    New,
    Waiting,
    Processing,
    Done,
    Error,
}

impl FileStatus {
    /// Done and Error are terminal; an entry never leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileStatus::New => write!(f, "New"),
            FileStatus::Waiting => write!(f, "Waiting"),
            FileStatus::Processing => write!(f, "Processing"),
            FileStatus::Done => write!(f, "Done"),
            FileStatus::Error => write!(f, "Error"),
        }
    }
}

/// One tracked file and its processing state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub id: String,
    /// Display name (basename), immutable after admission.
    pub name: String,
    pub path: PathBuf,
    pub status: FileStatus,
    /// Byte size captured at admission; not refreshed afterwards.
    pub size: u64,
    /// Location of the converted artifact, set on Done.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size: Option<u64>,
    pub added_at: DateTime<Utc>,
}

impl FileEntry {
    pub fn new(path: &Path, size: u64) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            path: path.to_path_buf(),
            status: FileStatus::New,
            size,
            output_path: None,
            output_size: None,
            added_at: Utc::now(),
        }
    }

    pub fn size_display(&self) -> String {
        format_size(self.size)
    }
}

/// Renders a byte count as B, KB or MB for display.
pub fn format_size(size_in_bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    if size_in_bytes < 1024 {
        format!("{} B", size_in_bytes)
    } else if size_in_bytes < 1024 * 1024 {
        format!("{:.2} KB", size_in_bytes as f64 / KIB)
    } else {
        format!("{:.2} MB", size_in_bytes as f64 / (KIB * KIB))
    }
}
