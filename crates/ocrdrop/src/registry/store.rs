use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::DocumentFormat;
use crate::registry::entry::{FileEntry, FileStatus};

/// Delay between size polls while a file is still being written.
const SIZE_POLL_DELAY: Duration = Duration::from_millis(100);
/// Size polls allowed before admission is abandoned.
const SIZE_POLL_BUDGET: u32 = 10;

/// Change notification fanned out to subscribers. Carries no entry data;
/// observers re-pull state through the snapshot accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEvent {
    Added,
    StatusChanged,
    Cleared,
}

/// Thread-safe registry of tracked files. The lock guards only in-memory
/// mutation; it is never held across filesystem or subprocess calls.
pub struct FileRegistry {
    entries: Mutex<Vec<FileEntry>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl FileRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            entries: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Registers an observer. A receiver that lags or is dropped never
    /// affects the registry or other subscribers.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: RegistryEvent) {
        // Send only errors when nobody is listening, which is fine.
        let _ = self.events.send(event);
    }

    fn lock_entries(&self) -> MutexGuard<'_, Vec<FileEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admits a file into the queue. Paths that do not exist or lack a
    /// recognized document extension are ignored. Admission waits, within
    /// a fixed budget, for the file size to become non-zero so a file
    /// still being written is not picked up half-way.
    ///
    /// A path that already has a live (non-terminal) entry is rejected:
    /// a modification to a file that was already admitted is not a new
    /// file. Once the earlier entry is terminal the path can be admitted
    /// again, covering a genuinely re-created file.
    pub fn add_file(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();

        if !path.is_file() {
            debug!(path = %path.display(), "ignoring path: not a regular file");
            return;
        }

        if DocumentFormat::from_path(path).is_none() {
            debug!(path = %path.display(), "ignoring path: unsupported extension");
            return;
        }

        let Some(size) = wait_for_nonzero_size(path) else {
            error!(path = %path.display(), "file size never stabilized, admission abandoned");
            return;
        };

        let entry = FileEntry::new(path, size);
        let name = entry.name.clone();
        let size_display = entry.size_display();

        let admitted = {
            let mut entries = self.lock_entries();
            if entries
                .iter()
                .any(|e| e.path == entry.path && !e.status.is_terminal())
            {
                false
            } else {
                entries.push(entry);
                true
            }
        };

        if !admitted {
            debug!(path = %path.display(), "ignoring path: already tracked");
            return;
        }

        info!(name = %name, size = %size_display, "file admitted");
        self.notify(RegistryEvent::Added);
    }

    /// Discards every entry. Does not touch the filesystem.
    pub fn clear(&self) {
        self.lock_entries().clear();
        self.notify(RegistryEvent::Cleared);
    }

    /// Snapshot of entries that have not finished, in insertion order.
    /// Error entries stay visible until [`clear`](Self::clear).
    pub fn active_entries(&self) -> Vec<FileEntry> {
        self.lock_entries()
            .iter()
            .filter(|e| e.status != FileStatus::Done)
            .cloned()
            .collect()
    }

    /// Full snapshot including finished entries.
    pub fn entries(&self) -> Vec<FileEntry> {
        self.lock_entries().clone()
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    /// Promotes the earliest New entry to Waiting and returns a snapshot
    /// of it. The transition happens under the lock, so the same entry can
    /// never be handed out twice.
    pub fn claim_next_new(&self) -> Option<FileEntry> {
        let snapshot = {
            let mut entries = self.lock_entries();
            let claimed = entries.iter_mut().find(|e| e.status == FileStatus::New)?;
            claimed.status = FileStatus::Waiting;
            claimed.clone()
        };
        self.notify(RegistryEvent::StatusChanged);
        Some(snapshot)
    }

    /// Applies a status transition, enforcing the state machine: statuses
    /// only move forward and Done/Error are final. Illegal transitions are
    /// dropped. Returns whether the transition was applied.
    pub fn set_status(&self, id: &str, status: FileStatus) -> bool {
        let applied = {
            let mut entries = self.lock_entries();
            match entries.iter_mut().find(|e| e.id == id) {
                Some(entry) if transition_allowed(entry.status, status) => {
                    entry.status = status;
                    true
                }
                Some(entry) => {
                    warn!(
                        name = %entry.name,
                        from = %entry.status,
                        to = %status,
                        "dropping illegal status transition"
                    );
                    false
                }
                None => false,
            }
        };

        if applied {
            self.notify(RegistryEvent::StatusChanged);
        }
        applied
    }

    /// Records the converted artifact and moves the entry to Done.
    pub fn mark_done(&self, id: &str, output_path: PathBuf, output_size: u64) -> bool {
        let applied = {
            let mut entries = self.lock_entries();
            match entries.iter_mut().find(|e| e.id == id) {
                Some(entry) if transition_allowed(entry.status, FileStatus::Done) => {
                    entry.output_path = Some(output_path);
                    entry.output_size = Some(output_size);
                    entry.status = FileStatus::Done;
                    true
                }
                _ => false,
            }
        };

        if applied {
            self.notify(RegistryEvent::StatusChanged);
        }
        applied
    }
}

impl Default for FileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn transition_allowed(from: FileStatus, to: FileStatus) -> bool {
    use FileStatus::*;
    matches!(
        (from, to),
        (New, Waiting)
            | (New, Error)
            | (Waiting, Processing)
            | (Waiting, Error)
            | (Processing, Done)
            | (Processing, Error)
    )
}

/// Polls until the file reports a non-zero size. Returns None when the
/// budget runs out or the file disappears mid-wait.
fn wait_for_nonzero_size(path: &Path) -> Option<u64> {
    for attempt in 0..SIZE_POLL_BUDGET {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > 0 => return Some(meta.len()),
            Ok(_) => {}
            Err(_) => return None,
        }
        if attempt + 1 < SIZE_POLL_BUDGET {
            std::thread::sleep(SIZE_POLL_DELAY);
        }
    }
    None
}
