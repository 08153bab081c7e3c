pub mod config;
pub mod error;
pub mod ocr;
pub mod registry;
pub mod watcher;
pub mod worker;

pub use config::{load_config, Config, DocumentFormat, OcrConfig};
pub use error::{ConfigError, OcrError, OcrdropError, Result, WorkerError};
pub use ocr::{OcrInvoker, SharedOcrSettings};
pub use registry::{FileEntry, FileRegistry, FileStatus, RegistryEvent};
pub use watcher::DirectoryWatcher;
pub use worker::{Scheduler, WorkerPool};
