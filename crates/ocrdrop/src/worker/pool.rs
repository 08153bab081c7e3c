use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info, warn};

use crate::error::WorkerError;
use crate::ocr::OcrInvoker;
use crate::registry::{FileEntry, FileRegistry, FileStatus};

/// Fixed-size pool of converter workers. Dispatches arrive over a bounded
/// channel whose capacity provides backpressure on the scheduler when all
/// workers are busy.
pub struct WorkerPool {
    dispatch_sender: Sender<FileEntry>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new(
        registry: Arc<FileRegistry>,
        invoker: Arc<OcrInvoker>,
        worker_count: usize,
    ) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");

        let (dispatch_sender, dispatch_receiver) = bounded::<FileEntry>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let dispatch_rx = dispatch_receiver.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_registry = Arc::clone(&registry);
            let worker_invoker = Arc::clone(&invoker);

            let handle = thread::spawn(move || {
                run_worker(
                    worker_id,
                    dispatch_rx,
                    shutdown_flag,
                    worker_registry,
                    worker_invoker,
                );
            });

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Self {
            dispatch_sender,
            workers,
            shutdown,
        }
    }

    pub fn submit(&self, entry: FileEntry) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.dispatch_sender
            .send(entry)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn wait(self) {
        // Drop sender to signal workers to exit
        drop(self.dispatch_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn run_worker(
    worker_id: usize,
    dispatch_receiver: Receiver<FileEntry>,
    shutdown: Arc<AtomicBool>,
    registry: Arc<FileRegistry>,
    invoker: Arc<OcrInvoker>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match dispatch_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(entry) => {
                debug!("Worker {} processing: {}", worker_id, entry.name);
                process_entry(&registry, &invoker, &entry);
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} dispatch channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

/// Runs one dispatched entry through the converter and reconciles the
/// outcome into the registry. Failures are terminal for the entry and
/// never escape the worker.
fn process_entry(registry: &FileRegistry, invoker: &OcrInvoker, entry: &FileEntry) {
    if !entry.path.exists() {
        warn!(
            "Source disappeared before processing: {}",
            entry.path.display()
        );
        registry.set_status(&entry.id, FileStatus::Error);
        return;
    }

    registry.set_status(&entry.id, FileStatus::Processing);

    let output_path = match invoker.run(&entry.path) {
        Ok(path) => path,
        Err(e) => {
            error!("Conversion failed for {}: {}", entry.name, e);
            registry.set_status(&entry.id, FileStatus::Error);
            return;
        }
    };

    match std::fs::metadata(&output_path) {
        Ok(meta) => {
            registry.mark_done(&entry.id, output_path, meta.len());
        }
        Err(_) => {
            // Exit code 0 but no artifact: fail the entry rather than
            // leaving it stuck in Processing.
            error!(
                "Converter reported success but produced no output for {}",
                entry.name
            );
            registry.set_status(&entry.id, FileStatus::Error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OcrConfig;
    use crate::ocr::SharedOcrSettings;
    use tempfile::TempDir;

    fn test_invoker(output_dir: &std::path::Path) -> Arc<OcrInvoker> {
        let settings = SharedOcrSettings::new(OcrConfig {
            program: "/nonexistent/mock-convert".to_string(),
            ..OcrConfig::default()
        });
        Arc::new(OcrInvoker::new(settings, output_dir))
    }

    #[test]
    fn test_pool_creation_and_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let registry = Arc::new(FileRegistry::new());
        let pool = WorkerPool::new(registry, test_invoker(temp_dir.path()), 2);

        assert!(!pool.is_shutdown());

        pool.shutdown();
        assert!(pool.is_shutdown());

        pool.wait();
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let temp_dir = TempDir::new().unwrap();
        let registry = Arc::new(FileRegistry::new());
        let pool = WorkerPool::new(Arc::clone(&registry), test_invoker(temp_dir.path()), 1);

        pool.shutdown();
        let entry = FileEntry::new(std::path::Path::new("scan.pdf"), 10);
        assert!(pool.submit(entry).is_err());

        pool.wait();
    }

    #[test]
    fn test_missing_source_at_dispatch_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("scan.pdf");
        std::fs::write(&source, b"pdf bytes").unwrap();

        let registry = Arc::new(FileRegistry::new());
        registry.add_file(&source);

        // The file vanishes between admission and dispatch
        std::fs::remove_file(&source).unwrap();

        let pool = WorkerPool::new(Arc::clone(&registry), test_invoker(temp_dir.path()), 1);
        let claimed = registry.claim_next_new().unwrap();
        pool.submit(claimed).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while std::time::Instant::now() < deadline {
            if registry.entries()[0].status == FileStatus::Error {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(registry.entries()[0].status, FileStatus::Error);

        pool.shutdown();
        pool.wait();
    }

    #[test]
    fn test_launch_failure_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("scan.pdf");
        std::fs::write(&source, b"pdf bytes").unwrap();

        let registry = Arc::new(FileRegistry::new());
        registry.add_file(&source);

        // Invoker points at a program that cannot be launched
        let pool = WorkerPool::new(Arc::clone(&registry), test_invoker(temp_dir.path()), 1);
        let claimed = registry.claim_next_new().unwrap();
        pool.submit(claimed).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while std::time::Instant::now() < deadline {
            if registry.entries()[0].status == FileStatus::Error {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(registry.entries()[0].status, FileStatus::Error);

        pool.shutdown();
        pool.wait();
    }
}
