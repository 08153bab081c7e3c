//! Input directory observation.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, error, info, warn};
use notify::{Config as NotifyConfig, PollWatcher, RecursiveMode};
use notify_debouncer_mini::{
    new_debouncer_opt, Config as DebouncerConfig, DebounceEventResult, DebouncedEventKind,
};
use walkdir::WalkDir;

use crate::error::WorkerError;
use crate::registry::FileRegistry;

/// Watches the input directory and feeds new files into the registry.
///
/// `start` first sweeps the files already present, so files dropped
/// before the service launched take the same admission path as files
/// arriving afterwards.
pub struct DirectoryWatcher {
    input_directory: PathBuf,
    poll_interval: Duration,
    debounce: Duration,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DirectoryWatcher {
    pub fn new<P: AsRef<Path>>(input_directory: P) -> Self {
        // PollWatcher intervals chosen for Docker/NFS compatibility
        Self::with_intervals(
            input_directory,
            Duration::from_secs(2),
            Duration::from_millis(500),
        )
    }

    pub fn with_intervals<P: AsRef<Path>>(
        input_directory: P,
        poll_interval: Duration,
        debounce: Duration,
    ) -> Self {
        Self {
            input_directory: input_directory.as_ref().to_path_buf(),
            poll_interval,
            debounce,
            shutdown: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn input_directory(&self) -> &Path {
        &self.input_directory
    }

    /// Sweeps the directory for existing files, registers the filesystem
    /// subscription, then spawns the watch thread.
    pub fn start(&mut self, registry: Arc<FileRegistry>) -> Result<(), WorkerError> {
        if self.handle.is_some() {
            return Err(WorkerError::WatchError("watcher already started".into()));
        }

        let swept = self.sweep_existing(&registry);
        info!(
            "Initial sweep of {} handed over {} file(s)",
            self.input_directory.display(),
            swept
        );

        let poll_config = NotifyConfig::default().with_poll_interval(self.poll_interval);
        let debouncer_config = DebouncerConfig::default()
            .with_timeout(self.debounce)
            .with_notify_config(poll_config);

        let (tx, rx) = std::sync::mpsc::channel();

        let mut debouncer = new_debouncer_opt::<_, PollWatcher>(debouncer_config, tx)
            .map_err(|e| WorkerError::WatchError(e.to_string()))?;

        debouncer
            .watcher()
            .watch(&self.input_directory, RecursiveMode::NonRecursive)
            .map_err(|e| WorkerError::WatchError(e.to_string()))?;

        info!("Watching directory: {}", self.input_directory.display());

        let shutdown = Arc::clone(&self.shutdown);
        let handle = std::thread::spawn(move || {
            // Keeps the subscription alive for the lifetime of the thread
            let _debouncer = debouncer;
            watch_loop(rx, registry, shutdown);
        });
        self.handle = Some(handle);

        Ok(())
    }

    fn sweep_existing(&self, registry: &FileRegistry) -> usize {
        let mut swept = 0;

        for entry in WalkDir::new(&self.input_directory)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_dir() {
                continue;
            }

            debug!("Found existing file: {}", path.display());
            registry.add_file(path);
            swept += 1;
        }

        swept
    }

    /// Stops watching and blocks until the watch thread has terminated.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Watch thread panicked");
            } else {
                info!("Stopped watching: {}", self.input_directory.display());
            }
        }
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch_loop(
    rx: Receiver<DebounceEventResult>,
    registry: Arc<FileRegistry>,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Watcher shutting down...");
            break;
        }

        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(Ok(events)) => {
                for event in events {
                    if matches!(event.kind, DebouncedEventKind::Any) {
                        let path = &event.path;

                        // Removals and directory events are not admissions
                        if path.is_dir() || !path.exists() {
                            continue;
                        }

                        debug!("New file detected: {}", path.display());
                        registry.add_file(path);
                    }
                }
            }
            Ok(Err(e)) => {
                warn!("Watch error: {:?}", e);
            }
            Err(RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                error!("Watch channel disconnected");
                break;
            }
        }
    }
}
