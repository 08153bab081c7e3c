use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::registry::FileRegistry;
use crate::worker::pool::WorkerPool;

/// Control loop that promotes queued entries into the worker pool.
///
/// One promotion per iteration bounds dispatch burstiness; when every
/// worker is busy the pool's bounded channel blocks the loop instead.
/// The scheduler owns the pool: when the loop exits it shuts the workers
/// down and joins them.
pub struct Scheduler {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn spawn(registry: Arc<FileRegistry>, pool: WorkerPool, poll_interval: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let loop_shutdown = Arc::clone(&shutdown);

        let handle = thread::spawn(move || {
            run_loop(registry, pool, poll_interval, loop_shutdown);
        });

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Blocks until the loop and all workers have stopped.
    pub fn join(&mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Scheduler thread panicked");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.join();
    }
}

fn run_loop(
    registry: Arc<FileRegistry>,
    pool: WorkerPool,
    poll_interval: Duration,
    shutdown: Arc<AtomicBool>,
) {
    info!("Scheduler started");

    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Scheduler shutting down...");
            break;
        }

        match registry.claim_next_new() {
            Some(entry) => {
                debug!("Dispatching: {}", entry.name);
                if pool.submit(entry).is_err() {
                    warn!("Worker pool closed, scheduler exiting");
                    break;
                }
            }
            None => {
                thread::sleep(poll_interval);
            }
        }
    }

    pool.shutdown();
    pool.wait();
}
