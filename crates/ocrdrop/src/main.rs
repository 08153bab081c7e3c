use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ocrdrop::config::{load_config, Config};
use ocrdrop::error::OcrdropError;
use ocrdrop::ocr::{OcrInvoker, SharedOcrSettings};
use ocrdrop::registry::FileRegistry;
use ocrdrop::watcher::DirectoryWatcher;
use ocrdrop::worker::{Scheduler, WorkerPool};

#[derive(Parser, Debug)]
#[command(name = "ocrdrop", version, about = "Watch-folder OCR conversion service")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, env = "OCRDROP_CONFIG")]
    config: Option<PathBuf>,

    /// Input directory override.
    #[arg(long)]
    input: Option<String>,

    /// Output directory override.
    #[arg(long)]
    output: Option<String>,

    /// Worker count override.
    #[arg(long)]
    workers: Option<usize>,

    /// OCR language override (Tesseract language code).
    #[arg(long)]
    language: Option<String>,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(Cli::parse()) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> ocrdrop::Result<()> {
    info!("ocrdrop v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => {
            warn!("No config file given, using defaults");
            Config::default()
        }
    };
    if let Some(input) = cli.input {
        config.input_directory = input;
    }
    if let Some(output) = cli.output {
        config.output_directory = output;
    }
    if let Some(workers) = cli.workers {
        config.worker_count = workers;
    }
    if let Some(language) = cli.language {
        config.ocr.language = language;
    }

    let input_dir = PathBuf::from(&config.input_directory);
    let output_dir = PathBuf::from(&config.output_directory);
    for dir in [&input_dir, &output_dir] {
        std::fs::create_dir_all(dir).map_err(|source| OcrdropError::CreateDirectory {
            path: dir.clone(),
            source,
        })?;
    }

    let registry = Arc::new(FileRegistry::new());
    let settings = SharedOcrSettings::new(config.ocr.clone());
    let invoker = Arc::new(OcrInvoker::new(settings, &output_dir));
    let pool = WorkerPool::new(Arc::clone(&registry), invoker, config.worker_count);
    let mut scheduler = Scheduler::spawn(
        Arc::clone(&registry),
        pool,
        Duration::from_secs(config.poll_interval_secs),
    );

    spawn_status_observer(Arc::clone(&registry));

    let mut watcher = DirectoryWatcher::new(&input_dir);
    watcher.start(Arc::clone(&registry))?;

    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .map_err(|e| OcrdropError::SignalHandler(e.to_string()))?;

    info!("Ready; drop files into {}", input_dir.display());
    let _ = stop_rx.recv();

    info!("Shutting down");
    watcher.stop();
    scheduler.join();
    Ok(())
}

/// Logs the active list whenever the registry changes. Stands in for a UI
/// surface: events carry no payload, observers re-pull state.
fn spawn_status_observer(registry: Arc<FileRegistry>) {
    let mut events = registry.subscribe();
    thread::spawn(move || loop {
        match events.blocking_recv() {
            Ok(event) => {
                let active = registry.active_entries();
                info!(?event, "{} active file(s)", active.len());
                for entry in &active {
                    info!("  {} [{}] {}", entry.name, entry.status, entry.size_display());
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Status observer lagged, skipped {skipped} event(s)");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    });
}
