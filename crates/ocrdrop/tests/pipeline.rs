//! End-to-end pipeline tests driving a mock converter script.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use ocrdrop::config::OcrConfig;
use ocrdrop::ocr::{OcrInvoker, SharedOcrSettings};
use ocrdrop::registry::{FileRegistry, FileStatus};
use ocrdrop::watcher::DirectoryWatcher;
use ocrdrop::worker::{Scheduler, WorkerPool};

/// Copies the input to the output path and succeeds, like a well-behaved
/// converter. Input and output paths are the last two arguments.
const CONVERT_OK: &str = "#!/bin/sh\n\
    eval \"input=\\${$(($# - 1))}\"\n\
    eval \"output=\\${$#}\"\n\
    cp \"$input\" \"$output\"\n";

const CONVERT_FAIL: &str = "#!/bin/sh\n\
    echo 'conversion failed' >&2\n\
    exit 1\n";

/// Reports success without producing any output artifact.
const CONVERT_NO_OUTPUT: &str = "#!/bin/sh\n\
    exit 0\n";

/// Takes a while before converting, to keep worker slots occupied.
const CONVERT_SLOW: &str = "#!/bin/sh\n\
    sleep 0.3\n\
    eval \"input=\\${$(($# - 1))}\"\n\
    eval \"output=\\${$#}\"\n\
    cp \"$input\" \"$output\"\n";

struct Harness {
    _temp: TempDir,
    input_dir: PathBuf,
    output_dir: PathBuf,
    registry: Arc<FileRegistry>,
    scheduler: Scheduler,
}

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("mock-convert");
    fs::write(&path, body).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

fn harness(script_body: &str, worker_count: usize) -> Harness {
    let temp = TempDir::new().unwrap();
    let input_dir = temp.path().join("input");
    let output_dir = temp.path().join("output");
    fs::create_dir_all(&input_dir).unwrap();
    fs::create_dir_all(&output_dir).unwrap();

    let script = write_script(temp.path(), script_body);

    let registry = Arc::new(FileRegistry::new());
    let settings = SharedOcrSettings::new(OcrConfig {
        program: script.display().to_string(),
        ..OcrConfig::default()
    });
    let invoker = Arc::new(OcrInvoker::new(settings, &output_dir));
    let pool = WorkerPool::new(Arc::clone(&registry), invoker, worker_count);
    let scheduler = Scheduler::spawn(Arc::clone(&registry), pool, Duration::from_millis(20));

    Harness {
        _temp: temp,
        input_dir,
        output_dir,
        registry,
        scheduler,
    }
}

fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn converted_file_reaches_done_with_recorded_output() {
    let mut h = harness(CONVERT_OK, 2);
    let source = h.input_dir.join("a.pdf");
    fs::write(&source, b"0123456789").unwrap();
    h.registry.add_file(&source);

    assert!(wait_until(Duration::from_secs(5), || {
        h.registry
            .entries()
            .iter()
            .any(|e| e.status == FileStatus::Done)
    }));

    let entries = h.registry.entries();
    let entry = &entries[0];
    assert_eq!(entry.status, FileStatus::Done);
    assert_eq!(entry.output_path, Some(h.output_dir.join("a.pdf")));
    assert_eq!(entry.output_size, Some(10));
    assert!(h.output_dir.join("a.pdf").exists());
    assert!(!source.exists(), "source is consumed after conversion");
    assert!(
        h.registry.active_entries().is_empty(),
        "Done entries leave the active view"
    );

    h.scheduler.join();
}

#[test]
fn failing_converter_marks_entry_error_and_consumes_source() {
    let mut h = harness(CONVERT_FAIL, 2);
    let source = h.input_dir.join("b.pdf");
    fs::write(&source, b"0123456789").unwrap();
    h.registry.add_file(&source);

    assert!(wait_until(Duration::from_secs(5), || {
        h.registry
            .entries()
            .iter()
            .any(|e| e.status == FileStatus::Error)
    }));

    assert!(!source.exists(), "source is consumed even on failure");
    assert!(!h.output_dir.join("b.pdf").exists());

    // Error entries stay visible in the active view
    let active = h.registry.active_entries();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].status, FileStatus::Error);

    h.scheduler.join();
}

#[test]
fn missing_output_despite_success_is_an_error() {
    let mut h = harness(CONVERT_NO_OUTPUT, 1);
    let source = h.input_dir.join("ghost.pdf");
    fs::write(&source, b"0123456789").unwrap();
    h.registry.add_file(&source);

    assert!(wait_until(Duration::from_secs(5), || {
        h.registry
            .entries()
            .iter()
            .any(|e| e.status == FileStatus::Error)
    }));

    let entry = &h.registry.entries()[0];
    assert!(entry.output_path.is_none());

    h.scheduler.join();
}

#[test]
fn unsupported_extension_is_never_admitted() {
    let mut h = harness(CONVERT_OK, 1);
    let source = h.input_dir.join("notes.txt");
    fs::write(&source, b"plain text").unwrap();
    h.registry.add_file(&source);

    assert!(h.registry.is_empty());
    assert!(source.exists(), "rejected files are left untouched");

    h.scheduler.join();
}

#[test]
fn clear_empties_active_view_at_any_point() {
    let mut h = harness(CONVERT_SLOW, 1);
    for i in 0..3 {
        let source = h.input_dir.join(format!("doc{i}.pdf"));
        fs::write(&source, b"0123456789").unwrap();
        h.registry.add_file(&source);
    }
    assert_eq!(h.registry.len(), 3);

    h.registry.clear();
    assert!(h.registry.active_entries().is_empty());
    assert!(h.registry.is_empty());

    h.scheduler.join();
}

#[test]
fn processing_never_exceeds_worker_count() {
    const WORKERS: usize = 2;
    const FILES: usize = 6;

    let mut h = harness(CONVERT_SLOW, WORKERS);
    for i in 0..FILES {
        let source = h.input_dir.join(format!("doc{i}.pdf"));
        fs::write(&source, b"0123456789").unwrap();
        h.registry.add_file(&source);
    }

    let deadline = Instant::now() + Duration::from_secs(30);
    let mut max_processing = 0;
    loop {
        let entries = h.registry.entries();
        let processing = entries
            .iter()
            .filter(|e| e.status == FileStatus::Processing)
            .count();
        max_processing = max_processing.max(processing);
        assert!(
            processing <= WORKERS,
            "{} entries in Processing with {} workers",
            processing,
            WORKERS
        );

        if entries.iter().all(|e| e.status.is_terminal()) {
            break;
        }
        assert!(Instant::now() < deadline, "pipeline did not drain in time");
        std::thread::sleep(Duration::from_millis(10));
    }

    let entries = h.registry.entries();
    assert_eq!(entries.len(), FILES);
    assert!(entries.iter().all(|e| e.status == FileStatus::Done));

    h.scheduler.join();
}

#[test]
fn duplicate_basenames_are_both_processed() {
    // Two admitted files sharing a basename both reach a terminal state;
    // they race for the same output path, last writer wins.
    let mut h = harness(CONVERT_OK, 2);
    let other_dir = h._temp.path().join("elsewhere");
    fs::create_dir_all(&other_dir).unwrap();

    let first = h.input_dir.join("scan.pdf");
    let second = other_dir.join("scan.pdf");
    fs::write(&first, b"first contents").unwrap();
    fs::write(&second, b"second contents!").unwrap();
    h.registry.add_file(&first);
    h.registry.add_file(&second);

    assert!(wait_until(Duration::from_secs(5), || {
        h.registry
            .entries()
            .iter()
            .all(|e| e.status.is_terminal())
    }));

    let entries = h.registry.entries();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.status == FileStatus::Done));
    assert!(h.output_dir.join("scan.pdf").exists());

    h.scheduler.join();
}

#[test]
fn watcher_feeds_pipeline_end_to_end() {
    let mut h = harness(CONVERT_OK, 2);

    // Pre-existing file picked up by the initial sweep
    fs::write(h.input_dir.join("pre.pdf"), b"preexisting").unwrap();

    let mut watcher = DirectoryWatcher::with_intervals(
        &h.input_dir,
        Duration::from_millis(100),
        Duration::from_millis(50),
    );
    watcher.start(Arc::clone(&h.registry)).unwrap();
    assert_eq!(h.registry.len(), 1);

    // File dropped while the watcher is running
    fs::write(h.input_dir.join("later.pdf"), b"created later").unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        h.registry.len() == 2
    }));
    assert!(wait_until(Duration::from_secs(5), || {
        h.registry
            .entries()
            .iter()
            .all(|e| e.status == FileStatus::Done)
    }));

    // Each file was admitted exactly once
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(h.registry.len(), 2);
    assert!(h.output_dir.join("pre.pdf").exists());
    assert!(h.output_dir.join("later.pdf").exists());

    watcher.stop();
    h.scheduler.join();
}
