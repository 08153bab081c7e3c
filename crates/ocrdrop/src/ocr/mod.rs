//! External converter invocation.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{error, info, warn};

use crate::config::OcrConfig;
use crate::error::OcrError;

/// OCR parameters shared between the settings surface and the invoker.
/// The invoker reads the live values on every invocation, so a settings
/// change made while a file sits in the queue applies to its conversion.
#[derive(Clone)]
pub struct SharedOcrSettings {
    inner: Arc<RwLock<OcrConfig>>,
}

impl SharedOcrSettings {
    pub fn new(config: OcrConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub fn current(&self) -> OcrConfig {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update(&self, apply: impl FnOnce(&mut OcrConfig)) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut guard);
    }
}

/// Shells out to the converter (ocrmypdf by default) for one source file.
pub struct OcrInvoker {
    settings: SharedOcrSettings,
    output_directory: PathBuf,
}

impl OcrInvoker {
    pub fn new(settings: SharedOcrSettings, output_directory: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            output_directory: output_directory.into(),
        }
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// Runs the converter synchronously on `input` and returns the output
    /// path on exit code 0. The source file is removed once the command
    /// has returned, success or failure: failed conversions cannot be
    /// retried from the same source. No timeout is imposed on the command.
    pub fn run(&self, input: &Path) -> Result<PathBuf, OcrError> {
        let ocr = self.settings.current();

        let file_name = input
            .file_name()
            .ok_or_else(|| OcrError::InvalidSource(input.to_path_buf()))?;
        let output = self.output_directory.join(file_name);

        let mut command = Command::new(&ocr.program);
        command
            .arg("--image-dpi")
            .arg(ocr.image_dpi.to_string())
            .arg("--optimize")
            .arg(ocr.optimize.to_string())
            .args(["--tesseract-oem", "1"])
            .arg("--clean")
            .args(["--output-type", "pdfa-2"])
            .arg("--redo-ocr")
            .arg("-l")
            .arg(&ocr.language)
            .arg(input)
            .arg(&output);

        info!(input = %input.display(), "running converter: {:?}", command);

        let result = command.output().map_err(|source| OcrError::Launch {
            program: ocr.program.clone(),
            source,
        })?;

        // The source is consumed once the converter has actually run,
        // even when it failed.
        if let Err(e) = std::fs::remove_file(input) {
            warn!(path = %input.display(), "could not remove source file: {e}");
        }

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            error!(
                input = %input.display(),
                code = ?result.status.code(),
                "converter failed: {}",
                stderr.trim()
            );
            return Err(OcrError::ToolFailed {
                path: input.to_path_buf(),
                code: result.status.code(),
            });
        }

        info!(output = %output.display(), "converter finished");
        Ok(output)
    }
}
