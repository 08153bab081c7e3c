use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub input_directory: String,
    pub output_directory: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub ocr: OcrConfig,
}

fn default_worker_count() -> usize {
    3
}

fn default_poll_interval_secs() -> u64 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            input_directory: "data/input".to_string(),
            output_directory: "data/output".to_string(),
            worker_count: default_worker_count(),
            poll_interval_secs: default_poll_interval_secs(),
            ocr: OcrConfig::default(),
        }
    }
}

/// Parameters passed to the external converter. Shared live between the
/// settings surface and the invoker via [`crate::ocr::SharedOcrSettings`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_dpi")]
    pub image_dpi: u32,
    #[serde(default = "default_optimize")]
    pub optimize: u8,
}

fn default_program() -> String {
    "ocrmypdf".to_string()
}

fn default_language() -> String {
    "pol".to_string()
}

fn default_dpi() -> u32 {
    300
}

fn default_optimize() -> u8 {
    2
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            language: default_language(),
            image_dpi: default_dpi(),
            optimize: default_optimize(),
        }
    }
}

/// File formats the registry admits: PDFs plus the raster image formats
/// the converter accepts as input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Image,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "jpg" | "jpeg" | "png" | "tif" | "tiff" | "bmp" | "ppm" | "pgm" | "pbm" => {
                Some(Self::Image)
            }
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}
