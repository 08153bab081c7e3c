use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrdropError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to install signal handler: {0}")]
    SignalHandler(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Watch error: {0}")]
    WatchError(String),
}

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Source path has no file name: {0}")]
    InvalidSource(PathBuf),

    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Converter exited with status {code:?} for '{path}'")]
    ToolFailed { path: PathBuf, code: Option<i32> },
}

pub type Result<T> = std::result::Result<T, OcrdropError>;
