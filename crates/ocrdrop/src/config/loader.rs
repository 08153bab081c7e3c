use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.input_directory.is_empty() {
        return Err(ConfigError::Validation {
            message: "input_directory must not be empty".to_string(),
        });
    }

    if config.output_directory.is_empty() {
        return Err(ConfigError::Validation {
            message: "output_directory must not be empty".to_string(),
        });
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be at least 1".to_string(),
        });
    }

    if config.poll_interval_secs == 0 {
        return Err(ConfigError::Validation {
            message: "poll_interval_secs must be at least 1".to_string(),
        });
    }

    if config.ocr.image_dpi == 0 {
        return Err(ConfigError::Validation {
            message: "ocr.image_dpi must be greater than 0".to_string(),
        });
    }

    if config.ocr.language.is_empty() {
        return Err(ConfigError::Validation {
            message: "ocr.language must not be empty".to_string(),
        });
    }

    Ok(())
}
