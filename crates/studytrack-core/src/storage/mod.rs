mod config;

pub use config::{Config, LoggingConfig};

use std::path::PathBuf;

use crate::error::CoreError;

/// Returns `~/.config/studytrack[-dev]/` based on STUDYTRACK_ENV.
///
/// Set STUDYTRACK_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, CoreError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("STUDYTRACK_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("studytrack-dev")
    } else {
        base_dir.join("studytrack")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
