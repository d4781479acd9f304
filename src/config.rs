use crate::library::DEFAULT_RETENTION_DAYS;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Application configuration
///
/// In debug builds a `.env` file is loaded first; values then come from
/// `SNIPPER_*` environment variables with defaults under `~/.snipper/`.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Directory trimmed clips are written to
    pub export_dir: PathBuf,
    /// Tracks uploaded longer ago than this are purged on startup
    pub retention_days: i64,
    pub ffmpeg_path: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        #[cfg(debug_assertions)]
        {
            if dotenvy::dotenv().is_ok() {
                info!("Dev mode: loaded .env file");
            } else {
                debug!("No .env file found");
            }
        }

        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = base_dir();
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let database_path = var("SNIPPER_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| base.join("snipper.db"));

        let export_dir = var("SNIPPER_EXPORT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| base.join("exports"));

        let retention_days = match var("SNIPPER_RETENTION_DAYS") {
            Some(value) => match value.trim().parse::<i64>() {
                Ok(days) if days >= 0 => days,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "SNIPPER_RETENTION_DAYS",
                        value,
                    })
                }
            },
            None => DEFAULT_RETENTION_DAYS,
        };

        let ffmpeg_path = var("SNIPPER_FFMPEG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("ffmpeg"));

        Ok(Config {
            database_path,
            export_dir,
            retention_days,
            ffmpeg_path,
        })
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days)
    }
}

/// `~/.snipper`, or `./.snipper` when there is no home directory
fn base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".snipper")
}
