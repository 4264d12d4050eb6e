use std::env;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {0}")]
    Invalid(&'static str),
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    pub storage: StorageConfig,
    pub runtime: RuntimeConfig,
    pub download: DownloadConfig,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub token: String,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub redis_url: String,
}

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Number of concurrent download workers racing on the dispatch queue.
    pub concurrency: usize,
    /// Long-poll timeout handed to the gateway on every fetch.
    pub poll_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DownloadConfig {
    /// Videos longer than this (whole minutes, rounded) are rejected
    /// before any download is attempted.
    pub max_duration_mins: u64,
    pub dir: PathBuf,
    pub ytdlp_bin: String,
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn parsed_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.parse::<T>().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        info!("Building AppConfig...");
        Ok(Self {
            telegram: TelegramConfig {
                token: required("TELEGRAM_BOT_TOKEN")?,
            },
            storage: StorageConfig {
                redis_url: required("REDIS_URL")?,
            },
            runtime: RuntimeConfig {
                concurrency: parsed_or("WORKER_CONCURRENCY", 4)?,
                poll_timeout_secs: parsed_or("POLL_TIMEOUT_SECS", 60)?,
            },
            download: DownloadConfig {
                max_duration_mins: parsed_or("MAX_DURATION_MINS", 230)?,
                dir: PathBuf::from(env::var("DOWNLOAD_DIR").unwrap_or_else(|_| "downloads".to_string())),
                ytdlp_bin: env::var("YTDLP_BIN").unwrap_or_else(|_| "yt-dlp".to_string()),
            },
        })
    }
}
