mod ytdlp;

pub use ytdlp::YtDlpFetcher;

use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Opaque diagnostic from the extraction tool; surfaced to the user
    /// verbatim, never inspected.
    #[error("{0}")]
    Extraction(String),
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub id: String,
    pub title: String,
    pub channel: String,
    pub duration_seconds: u64,
}

impl Metadata {
    /// Duration in whole minutes, rounded, which is the unit the limit
    /// is expressed in.
    pub fn duration_minutes(&self) -> u64 {
        ((self.duration_seconds as f64) / 60.0).round() as u64
    }
}

#[derive(Debug, Clone)]
pub struct Download {
    pub metadata: Metadata,
    pub path: PathBuf,
}

#[async_trait]
pub trait MediaFetcher: Send + Sync + 'static {
    /// Metadata only, no download.
    async fn probe(&self, url: &str) -> Result<Metadata, FetchError>;

    /// Full download plus transcode to a local audio artifact. Slow.
    async fn fetch(&self, url: &str) -> Result<Download, FetchError>;
}
