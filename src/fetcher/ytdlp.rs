use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::{Download, FetchError, MediaFetcher, Metadata};

/// Flags applied to every invocation, matching the extraction options the
/// bot has always used.
const COMMON_ARGS: &[&str] = &["--no-playlist", "--geo-bypass", "--no-check-certificates"];

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    id: String,
    title: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

impl From<ProbeOutput> for Metadata {
    fn from(raw: ProbeOutput) -> Self {
        Metadata {
            // live streams and some extractors report no channel; fall back
            // to the uploader field
            channel: raw.channel.or(raw.uploader).unwrap_or_default(),
            id: raw.id,
            title: raw.title,
            duration_seconds: raw.duration.unwrap_or(0.0).round() as u64,
        }
    }
}

/// Adapter over the external yt-dlp binary. `probe` is a metadata-only
/// invocation; `fetch` downloads and transcodes to mp3 under the
/// configured directory, artifacts named `{id}.mp3`.
pub struct YtDlpFetcher {
    binary: String,
    output_dir: PathBuf,
}

impl YtDlpFetcher {
    pub fn new(binary: &str, output_dir: &Path) -> Self {
        Self {
            binary: binary.to_string(),
            output_dir: output_dir.to_path_buf(),
        }
    }

    fn artifact_path(&self, id: &str) -> PathBuf {
        self.output_dir.join(format!("{}.mp3", id))
    }

    fn output_template(&self) -> String {
        self.output_dir.join("%(id)s.%(ext)s").to_string_lossy().into_owned()
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>, FetchError> {
        debug!("Running {} {:?}", self.binary, args);
        let output = Command::new(&self.binary)
            .args(COMMON_ARGS)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| FetchError::Extraction(format!("failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Extraction(stderr.trim().to_string()));
        }

        Ok(output.stdout)
    }

    fn parse_metadata(stdout: &[u8]) -> Result<Metadata, FetchError> {
        let raw: ProbeOutput = serde_json::from_slice(stdout)
            .map_err(|e| FetchError::Extraction(format!("unreadable extractor output: {}", e)))?;
        Ok(raw.into())
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn probe(&self, url: &str) -> Result<Metadata, FetchError> {
        let stdout = self.run(&["--dump-json", "--no-download", url]).await?;
        Self::parse_metadata(&stdout)
    }

    async fn fetch(&self, url: &str) -> Result<Download, FetchError> {
        let metadata = self.probe(url).await?;

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let template = self.output_template();
        let result = self
            .run(&[
                "--format",
                "bestaudio/best",
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "192K",
                "--output",
                &template,
                url,
            ])
            .await;

        let path = self.artifact_path(&metadata.id);
        if let Err(e) = result {
            // an interrupted transcode can leave a partial artifact behind
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }

        if !path.exists() {
            return Err(FetchError::Extraction(format!(
                "expected artifact {} was not produced",
                path.display()
            )));
        }

        Ok(Download { metadata, path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metadata_prefers_channel_over_uploader() {
        let raw = br#"{"id": "xyz", "title": "Song", "channel": "Band", "uploader": "someone", "duration": 213.4}"#;
        let metadata = YtDlpFetcher::parse_metadata(raw).unwrap();
        assert_eq!(metadata.id, "xyz");
        assert_eq!(metadata.title, "Song");
        assert_eq!(metadata.channel, "Band");
        assert_eq!(metadata.duration_seconds, 213);
    }

    #[test]
    fn test_parse_metadata_falls_back_to_uploader() {
        let raw = br#"{"id": "xyz", "title": "Song", "uploader": "someone", "duration": 60}"#;
        let metadata = YtDlpFetcher::parse_metadata(raw).unwrap();
        assert_eq!(metadata.channel, "someone");
    }

    #[test]
    fn test_parse_metadata_rejects_garbage() {
        assert!(YtDlpFetcher::parse_metadata(b"ERROR: not json").is_err());
    }

    #[test]
    fn test_artifact_path_is_named_by_id() {
        let fetcher = YtDlpFetcher::new("yt-dlp", Path::new("/tmp/downloads"));
        assert_eq!(fetcher.artifact_path("abc123"), PathBuf::from("/tmp/downloads/abc123.mp3"));
    }
}
