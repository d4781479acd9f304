use crate::regions::{Region, DEFAULT_REGION_LABEL};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Export failed: {0}")]
    ExportFailed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One trim job for a transcoder
#[derive(Debug, Clone)]
pub struct TrimRequest<'a> {
    /// Original file name of the track, used for the container hint
    pub source_name: &'a str,
    pub data: &'a [u8],
    pub start: f64,
    pub end: f64,
    /// Written into the clip's title metadata
    pub title: &'a str,
}

/// Trait for the external audio trimming tool (allows mocking for tests)
#[async_trait::async_trait]
pub trait Transcoder: Send + Sync {
    async fn trim(&self, request: &TrimRequest<'_>) -> Result<Vec<u8>, ExportError>;
}

/// Transcoder that shells out to ffmpeg with stream copy
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        FfmpegTranscoder {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait::async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn trim(&self, request: &TrimRequest<'_>) -> Result<Vec<u8>, ExportError> {
        let staging = tempfile::tempdir()?;
        let extension = source_extension(request.source_name);
        let input_path = staging.path().join(format!("input.{}", extension));
        let output_path = staging.path().join(format!("clip.{}", extension));

        tokio::fs::write(&input_path, request.data).await?;

        debug!(
            "Running {} on {} [{:.3}, {:.3}]",
            self.ffmpeg_path.display(),
            request.source_name,
            request.start,
            request.end
        );

        let output = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(&input_path)
            .arg("-ss")
            .arg(request.start.to_string())
            .arg("-to")
            .arg(request.end.to_string())
            .args(["-c", "copy", "-metadata"])
            .arg(format!("title={}", request.title))
            .arg(&output_path)
            .output()
            .await
            .map_err(|e| {
                ExportError::ExportFailed(format!(
                    "could not run {}: {}",
                    self.ffmpeg_path.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(ExportError::ExportFailed(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let data = tokio::fs::read(&output_path)
            .await
            .map_err(|e| ExportError::ExportFailed(format!("ffmpeg produced no output: {}", e)))?;

        if data.is_empty() {
            return Err(ExportError::ExportFailed("ffmpeg produced an empty clip".to_string()));
        }

        Ok(data)
    }
}

/// A trimmed clip ready to be saved
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedClip {
    pub file_name: String,
    pub data: Vec<u8>,
}

/// Export service for cutting regions out of a track
pub struct ExportService;

impl ExportService {
    /// Trim `region` out of the track bytes
    ///
    /// The clip is named after the region label with the source's extension.
    pub async fn export_clip(
        source_name: &str,
        data: &[u8],
        region: &Region,
        transcoder: &dyn Transcoder,
    ) -> Result<ExportedClip, ExportError> {
        info!(
            "Exporting region '{}' [{:.3}, {:.3}] from {}",
            region.label, region.start, region.end, source_name
        );

        let request = TrimRequest {
            source_name,
            data,
            start: region.start,
            end: region.end,
            title: &region.label,
        };
        let clip_data = transcoder.trim(&request).await?;

        Ok(ExportedClip {
            file_name: clip_file_name(&region.label, source_name),
            data: clip_data,
        })
    }

    /// Write a clip into `target_dir`, returning the final path
    ///
    /// Data goes to a `.part` file first and is renamed into place, so a
    /// failed write never leaves a clip-named file behind.
    pub async fn write_clip(
        clip: &ExportedClip,
        target_dir: &Path,
    ) -> Result<PathBuf, ExportError> {
        tokio::fs::create_dir_all(target_dir).await?;

        let final_path = target_dir.join(&clip.file_name);
        let part_path = target_dir.join(format!("{}.part", clip.file_name));

        if let Err(e) = tokio::fs::write(&part_path, &clip.data).await {
            if let Err(cleanup) = tokio::fs::remove_file(&part_path).await {
                warn!("Failed to remove {}: {}", part_path.display(), cleanup);
            }
            return Err(e.into());
        }
        tokio::fs::rename(&part_path, &final_path).await?;

        info!("Wrote clip {}", final_path.display());
        Ok(final_path)
    }
}

/// File name for a clip: label with path-hostile characters replaced,
/// plus the source extension
pub fn clip_file_name(label: &str, source_name: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let stem = match cleaned.trim_matches('.') {
        "" => DEFAULT_REGION_LABEL,
        stem => stem,
    };
    format!("{}.{}", stem, source_extension(source_name))
}

fn source_extension(source_name: &str) -> &str {
    Path::new(source_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .unwrap_or("mp3")
}
