use std::path::{Path, PathBuf};
use std::process::Stdio;

use common::{AudioFormat, TrackMetadata};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{staging_dir, StagedAudio, StagedFile};
use crate::error::ImportError;
use crate::utils::clean_text;

pub const DEFAULT_PROGRAM: &str = "yt-dlp";

/// Drives an external yt-dlp compatible program to pull the best audio
/// stream of a page and transcode it to MP3.
#[derive(Clone, Debug)]
pub struct StreamExtractor {
    program: PathBuf,
}

/// The fields of the tool's JSON dump that matter here.
#[derive(Debug, Default, Deserialize)]
pub struct ExtractionInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

impl Default for StreamExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamExtractor {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub async fn extract(&self, video_url: &str) -> Result<StagedAudio, ImportError> {
        let workdir = staging_dir("audio-extract-")?;
        let template = workdir.path().join("%(id)s.%(ext)s");

        debug!("Running {} for {}", self.program.display(), video_url);
        let output = Command::new(&self.program)
            .args(["-f", "bestaudio/best", "-x"])
            .args(["--audio-format", "mp3", "--audio-quality", "320K"])
            .args(["--no-playlist", "--no-simulate", "--dump-json"])
            .arg("-o")
            .arg(&template)
            .arg(video_url)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| {
                ImportError::DownloadFailed(format!(
                    "could not run {}: {}",
                    self.program.display(),
                    err
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("no error output");
            return Err(ImportError::DownloadFailed(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                reason.trim()
            )));
        }

        let info = parse_info(&String::from_utf8_lossy(&output.stdout));
        let path = find_audio_file(workdir.path(), AudioFormat::Mp3)
            .await?
            .ok_or(ImportError::ExtractionProducedNothing)?;

        let file_metadata = read_file_metadata(path.clone()).await;
        let mut metadata = file_metadata.unwrap_or_else(|| TrackMetadata::new(AudioFormat::Mp3));
        merge_platform_metadata(&mut metadata, info);

        Ok(StagedAudio::new(
            StagedFile::new(workdir, path, AudioFormat::Mp3),
            metadata,
        ))
    }
}

async fn read_file_metadata(path: PathBuf) -> Option<TrackMetadata> {
    let result =
        tokio::task::spawn_blocking(move || metadata::read_metadata(&path, AudioFormat::Mp3)).await;
    match result {
        Ok(Ok(metadata)) => Some(metadata),
        Ok(Err(err)) => {
            warn!("Could not read tags from extracted audio: {}", err);
            None
        }
        Err(err) => {
            warn!("Tag reader task failed: {}", err);
            None
        }
    }
}

/// The last line of stdout that parses as a JSON object. Anything else
/// yields an empty record.
pub fn parse_info(stdout: &str) -> ExtractionInfo {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| serde_json::from_str::<ExtractionInfo>(line).ok())
        .unwrap_or_default()
}

/// File tags win; the platform's fields only fill gaps.
pub fn merge_platform_metadata(metadata: &mut TrackMetadata, info: ExtractionInfo) {
    if metadata.title.is_none() {
        metadata.title = clean_text(info.title);
    }
    if metadata.artist.is_none() {
        metadata.artist = clean_text(info.artist).or_else(|| clean_text(info.uploader));
    }
    if metadata.album.is_none() {
        metadata.album = clean_text(info.album);
    }
    if metadata.duration == 0 {
        if let Some(seconds) = info.duration.filter(|secs| secs.is_finite() && *secs > 0.0) {
            metadata.duration = seconds.min(f64::from(u32::MAX)) as u32;
        }
    }
}

async fn find_audio_file(dir: &Path, format: AudioFormat) -> std::io::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(AudioFormat::from_extension)
            == Some(format);
        if matches && entry.file_type().await?.is_file() {
            found.push(path);
        }
    }
    found.sort();
    Ok(found.into_iter().next())
}
