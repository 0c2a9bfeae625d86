//! Where the audio comes from: a direct link paired with catalog
//! metadata, or a video page run through an extraction tool.

use std::path::PathBuf;

use common::{AudioFormat, TrackMetadata};
use tempfile::TempDir;
use tracing::warn;

pub mod direct;
pub mod extract;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceImportFlow {
    /// Catalog page for metadata plus a link straight to the audio.
    CatalogDirect {
        catalog_url: String,
        download_url: String,
    },
    /// Video page; audio and fallback metadata come from the extractor.
    StreamingExtract { video_url: String },
}

impl SourceImportFlow {
    pub fn label(&self) -> &'static str {
        match self {
            SourceImportFlow::CatalogDirect { .. } => "catalog",
            SourceImportFlow::StreamingExtract { .. } => "extract",
        }
    }
}

/// An audio file inside its own scratch directory. Dropping it removes
/// the directory.
#[derive(Debug)]
pub struct StagedFile {
    workdir: TempDir,
    pub path: PathBuf,
    pub format: AudioFormat,
}

impl StagedFile {
    pub fn new(workdir: TempDir, path: PathBuf, format: AudioFormat) -> Self {
        Self {
            workdir,
            path,
            format,
        }
    }

    /// Remove the scratch directory now. Failures are logged only.
    pub fn discard(self) {
        let dir = self.workdir.path().to_path_buf();
        if let Err(err) = self.workdir.close() {
            warn!("Could not remove scratch dir {}: {}", dir.display(), err);
        }
    }
}

pub fn staging_dir(prefix: &str) -> std::io::Result<TempDir> {
    tempfile::Builder::new().prefix(prefix).tempdir()
}

/// A staged file plus what is known about it so far.
#[derive(Debug)]
pub struct StagedAudio {
    pub file: StagedFile,
    pub metadata: TrackMetadata,
}

impl StagedAudio {
    pub fn new(file: StagedFile, mut metadata: TrackMetadata) -> Self {
        metadata.format = file.format;
        Self { file, metadata }
    }
}

/// Guess the container from the URL first, then the content type.
/// Unknown inputs are treated as MP3.
pub fn detect_format(url: &str, content_type: &str) -> AudioFormat {
    let url = url.to_ascii_lowercase();
    let content_type = content_type.to_ascii_lowercase();
    let matches = |suffix: &str, mimes: &[&str]| {
        url.contains(suffix) || mimes.iter().any(|mime| content_type.contains(mime))
    };
    if matches(".mp3", &["audio/mpeg"]) {
        AudioFormat::Mp3
    } else if matches(".flac", &["audio/flac"]) {
        AudioFormat::Flac
    } else if matches(".m4a", &["audio/mp4", "audio/x-m4a"]) {
        AudioFormat::M4a
    } else if matches(".wav", &["audio/wav"]) {
        AudioFormat::Wav
    } else {
        AudioFormat::Mp3
    }
}
