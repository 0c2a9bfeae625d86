use std::fmt;

/// Hard failures of the import pipeline. Soft degradations (artwork,
/// thumbnails, tag embedding) never become one of these.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("invalid reference: {0}")]
    InvalidReference(String),
    #[error("failed to fetch catalog metadata: {0}")]
    MetadataFetchFailed(String),
    #[error("failed to download audio: {0}")]
    DownloadFailed(String),
    #[error("extraction produced no audio file")]
    ExtractionProducedNothing,
    #[error("failed to upload to storage: {0}")]
    UploadFailed(String),
    #[error("failed to register track: {0}")]
    RegistrationFailed(String),
    #[error("staging error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportStage {
    Fetching,
    Downloading,
    Tagging,
    Uploading,
    Registering,
    Done,
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportStage::Fetching => "fetching",
            ImportStage::Downloading => "downloading",
            ImportStage::Tagging => "tagging",
            ImportStage::Uploading => "uploading",
            ImportStage::Registering => "registering",
            ImportStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// The absorbing failed state: which stage broke and why.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ImportFailure {
    pub stage: ImportStage,
    #[source]
    pub error: ImportError,
}

impl ImportFailure {
    pub fn at(stage: ImportStage) -> impl FnOnce(ImportError) -> ImportFailure {
        move |error| ImportFailure { stage, error }
    }
}
