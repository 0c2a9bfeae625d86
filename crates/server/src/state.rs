use std::sync::Arc;

use serde::Serialize;

use crate::import::{ImportOutcome, Importer};
use crate::source::SourceImportFlow;

#[derive(Clone)]
pub struct AppState {
    pub api_key: Arc<str>,
    pub importer: Arc<Importer>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ServiceInfoResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub success: bool,
    pub track_id: String,
    pub title: String,
    pub artist: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artwork_url: Option<String>,
    pub message: &'static str,
}

impl ImportResponse {
    /// The catalog flow always reports album and artwork, empty when unknown.
    pub fn from_outcome(flow: &SourceImportFlow, outcome: &ImportOutcome) -> Self {
        let (album, artwork_url) = match flow {
            SourceImportFlow::CatalogDirect { .. } => (
                Some(outcome.metadata.album.clone().unwrap_or_default()),
                Some(outcome.metadata.artwork_url.clone().unwrap_or_default()),
            ),
            SourceImportFlow::StreamingExtract { .. } => (None, None),
        };
        Self {
            success: true,
            track_id: outcome.record.id.clone(),
            title: outcome.record.title.clone(),
            artist: outcome.record.artist.clone(),
            album,
            artwork_url,
            message: "Track imported successfully",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ImportErrorResponse {
    pub success: bool,
    pub error: String,
}
