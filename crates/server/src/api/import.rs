use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

use crate::source::SourceImportFlow;
use crate::state::{AppState, ImportErrorResponse, ImportResponse};

/// An absolute `http` or `https` URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpUrl(String);

impl<'de> Deserialize<'de> for HttpUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let url = reqwest::Url::parse(raw.trim()).map_err(D::Error::custom)?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(D::Error::custom("expected an http or https URL"));
        }
        Ok(HttpUrl(url.into()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ImportRequest {
    Catalog {
        spotify_url: HttpUrl,
        download_url: HttpUrl,
    },
    Extraction {
        youtube_url: HttpUrl,
    },
}

impl From<ImportRequest> for SourceImportFlow {
    fn from(request: ImportRequest) -> Self {
        match request {
            ImportRequest::Catalog {
                spotify_url,
                download_url,
            } => SourceImportFlow::CatalogDirect {
                catalog_url: spotify_url.0,
                download_url: download_url.0,
            },
            ImportRequest::Extraction { youtube_url } => SourceImportFlow::StreamingExtract {
                video_url: youtube_url.0,
            },
        }
    }
}

pub async fn import_track(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> Response {
    let flow = SourceImportFlow::from(request);
    match state.importer.run(&flow).await {
        Ok(outcome) => Json(ImportResponse::from_outcome(&flow, &outcome)).into_response(),
        Err(failure) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ImportErrorResponse {
                success: false,
                error: format!("Import failed: {}", failure),
            }),
        )
            .into_response(),
    }
}
