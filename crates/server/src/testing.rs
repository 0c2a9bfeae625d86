//! In-process stand-in for every collaborator service, bound to a random
//! loopback port. Each remote endpoint counts its hits.

use std::sync::atomic::{AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::external::catalog::{CatalogClient, CatalogCredentials};
use crate::external::registry::RegistryClient;
use crate::external::storage::{StorageClient, StorageCredentials};
use crate::import::Importer;
use crate::source::direct::DirectDownloader;
use crate::source::extract::StreamExtractor;

pub const WORKER_KEY: &str = "worker-key";
pub const ITEM_ID: &str = "item-1";
pub const STORED_SIZE: u64 = 987_654;

#[derive(Default)]
pub struct Hits {
    pub catalog_tokens: AtomicUsize,
    pub catalog_lookups: AtomicUsize,
    pub artwork: AtomicUsize,
    pub downloads: AtomicUsize,
    pub storage_tokens: AtomicUsize,
    pub uploads: AtomicUsize,
    pub thumbnails: AtomicUsize,
    pub deletes: AtomicUsize,
    pub registrations: AtomicUsize,
}

impl Hits {
    pub fn total(&self) -> usize {
        [
            &self.catalog_tokens,
            &self.catalog_lookups,
            &self.artwork,
            &self.downloads,
            &self.storage_tokens,
            &self.uploads,
            &self.thumbnails,
            &self.deletes,
            &self.registrations,
        ]
        .iter()
        .map(|counter| counter.load(Ordering::SeqCst))
        .sum()
    }
}

pub struct Behaviour {
    pub catalog_expires_in: AtomicU64,
    pub upload_status: AtomicU16,
    pub registry_status: AtomicU16,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            catalog_expires_in: AtomicU64::new(3600),
            upload_status: AtomicU16::new(201),
            registry_status: AtomicU16::new(200),
        }
    }
}

#[derive(Default)]
pub struct FakeState {
    pub hits: Hits,
    pub behaviour: Behaviour,
    pub uploaded: Mutex<Option<(String, usize)>>,
    pub registered: Mutex<Option<Value>>,
}

pub struct FakeBackend {
    pub base: String,
    pub state: Arc<FakeState>,
}

impl FakeBackend {
    pub async fn spawn() -> Self {
        let state = Arc::new(FakeState::default());
        let app = Router::new().fallback(dispatch).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base: format!("http://{}", addr),
            state,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn hits(&self) -> &Hits {
        &self.state.hits
    }

    pub fn catalog(&self) -> CatalogClient {
        CatalogClient::new(
            reqwest::Client::new(),
            CatalogCredentials {
                client_id: "catalog-id".to_string(),
                client_secret: "catalog-secret".to_string(),
            },
        )
        .with_endpoints(self.url("/spotify/token"), self.url("/spotify/v1"))
    }

    pub fn storage(&self) -> StorageClient {
        StorageClient::new(
            reqwest::Client::new(),
            StorageCredentials {
                client_id: "storage-id".to_string(),
                client_secret: "storage-secret".to_string(),
                tenant_id: "tenant".to_string(),
                user_id: "user@example.com".to_string(),
            },
        )
        .with_endpoints(self.url("/login"), self.url("/graph"))
    }

    pub fn registry(&self) -> RegistryClient {
        RegistryClient::new(reqwest::Client::new(), self.url("/worker"), WORKER_KEY)
    }

    pub fn importer(&self, extractor: StreamExtractor) -> Importer {
        Importer::new(
            self.catalog(),
            DirectDownloader::new(reqwest::Client::new()),
            extractor,
            self.storage(),
            self.registry(),
        )
    }
}

async fn dispatch(
    State(state): State<Arc<FakeState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let hits = &state.hits;
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    match (method, segments.as_slice()) {
        (Method::POST, ["spotify", "token"]) => {
            hits.catalog_tokens.fetch_add(1, Ordering::SeqCst);
            if !bearer.starts_with("Basic ") {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            let expires_in = state.behaviour.catalog_expires_in.load(Ordering::SeqCst);
            Json(json!({
                "access_token": "catalog-token",
                "token_type": "Bearer",
                "expires_in": expires_in,
            }))
            .into_response()
        }
        (Method::GET, ["spotify", "v1", "tracks", id]) => {
            hits.catalog_lookups.fetch_add(1, Ordering::SeqCst);
            if bearer != "Bearer catalog-token" {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            let host = headers
                .get(header::HOST)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("127.0.0.1");
            match catalog_track(id, host) {
                Some(track) => Json(track).into_response(),
                None => StatusCode::NOT_FOUND.into_response(),
            }
        }
        (Method::GET, ["art", name]) => {
            hits.artwork.fetch_add(1, Ordering::SeqCst);
            if *name == "cover.jpg" {
                ([(header::CONTENT_TYPE, "image/jpeg")], jpeg_bytes()).into_response()
            } else {
                StatusCode::NOT_FOUND.into_response()
            }
        }
        (Method::GET, ["audio", name]) => {
            hits.downloads.fetch_add(1, Ordering::SeqCst);
            match *name {
                "song.mp3" => ([(header::CONTENT_TYPE, "audio/mpeg")], mp3_bytes()).into_response(),
                "stream" => (
                    [(header::CONTENT_TYPE, "application/octet-stream")],
                    mp3_bytes(),
                )
                    .into_response(),
                "lossless" => ([(header::CONTENT_TYPE, "audio/flac")], vec![0u8; 64]).into_response(),
                "empty.mp3" => ([(header::CONTENT_TYPE, "audio/mpeg")], Vec::new()).into_response(),
                "truncated.flac" => {
                    ([(header::CONTENT_TYPE, "audio/flac")], truncated_flac_bytes()).into_response()
                }
                _ => StatusCode::NOT_FOUND.into_response(),
            }
        }
        (Method::POST, ["login", _tenant, "oauth2", "v2.0", "token"]) => {
            hits.storage_tokens.fetch_add(1, Ordering::SeqCst);
            Json(json!({
                "access_token": "storage-token",
                "token_type": "Bearer",
                "expires_in": 3600,
            }))
            .into_response()
        }
        (Method::PUT, ["graph", "users", _user, "drive", "root:", "Music", name, "content"]) => {
            hits.uploads.fetch_add(1, Ordering::SeqCst);
            if bearer != "Bearer storage-token" {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            let status = state.behaviour.upload_status.load(Ordering::SeqCst);
            let status = StatusCode::from_u16(status).unwrap();
            if !status.is_success() {
                return (status, "upload rejected").into_response();
            }
            let name = decode_segment(name.trim_end_matches(':'));
            *state.uploaded.lock() = Some((name.clone(), body.len()));
            (
                status,
                Json(json!({
                    "id": ITEM_ID,
                    "name": name,
                    "size": STORED_SIZE,
                    "parentReference": { "path": "/drive/root:/Music" },
                })),
            )
                .into_response()
        }
        (Method::GET, ["graph", "users", _user, "drive", "items", id, "thumbnails"]) => {
            hits.thumbnails.fetch_add(1, Ordering::SeqCst);
            if *id != ITEM_ID {
                return StatusCode::NOT_FOUND.into_response();
            }
            Json(json!({
                "value": [{
                    "medium": { "url": "https://thumbs.example/medium" },
                    "small": { "url": "https://thumbs.example/small" },
                }]
            }))
            .into_response()
        }
        (Method::DELETE, ["graph", "users", _user, "drive", "items", _id]) => {
            hits.deletes.fetch_add(1, Ordering::SeqCst);
            StatusCode::NO_CONTENT.into_response()
        }
        (Method::POST, ["worker", "tracks"]) => {
            hits.registrations.fetch_add(1, Ordering::SeqCst);
            let key = headers.get("X-API-Key").and_then(|value| value.to_str().ok());
            if key != Some(WORKER_KEY) {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            let status = state.behaviour.registry_status.load(Ordering::SeqCst);
            let status = StatusCode::from_u16(status).unwrap();
            if !status.is_success() {
                return (status, "registry unavailable").into_response();
            }
            let record: Value = serde_json::from_slice(&body).unwrap();
            *state.registered.lock() = Some(record.clone());
            Json(json!({ "success": true, "track": record })).into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

fn catalog_track(id: &str, host: &str) -> Option<Value> {
    let images = |name: &str| json!([{ "url": format!("http://{}/art/{}", host, name), "height": 640 }]);
    let track = match id {
        "good" => json!({
            "name": "Song A",
            "artists": [{ "name": "Artist B" }, { "name": "Guest" }],
            "album": {
                "name": "Album C",
                "release_date": "2020-05-01",
                "artists": [{ "name": "Artist B" }],
                "images": images("cover.jpg"),
            },
            "duration_ms": 215_000,
            "track_number": 3,
            "disc_number": 1,
        }),
        "brokenart" => json!({
            "name": "Song D",
            "artists": [{ "name": "Artist E" }],
            "album": {
                "name": "Album F",
                "release_date": "20",
                "artists": [],
                "images": images("missing.jpg"),
            },
            "duration_ms": 1000,
        }),
        "bare" => json!({
            "name": "Song G",
            "artists": [],
            "album": { "name": "Album H", "images": [] },
        }),
        _ => return None,
    };
    Some(track)
}

/// Percent-decodes one path segment through `Url`'s query parser.
fn decode_segment(raw: &str) -> String {
    let url = reqwest::Url::parse(&format!("http://fake.invalid/?segment={}", raw)).unwrap();
    url.query_pairs()
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}

pub fn jpeg_bytes() -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0xFF, 0xD9]
}

/// Forty silent MPEG-1 Layer III frames, 128 kbps at 44.1 kHz.
pub fn mp3_bytes() -> Vec<u8> {
    let mut out = Vec::new();
    for _ in 0..40 {
        out.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
        out.extend_from_slice(&[0u8; 413]);
    }
    out
}

/// A FLAC whose only metadata block is STREAMINFO, followed by 16 bytes of
/// frame data. Readable, but lofty cannot write tags into it.
pub fn truncated_flac_bytes() -> Vec<u8> {
    let mut out = b"fLaC".to_vec();
    out.extend_from_slice(&[0x80, 0x00, 0x00, 34]);
    out.extend_from_slice(&4096u16.to_be_bytes());
    out.extend_from_slice(&4096u16.to_be_bytes());
    out.extend_from_slice(&[0; 6]);
    let packed: u64 = (44_100u64 << 44) | (1u64 << 41) | (15u64 << 36) | 88_200u64;
    out.extend_from_slice(&packed.to_be_bytes());
    out.extend_from_slice(&[0; 16]);
    out.extend_from_slice(&[0; 16]);
    out
}

mod tests {
    use super::*;
    use crate::utils::url_escape;

    #[test]
    fn decode_segment_reverses_url_escape() {
        let name = "Artist B & Co - Song #1 (50%).mp3";
        assert_eq!(decode_segment(&url_escape(name)), name);
    }
}
