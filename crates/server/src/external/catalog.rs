use std::time::Duration;

use common::{AudioFormat, TrackMetadata};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ImportError;
use crate::oauth::{request_token, TokenCache};
use crate::utils::clean_text;

pub const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";

const API_TIMEOUT: Duration = Duration::from_secs(30);
const ARTWORK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct CatalogCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Spotify Web API client: resolves a track page URL into metadata.
pub struct CatalogClient {
    http: Client,
    credentials: CatalogCredentials,
    token_url: String,
    api_url: String,
    tokens: TokenCache,
}

#[derive(Deserialize)]
struct SpotifyTrack {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
    #[serde(default)]
    album: Option<SpotifyAlbum>,
    #[serde(default)]
    duration_ms: Option<u64>,
    #[serde(default)]
    track_number: Option<u32>,
    #[serde(default)]
    disc_number: Option<u32>,
}

#[derive(Deserialize)]
struct SpotifyArtist {
    name: Option<String>,
}

#[derive(Deserialize)]
struct SpotifyAlbum {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
    #[serde(default)]
    images: Vec<SpotifyImage>,
}

#[derive(Deserialize)]
struct SpotifyImage {
    url: String,
}

impl CatalogClient {
    pub fn new(http: Client, credentials: CatalogCredentials) -> Self {
        Self {
            http,
            credentials,
            token_url: SPOTIFY_TOKEN_URL.to_string(),
            api_url: SPOTIFY_API_URL.to_string(),
            tokens: TokenCache::new(),
        }
    }

    pub fn with_endpoints(mut self, token_url: impl Into<String>, api_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Look up a track and download its cover. The cover is best-effort:
    /// `artwork_url` is kept even when its bytes could not be fetched.
    pub async fn fetch(&self, catalog_url: &str) -> Result<TrackMetadata, ImportError> {
        let track_id = track_id_from_url(catalog_url)?;
        let track = self
            .lookup(&track_id)
            .await
            .map_err(ImportError::MetadataFetchFailed)?;
        let mut metadata = metadata_from_track(track);
        if let Some(url) = metadata.artwork_url.clone() {
            metadata.artwork_bytes = self.download_artwork(&url).await;
        }
        debug!(
            "Catalog track {} resolved to {} - {}",
            track_id,
            metadata.artist_or_placeholder(),
            metadata.title_or_placeholder()
        );
        Ok(metadata)
    }

    async fn access_token(&self) -> Result<String, String> {
        self.tokens
            .bearer(|| {
                request_token(
                    self.http
                        .post(&self.token_url)
                        .timeout(API_TIMEOUT)
                        .basic_auth(
                            &self.credentials.client_id,
                            Some(&self.credentials.client_secret),
                        )
                        .form(&[("grant_type", "client_credentials")]),
                )
            })
            .await
    }

    async fn lookup(&self, track_id: &str) -> Result<SpotifyTrack, String> {
        let token = self.access_token().await?;
        let url = format!("{}/tracks/{}", self.api_url, track_id);
        let response = self
            .http
            .get(&url)
            .timeout(API_TIMEOUT)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| err.to_string())?;
        if !response.status().is_success() {
            return Err(format!("http {}", response.status()));
        }
        response
            .json::<SpotifyTrack>()
            .await
            .map_err(|err| err.to_string())
    }

    async fn download_artwork(&self, url: &str) -> Option<Vec<u8>> {
        let result: Result<Vec<u8>, String> = async {
            let response = self
                .http
                .get(url)
                .timeout(ARTWORK_TIMEOUT)
                .send()
                .await
                .map_err(|err| err.to_string())?;
            if !response.status().is_success() {
                return Err(format!("http {}", response.status()));
            }
            response
                .bytes()
                .await
                .map(|bytes| bytes.to_vec())
                .map_err(|err| err.to_string())
        }
        .await;
        match result {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(err) => {
                warn!("Artwork download failed for {}: {}", url, err);
                None
            }
        }
    }
}

/// The path segment right after `track`; the query string is ignored.
pub fn track_id_from_url(catalog_url: &str) -> Result<String, ImportError> {
    let invalid = || ImportError::InvalidReference(format!("no track id in {}", catalog_url));
    let url = Url::parse(catalog_url.trim()).map_err(|_| invalid())?;
    let mut segments = url.path_segments().ok_or_else(invalid)?;
    segments.find(|segment| *segment == "track").ok_or_else(invalid)?;
    match segments.next() {
        Some(id) if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()) => {
            Ok(id.to_string())
        }
        _ => Err(invalid()),
    }
}

fn metadata_from_track(track: SpotifyTrack) -> TrackMetadata {
    // Real format is only known once the audio arrives.
    let mut metadata = TrackMetadata::new(AudioFormat::Mp3);
    metadata.title = clean_text(track.name);
    metadata.artist = first_name(track.artists);
    metadata.track_number = track.track_number;
    metadata.disc_number = track.disc_number;
    metadata.duration = track
        .duration_ms
        .map(|ms| (ms / 1000).min(u64::from(u32::MAX)) as u32)
        .unwrap_or(0);
    if let Some(album) = track.album {
        metadata.album = clean_text(album.name);
        metadata.album_artist = first_name(album.artists);
        metadata.year = album.release_date.as_deref().and_then(release_year);
        metadata.artwork_url = album.images.into_iter().next().map(|image| image.url);
    }
    metadata
}

fn first_name(artists: Vec<SpotifyArtist>) -> Option<String> {
    artists.into_iter().next().and_then(|artist| clean_text(artist.name))
}

/// Year from the first four characters of a release date. Short or
/// malformed dates yield nothing instead of failing the lookup.
pub fn release_year(release_date: &str) -> Option<i32> {
    release_date.get(..4)?.parse().ok()
}
