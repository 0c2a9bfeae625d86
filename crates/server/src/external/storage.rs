use std::time::Duration;

use bytes::Bytes;
use common::UploadResult;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ImportError;
use crate::oauth::{request_token, TokenCache};
use crate::utils::url_escape;

pub const MICROSOFT_LOGIN_URL: &str = "https://login.microsoftonline.com";
pub const GRAPH_API_URL: &str = "https://graph.microsoft.com/v1.0";

const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
const UPLOAD_FOLDER: &str = "Music";
const API_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone, Debug)]
pub struct StorageCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
    /// Drive owner the files land in.
    pub user_id: String,
}

/// OneDrive through Microsoft Graph, authenticated as the application.
pub struct StorageClient {
    http: Client,
    credentials: StorageCredentials,
    login_url: String,
    graph_url: String,
    tokens: TokenCache,
}

#[derive(Deserialize)]
struct DriveItem {
    id: String,
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default, rename = "parentReference")]
    parent_reference: Option<ParentReference>,
}

#[derive(Deserialize)]
struct ParentReference {
    #[serde(default)]
    path: Option<String>,
}

#[derive(Deserialize)]
struct ThumbnailSets {
    #[serde(default)]
    value: Vec<ThumbnailSet>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ThumbnailSet {
    #[serde(default)]
    pub large: Option<Thumbnail>,
    #[serde(default)]
    pub medium: Option<Thumbnail>,
    #[serde(default)]
    pub small: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
pub struct Thumbnail {
    pub url: String,
}

impl StorageClient {
    pub fn new(http: Client, credentials: StorageCredentials) -> Self {
        Self {
            http,
            credentials,
            login_url: MICROSOFT_LOGIN_URL.to_string(),
            graph_url: GRAPH_API_URL.to_string(),
            tokens: TokenCache::new(),
        }
    }

    pub fn with_endpoints(mut self, login_url: impl Into<String>, graph_url: impl Into<String>) -> Self {
        self.login_url = login_url.into().trim_end_matches('/').to_string();
        self.graph_url = graph_url.into().trim_end_matches('/').to_string();
        self
    }

    /// PUT the bytes into the music folder, then look up a thumbnail.
    /// Only the PUT can fail the upload.
    pub async fn upload(&self, filename: &str, audio: Bytes) -> Result<UploadResult, ImportError> {
        let item = self
            .put_content(filename, audio)
            .await
            .map_err(ImportError::UploadFailed)?;
        let path = match item.parent_reference.and_then(|parent| parent.path) {
            Some(parent) => format!("{}/{}", parent, item.name),
            None => format!("/{}", item.name),
        };
        let thumbnail_url = self.thumbnail_url(&item.id).await;
        debug!("Stored {} as item {}", path, item.id);
        Ok(UploadResult {
            item_id: item.id,
            path,
            thumbnail_url,
            file_size: item.size.unwrap_or(0),
        })
    }

    /// Remove an item again. Used to roll back an upload whose
    /// registration failed.
    pub async fn delete(&self, item_id: &str) -> Result<(), String> {
        let token = self.access_token().await?;
        let url = format!("{}/drive/items/{}", self.user_drive_url(), url_escape(item_id));
        let response = self
            .http
            .delete(&url)
            .timeout(API_TIMEOUT)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| err.to_string())?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("http {}", response.status()))
        }
    }

    fn user_drive_url(&self) -> String {
        format!(
            "{}/users/{}",
            self.graph_url,
            url_escape(&self.credentials.user_id)
        )
    }

    async fn access_token(&self) -> Result<String, String> {
        let token_url = format!("{}/{}/oauth2/v2.0/token", self.login_url, self.credentials.tenant_id);
        self.tokens
            .bearer(|| {
                request_token(self.http.post(&token_url).timeout(API_TIMEOUT).form(&[
                    ("client_id", self.credentials.client_id.as_str()),
                    ("client_secret", self.credentials.client_secret.as_str()),
                    ("scope", GRAPH_SCOPE),
                    ("grant_type", "client_credentials"),
                ]))
            })
            .await
    }

    async fn put_content(&self, filename: &str, audio: Bytes) -> Result<DriveItem, String> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/drive/root:/{}/{}:/content",
            self.user_drive_url(),
            UPLOAD_FOLDER,
            url_escape(filename)
        );
        let response = self
            .http
            .put(&url)
            .timeout(UPLOAD_TIMEOUT)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(audio)
            .send()
            .await
            .map_err(|err| err.to_string())?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("http {}: {}", status, body.trim()));
        }
        response
            .json::<DriveItem>()
            .await
            .map_err(|err| format!("invalid upload response: {}", err))
    }

    async fn thumbnail_url(&self, item_id: &str) -> Option<String> {
        let result: Result<ThumbnailSets, String> = async {
            let token = self.access_token().await?;
            let url = format!(
                "{}/drive/items/{}/thumbnails",
                self.user_drive_url(),
                url_escape(item_id)
            );
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
                .json::<ThumbnailSets>()
                .await
                .map_err(|err| err.to_string())
        }
        .await;
        match result {
            Ok(sets) => pick_thumbnail(sets.value),
            Err(err) => {
                warn!("Thumbnail lookup failed for {}: {}", item_id, err);
                None
            }
        }
    }
}

/// Largest size of the first thumbnail set.
pub fn pick_thumbnail(sets: Vec<ThumbnailSet>) -> Option<String> {
    let set = sets.into_iter().next()?;
    set.large
        .or(set.medium)
        .or(set.small)
        .map(|thumbnail| thumbnail.url)
}
