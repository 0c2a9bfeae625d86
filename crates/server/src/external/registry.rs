use std::time::Duration;

use common::TrackRecord;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::ImportError;

const REGISTRY_TIMEOUT: Duration = Duration::from_secs(30);

/// Catalog backend that records every imported track.
pub struct RegistryClient {
    http: Client,
    base_url: String,
    api_key: String,
}

/// Whatever the registry answered with; passed through untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct RegistryAck(pub Value);

impl RegistryClient {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub async fn register(&self, record: &TrackRecord) -> Result<RegistryAck, ImportError> {
        let url = format!("{}/tracks", self.base_url);
        let response = self
            .http
            .post(&url)
            .timeout(REGISTRY_TIMEOUT)
            .header("X-API-Key", &self.api_key)
            .json(record)
            .send()
            .await
            .map_err(|err| ImportError::RegistrationFailed(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImportError::RegistrationFailed(format!(
                "http {}: {}",
                status,
                body.trim()
            )));
        }
        let body = response
            .bytes()
            .await
            .map_err(|err| ImportError::RegistrationFailed(err.to_string()))?;
        let ack = serde_json::from_slice(&body).unwrap_or_else(|err| {
            debug!("Registry answered with non-JSON body: {}", err);
            Value::Null
        });
        Ok(RegistryAck(ack))
    }
}
