use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_WORKER_URL: &str = "http://localhost:8787";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Shared secret: checked on `/import` and sent to the registry.
    pub api_key: String,
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    pub onedrive_client_id: String,
    pub onedrive_client_secret: String,
    pub onedrive_tenant_id: String,
    pub onedrive_user_id: String,
    pub worker_api_url: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            spotify_client_id: String::new(),
            spotify_client_secret: String::new(),
            onedrive_client_id: String::new(),
            onedrive_client_secret: String::new(),
            onedrive_tenant_id: String::new(),
            onedrive_user_id: String::new(),
            worker_api_url: DEFAULT_WORKER_URL.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("AUDIO_UPLOAD_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

pub fn load_or_create_config(path: &Path) -> Result<(ServerConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: ServerConfig = serde_yaml::from_str(&contents)?;
        if config.port == 0 {
            config.port = DEFAULT_PORT;
        }
        return Ok((config, false));
    }

    let config = ServerConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

/// Environment variables win over the file. Blank values are ignored.
pub fn apply_env_overrides<F>(config: &mut ServerConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let fields: [(&str, &mut String); 8] = [
        ("API_KEY", &mut config.api_key),
        ("SPOTIFY_CLIENT_ID", &mut config.spotify_client_id),
        ("SPOTIFY_CLIENT_SECRET", &mut config.spotify_client_secret),
        ("ONEDRIVE_CLIENT_ID", &mut config.onedrive_client_id),
        ("ONEDRIVE_CLIENT_SECRET", &mut config.onedrive_client_secret),
        ("ONEDRIVE_TENANT_ID", &mut config.onedrive_tenant_id),
        ("ONEDRIVE_USER_ID", &mut config.onedrive_user_id),
        ("WORKER_API_URL", &mut config.worker_api_url),
    ];
    for (name, field) in fields {
        if let Some(value) = lookup(name).filter(|value| !value.trim().is_empty()) {
            *field = value.trim().to_string();
        }
    }
    if let Some(port) = lookup("PORT").and_then(|value| value.trim().parse::<u16>().ok()) {
        if port != 0 {
            config.port = port;
        }
    }
}

/// Settings that must be present before the server accepts traffic.
/// Returns the names of settings that are blank but only degrade imports.
pub fn validate(config: &ServerConfig) -> Result<Vec<&'static str>, ConfigError> {
    if config.api_key.trim().is_empty() {
        return Err(ConfigError::Missing("api_key"));
    }
    let optional = [
        ("spotify_client_id", &config.spotify_client_id),
        ("spotify_client_secret", &config.spotify_client_secret),
        ("onedrive_client_id", &config.onedrive_client_id),
        ("onedrive_client_secret", &config.onedrive_client_secret),
        ("onedrive_tenant_id", &config.onedrive_tenant_id),
        ("onedrive_user_id", &config.onedrive_user_id),
        ("worker_api_url", &config.worker_api_url),
    ];
    Ok(optional
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect())
}
