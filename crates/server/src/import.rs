use bytes::Bytes;
use common::{DownloadResult, TrackMetadata, TrackRecord};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{ImportError, ImportFailure, ImportStage};
use crate::external::catalog::{CatalogClient, CatalogCredentials};
use crate::external::registry::{RegistryAck, RegistryClient};
use crate::external::storage::{StorageClient, StorageCredentials};
use crate::source::direct::DirectDownloader;
use crate::source::extract::StreamExtractor;
use crate::source::{SourceImportFlow, StagedAudio};

/// Runs one import from source to registry. Holds no per-request state,
/// so a single instance serves every request.
pub struct Importer {
    catalog: CatalogClient,
    direct: DirectDownloader,
    extractor: StreamExtractor,
    storage: StorageClient,
    registry: RegistryClient,
}

#[derive(Debug)]
pub struct ImportOutcome {
    pub record: TrackRecord,
    /// Metadata as it was embedded, before placeholders were applied.
    pub metadata: TrackMetadata,
    pub ack: RegistryAck,
}

impl Importer {
    pub fn new(
        catalog: CatalogClient,
        direct: DirectDownloader,
        extractor: StreamExtractor,
        storage: StorageClient,
        registry: RegistryClient,
    ) -> Self {
        Self {
            catalog,
            direct,
            extractor,
            storage,
            registry,
        }
    }

    pub fn from_config(http: reqwest::Client, config: &ServerConfig) -> Self {
        Self::new(
            CatalogClient::new(
                http.clone(),
                CatalogCredentials {
                    client_id: config.spotify_client_id.clone(),
                    client_secret: config.spotify_client_secret.clone(),
                },
            ),
            DirectDownloader::new(http.clone()),
            StreamExtractor::new(),
            StorageClient::new(
                http.clone(),
                StorageCredentials {
                    client_id: config.onedrive_client_id.clone(),
                    client_secret: config.onedrive_client_secret.clone(),
                    tenant_id: config.onedrive_tenant_id.clone(),
                    user_id: config.onedrive_user_id.clone(),
                },
            ),
            RegistryClient::new(http, config.worker_api_url.clone(), config.api_key.clone()),
        )
    }

    pub async fn run(&self, flow: &SourceImportFlow) -> Result<ImportOutcome, ImportFailure> {
        let track_id = Uuid::new_v4().to_string();
        info!("[{}] starting {} import", track_id, flow.label());
        let result = self.run_stages(&track_id, flow).await;
        match &result {
            Ok(outcome) => {
                info!("[{}] imported {}", track_id, outcome.record.title);
                debug!("[{}] registry answered {}", track_id, outcome.ack.0);
            }
            Err(failure) => warn!(
                "[{}] import failed while {}: {}",
                track_id, failure.stage, failure.error
            ),
        }
        result
    }

    async fn run_stages(
        &self,
        track_id: &str,
        flow: &SourceImportFlow,
    ) -> Result<ImportOutcome, ImportFailure> {
        let staged = match flow {
            SourceImportFlow::CatalogDirect {
                catalog_url,
                download_url,
            } => {
                enter(track_id, ImportStage::Fetching);
                let metadata = self
                    .catalog
                    .fetch(catalog_url)
                    .await
                    .map_err(ImportFailure::at(ImportStage::Fetching))?;
                enter(track_id, ImportStage::Downloading);
                let file = self
                    .direct
                    .download(download_url)
                    .await
                    .map_err(ImportFailure::at(ImportStage::Downloading))?;
                StagedAudio::new(file, metadata)
            }
            SourceImportFlow::StreamingExtract { video_url } => {
                enter(track_id, ImportStage::Downloading);
                self.extractor
                    .extract(video_url)
                    .await
                    .map_err(ImportFailure::at(ImportStage::Downloading))?
            }
        };

        enter(track_id, ImportStage::Tagging);
        let download = tag_staged(staged)
            .await
            .map_err(ImportFailure::at(ImportStage::Tagging))?;

        enter(track_id, ImportStage::Uploading);
        let DownloadResult {
            audio_bytes,
            filename,
            metadata,
        } = download;
        let upload = self
            .storage
            .upload(&filename, Bytes::from(audio_bytes))
            .await
            .map_err(ImportFailure::at(ImportStage::Uploading))?;

        enter(track_id, ImportStage::Registering);
        let record = TrackRecord::assemble(track_id.to_string(), &metadata, &upload);
        let ack = match self.registry.register(&record).await {
            Ok(ack) => ack,
            Err(error) => {
                self.roll_back_upload(&upload.item_id).await;
                return Err(ImportFailure {
                    stage: ImportStage::Registering,
                    error,
                });
            }
        };

        enter(track_id, ImportStage::Done);
        Ok(ImportOutcome {
            record,
            metadata,
            ack,
        })
    }

    async fn roll_back_upload(&self, item_id: &str) {
        match self.storage.delete(item_id).await {
            Ok(()) => info!("Removed unregistered upload {}", item_id),
            Err(err) => warn!("Could not remove unregistered upload {}: {}", item_id, err),
        }
    }
}

fn enter(track_id: &str, stage: ImportStage) {
    info!("[{}] {}", track_id, stage);
}

/// Embed metadata into the staged file and read it back into memory.
/// The scratch directory is gone once this returns.
async fn tag_staged(staged: StagedAudio) -> Result<DownloadResult, ImportError> {
    let task = tokio::task::spawn_blocking(move || {
        let StagedAudio { file, mut metadata } = staged;
        metadata::embed(&file.path, file.format, &mut metadata);
        let audio_bytes = std::fs::read(&file.path);
        file.discard();
        let audio_bytes = audio_bytes?;
        let filename = metadata.upload_filename();
        Ok::<_, ImportError>(DownloadResult {
            audio_bytes,
            filename,
            metadata,
        })
    });
    task.await
        .map_err(|err| ImportError::Io(std::io::Error::new(std::io::ErrorKind::Other, err)))?
}
