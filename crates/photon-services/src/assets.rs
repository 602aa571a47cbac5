//! Photo asset service functions backing the storage URL and upload endpoints.

use bytes::Bytes;
use futures::future::try_join_all;
use photon_core::AppError;
use photon_storage::keys::{join_segments, normalize_path};
use photon_storage::{StorageProvider, StorageProviderCache, UploadOptions};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::photo_storage::{PhotoStorageService, ResolveOverrides};

/// One file received by the upload endpoint.
#[derive(Debug, Clone)]
pub struct AssetUpload {
    pub file_name: String,
    pub data: Bytes,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedAsset {
    pub key: String,
    pub url: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

#[derive(Clone)]
pub struct PhotoAssetService {
    photo_storage: Arc<PhotoStorageService>,
    providers: Arc<StorageProviderCache>,
}

impl PhotoAssetService {
    pub fn new(photo_storage: Arc<PhotoStorageService>, providers: Arc<StorageProviderCache>) -> Self {
        Self {
            photo_storage,
            providers,
        }
    }

    /// Public URL for `key` in the tenant's active storage.
    pub async fn storage_url(&self, tenant_id: &str, key: &str) -> Result<String, AppError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::BadRequest("Missing storage key parameter".to_string()));
        }

        let provider = self.provider_for(tenant_id).await?;
        Ok(provider.generate_public_url(key).await?)
    }

    /// Upload files into `directory` (tenant-relative). Keys are
    /// `directory/file_name`; uploads run concurrently and results keep the
    /// input order.
    #[tracing::instrument(skip(self, files), fields(file_count = files.len()))]
    pub async fn upload_assets(
        &self,
        tenant_id: &str,
        files: Vec<AssetUpload>,
        directory: Option<&str>,
    ) -> Result<Vec<UploadedAsset>, AppError> {
        if files.is_empty() {
            return Err(AppError::BadRequest("No files found to upload".to_string()));
        }

        let directory = directory.and_then(|d| normalize_path(Some(d)));
        let mut keyed = Vec::with_capacity(files.len());
        for file in files {
            if normalize_path(Some(&file.file_name)).is_none() {
                return Err(AppError::BadRequest(
                    "Uploaded file is missing a file name".to_string(),
                ));
            }
            let key = join_segments([directory.as_deref().unwrap_or(""), file.file_name.as_str()]);
            keyed.push((key, file));
        }

        let provider = self.provider_for(tenant_id).await?;
        let start = Instant::now();

        let uploads = keyed.into_iter().map(|(key, file)| {
            let provider = provider.clone();
            async move {
                let options = UploadOptions {
                    content_type: file.content_type.clone(),
                };
                let stored = provider.upload_file(&key, file.data, options).await?;
                let url = provider.generate_public_url(&stored.key).await?;
                Ok::<_, AppError>(UploadedAsset {
                    key: stored.key,
                    url,
                    size: stored.size,
                    content_type: file.content_type,
                })
            }
        });
        let assets = try_join_all(uploads).await?;

        tracing::info!(
            tenant_id = %tenant_id,
            uploaded = assets.len(),
            duration_ms = start.elapsed().as_millis(),
            "Uploaded photo assets"
        );
        Ok(assets)
    }

    async fn provider_for(&self, tenant_id: &str) -> Result<Arc<dyn StorageProvider>, AppError> {
        let resolved = self
            .photo_storage
            .resolve_config_for_tenant(tenant_id, ResolveOverrides::default())
            .await?;
        Ok(self
            .providers
            .get_or_create(tenant_id, &resolved.storage_config)
            .await?)
    }
}
