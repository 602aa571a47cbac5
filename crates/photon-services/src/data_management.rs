//! Tenant data removal on account deletion.

use photon_core::AppError;
use photon_storage::{ManagedStorageConfig, StorageConfig, StorageProviderCache};
use std::sync::Arc;
use std::time::Instant;

use crate::photo_storage::PhotoStorageService;

#[derive(Clone)]
pub struct DataManagementService {
    photo_storage: Arc<PhotoStorageService>,
    providers: Arc<StorageProviderCache>,
}

impl DataManagementService {
    pub fn new(photo_storage: Arc<PhotoStorageService>, providers: Arc<StorageProviderCache>) -> Self {
        Self {
            photo_storage,
            providers,
        }
    }

    /// Delete everything the tenant stored in managed storage. Returns `false`
    /// without touching storage when no managed upstream is configured.
    ///
    /// The managed wrapper turns `delete_folder("")` into a delete of the
    /// tenant namespace, so the shared upstream's other tenants are untouched.
    #[tracing::instrument(skip(self))]
    pub async fn delete_managed_storage_space(&self, tenant_id: &str) -> Result<bool, AppError> {
        let Some(config) = self.build_managed_storage_config(tenant_id).await? else {
            tracing::debug!(tenant_id = %tenant_id, "No managed storage upstream configured");
            return Ok(false);
        };

        let start = Instant::now();
        let provider = self.providers.factory().create_provider(&config)?;
        provider.delete_folder("").await?;
        self.providers.invalidate(tenant_id).await;

        tracing::info!(
            tenant_id = %tenant_id,
            duration_ms = start.elapsed().as_millis(),
            "Deleted managed storage space"
        );
        Ok(true)
    }

    async fn build_managed_storage_config(
        &self,
        tenant_id: &str,
    ) -> Result<Option<StorageConfig>, AppError> {
        let Some((provider_key, upstream)) = self.photo_storage.managed_upstream().await? else {
            return Ok(None);
        };

        Ok(Some(StorageConfig::Managed(ManagedStorageConfig {
            tenant_id: tenant_id.to_string(),
            provider_key,
            upstream,
            base_prefix: None,
        })))
    }
}
