//! Storage config resolution for tenants.
//!
//! Other subsystems call `resolve_config_for_tenant` to get a ready-to-use
//! `StorageConfig` plus the builder config it is embedded in. A tenant whose
//! active provider setting is `managed` and who holds a storage plan gets a
//! managed config wrapping the platform upstream; everyone else gets their own
//! active provider record, mapped and validated.

use photon_core::AppError;
use photon_storage::{
    map_provider_to_storage_config, ManagedStorageConfig, ProviderRecord, RemoteStorageConfig,
    StorageConfig,
};
use std::sync::Arc;

use crate::builder_config::BuilderConfig;
use crate::collaborators::{BuilderConfigSource, SettingStore, StoragePlanService, SystemSettingStore};

/// Tenant setting holding the id of the active storage provider.
pub const ACTIVE_PROVIDER_SETTING: &str = "builder.storage.activeProvider";

/// Active provider id that selects the managed tier.
pub const MANAGED_ACTIVE_PROVIDER_ID: &str = "managed";

/// Caller-supplied configs that bypass the settings lookup.
#[derive(Debug, Clone, Default)]
pub struct ResolveOverrides {
    pub builder_config: Option<BuilderConfig>,
    pub storage_config: Option<StorageConfig>,
}

#[derive(Debug, Clone)]
pub struct ResolvedStorage {
    pub builder_config: BuilderConfig,
    pub storage_config: StorageConfig,
}

#[derive(Clone)]
pub struct PhotoStorageService {
    settings: Arc<dyn SettingStore>,
    builder_configs: Arc<dyn BuilderConfigSource>,
    system_settings: Arc<dyn SystemSettingStore>,
    plans: Arc<dyn StoragePlanService>,
}

impl PhotoStorageService {
    pub fn new(
        settings: Arc<dyn SettingStore>,
        builder_configs: Arc<dyn BuilderConfigSource>,
        system_settings: Arc<dyn SystemSettingStore>,
        plans: Arc<dyn StoragePlanService>,
    ) -> Self {
        Self {
            settings,
            builder_configs,
            system_settings,
            plans,
        }
    }

    #[tracing::instrument(skip(self, overrides))]
    pub async fn resolve_config_for_tenant(
        &self,
        tenant_id: &str,
        overrides: ResolveOverrides,
    ) -> Result<ResolvedStorage, AppError> {
        let active_provider_id = self
            .settings
            .get_setting(ACTIVE_PROVIDER_SETTING, tenant_id)
            .await?
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        if let Some(builder_config) = overrides.builder_config {
            let storage_config = overrides
                .storage_config
                .or_else(|| builder_config.user_storage().cloned())
                .ok_or_else(|| {
                    AppError::BadRequest(
                        "Builder config override is missing storage configuration.".to_string(),
                    )
                })?;
            return Ok(ResolvedStorage {
                builder_config,
                storage_config,
            });
        }

        let active_provider = self.settings.get_active_storage_provider(tenant_id).await?;

        if active_provider_id.as_deref() == Some(MANAGED_ACTIVE_PROVIDER_ID) {
            if let Some(managed) = self.try_resolve_managed_storage_config(tenant_id).await? {
                let storage_config = StorageConfig::Managed(managed);
                tracing::debug!(
                    tenant_id = %tenant_id,
                    "Resolved managed storage for tenant"
                );
                return self.with_builder_config(tenant_id, storage_config).await;
            }
        }

        let Some(active_provider) = active_provider else {
            return Err(AppError::BadRequest(
                "Active storage provider is not configured. Configure storage settings before running sync."
                    .to_string(),
            ));
        };

        let storage_config = self.map_provider_to_storage_config(&active_provider)?;
        tracing::debug!(
            tenant_id = %tenant_id,
            provider = storage_config.provider_tag(),
            "Resolved tenant storage provider"
        );
        self.with_builder_config(tenant_id, storage_config).await
    }

    /// Map and validate a provider record. Configuration problems surface as
    /// `AppError::StorageConfiguration` naming the offending field.
    pub fn map_provider_to_storage_config(
        &self,
        provider: &ProviderRecord,
    ) -> Result<StorageConfig, AppError> {
        map_provider_to_storage_config(provider).map_err(AppError::from)
    }

    /// The system-wide managed upstream, mapped, or `None` when the platform
    /// has not configured one.
    pub async fn managed_upstream(&self) -> Result<Option<(String, RemoteStorageConfig)>, AppError> {
        let Some(provider) = self.system_settings.get_managed_storage_provider().await? else {
            return Ok(None);
        };
        let upstream = self.map_upstream(&provider)?;
        Ok(Some((provider.id, upstream)))
    }

    async fn try_resolve_managed_storage_config(
        &self,
        tenant_id: &str,
    ) -> Result<Option<ManagedStorageConfig>, AppError> {
        let (plan, provider) = tokio::try_join!(
            self.plans.get_plan_summary_for_tenant(tenant_id),
            self.system_settings.get_managed_storage_provider(),
        )?;

        if plan.is_none() {
            return Ok(None);
        }

        let Some(provider) = provider else {
            return Err(AppError::BadRequest(
                "Managed storage is not enabled or has no provider configured.".to_string(),
            ));
        };

        let upstream = self.map_upstream(&provider)?;
        Ok(Some(ManagedStorageConfig {
            tenant_id: tenant_id.to_string(),
            provider_key: provider.id,
            upstream,
            base_prefix: None,
        }))
    }

    fn map_upstream(&self, provider: &ProviderRecord) -> Result<RemoteStorageConfig, AppError> {
        let mapped = self.map_provider_to_storage_config(provider)?;
        RemoteStorageConfig::try_from(mapped).map_err(AppError::from)
    }

    async fn with_builder_config(
        &self,
        tenant_id: &str,
        storage_config: StorageConfig,
    ) -> Result<ResolvedStorage, AppError> {
        let mut builder_config = self.builder_configs.get_config_for_tenant(tenant_id).await?;
        builder_config.ensure_user_settings().storage = Some(storage_config.clone());
        Ok(ResolvedStorage {
            builder_config,
            storage_config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::StoragePlanSummary;
    use async_trait::async_trait;
    use photon_storage::S3CompatibleConfig;

    /// Collaborators that fail the test if the resolver consults them.
    struct Untouched;

    #[async_trait]
    impl SettingStore for Untouched {
        async fn get_setting(&self, _: &str, _: &str) -> Result<Option<String>, AppError> {
            Ok(Some(MANAGED_ACTIVE_PROVIDER_ID.to_string()))
        }

        async fn get_active_storage_provider(
            &self,
            _: &str,
        ) -> Result<Option<ProviderRecord>, AppError> {
            panic!("active provider lookup must be skipped when overrides are given")
        }
    }

    #[async_trait]
    impl BuilderConfigSource for Untouched {
        async fn get_config_for_tenant(&self, _: &str) -> Result<BuilderConfig, AppError> {
            panic!("builder config lookup must be skipped when overrides are given")
        }
    }

    #[async_trait]
    impl SystemSettingStore for Untouched {
        async fn get_managed_storage_provider(&self) -> Result<Option<ProviderRecord>, AppError> {
            Ok(None)
        }
    }

    #[async_trait]
    impl StoragePlanService for Untouched {
        async fn get_plan_summary_for_tenant(
            &self,
            _: &str,
        ) -> Result<Option<StoragePlanSummary>, AppError> {
            Ok(None)
        }
    }

    fn service() -> PhotoStorageService {
        let untouched = Arc::new(Untouched);
        PhotoStorageService::new(
            untouched.clone(),
            untouched.clone(),
            untouched.clone(),
            untouched,
        )
    }

    #[tokio::test]
    async fn override_storage_config_wins() {
        let mut builder_config = BuilderConfig::default();
        builder_config.ensure_user_settings().storage =
            Some(StorageConfig::S3(S3CompatibleConfig::new("from-builder")));

        let resolved = service()
            .resolve_config_for_tenant(
                "acme",
                ResolveOverrides {
                    builder_config: Some(builder_config.clone()),
                    storage_config: Some(StorageConfig::S3(S3CompatibleConfig::new("explicit"))),
                },
            )
            .await
            .unwrap();

        assert_eq!(
            resolved.storage_config,
            StorageConfig::S3(S3CompatibleConfig::new("explicit"))
        );
        assert_eq!(resolved.builder_config, builder_config);
    }

    #[tokio::test]
    async fn override_falls_back_to_builder_user_storage() {
        let mut builder_config = BuilderConfig::default();
        builder_config.ensure_user_settings().storage =
            Some(StorageConfig::S3(S3CompatibleConfig::new("from-builder")));

        let resolved = service()
            .resolve_config_for_tenant(
                "acme",
                ResolveOverrides {
                    builder_config: Some(builder_config),
                    storage_config: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(
            resolved.storage_config,
            StorageConfig::S3(S3CompatibleConfig::new("from-builder"))
        );
    }

    #[tokio::test]
    async fn override_without_any_storage_is_bad_request() {
        let err = service()
            .resolve_config_for_tenant(
                "acme",
                ResolveOverrides {
                    builder_config: Some(BuilderConfig::default()),
                    storage_config: None,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::BadRequest(ref msg) if msg.contains("missing storage")));
    }

    #[test]
    fn mapping_errors_become_configuration_errors() {
        let err = service()
            .map_provider_to_storage_config(&ProviderRecord::new("p1", "github").with("owner", "me"))
            .unwrap_err();
        assert!(matches!(err, AppError::StorageConfiguration(ref msg) if msg.contains("repo")));

        let err = service()
            .map_provider_to_storage_config(&ProviderRecord::new("p2", "local"))
            .unwrap_err();
        assert!(matches!(err, AppError::StorageConfiguration(ref msg) if msg.contains("Local")));
    }
}
