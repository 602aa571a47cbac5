//! Interfaces to the subsystems the storage services depend on.
//!
//! Persistence for settings, billing and builder configuration lives outside
//! this crate; the API layer provides implementations backed by its database.

use async_trait::async_trait;
use photon_core::AppError;
use photon_storage::ProviderRecord;
use serde::{Deserialize, Serialize};

use crate::builder_config::BuilderConfig;

/// Tenant-scoped settings.
#[async_trait]
pub trait SettingStore: Send + Sync {
    /// Raw value of a tenant setting such as `builder.storage.activeProvider`.
    async fn get_setting(&self, key: &str, tenant_id: &str) -> Result<Option<String>, AppError>;

    /// The provider record the tenant selected as active, if any.
    async fn get_active_storage_provider(
        &self,
        tenant_id: &str,
    ) -> Result<Option<ProviderRecord>, AppError>;
}

/// Platform-wide settings.
#[async_trait]
pub trait SystemSettingStore: Send + Sync {
    /// The shared upstream that backs the managed storage tier.
    async fn get_managed_storage_provider(&self) -> Result<Option<ProviderRecord>, AppError>;
}

/// Billing summary relevant to storage. Presence gates the managed tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoragePlanSummary {
    pub plan_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_bytes: Option<u64>,
}

#[async_trait]
pub trait StoragePlanService: Send + Sync {
    async fn get_plan_summary_for_tenant(
        &self,
        tenant_id: &str,
    ) -> Result<Option<StoragePlanSummary>, AppError>;
}

#[async_trait]
pub trait BuilderConfigSource: Send + Sync {
    async fn get_config_for_tenant(&self, tenant_id: &str) -> Result<BuilderConfig, AppError>;
}
