//! In-memory collaborators and a factory whose `s3` tag resolves to one
//! shared in-memory bucket.
//!
//! Run from workspace root: `cargo test -p photon-services`.

use async_trait::async_trait;
use photon_core::AppError;
use photon_services::{
    BuilderConfig, BuilderConfigSource, DataManagementService, PhotoAssetService,
    PhotoStorageService, SettingStore, StoragePlanService, StoragePlanSummary, SystemSettingStore,
    ACTIVE_PROVIDER_SETTING,
};
use photon_storage::{
    InMemoryStorageProvider, ProviderCategory, ProviderRecord, StorageFactory, StorageProvider,
    StorageProviderCache,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct InMemorySettings {
    values: Mutex<HashMap<(String, String), String>>,
    active: Mutex<HashMap<String, ProviderRecord>>,
}

impl InMemorySettings {
    pub fn set_active_provider_id(&self, tenant_id: &str, id: &str) {
        self.values.lock().unwrap().insert(
            (ACTIVE_PROVIDER_SETTING.to_string(), tenant_id.to_string()),
            id.to_string(),
        );
    }

    pub fn set_active_provider(&self, tenant_id: &str, record: ProviderRecord) {
        self.active
            .lock()
            .unwrap()
            .insert(tenant_id.to_string(), record);
    }
}

#[async_trait]
impl SettingStore for InMemorySettings {
    async fn get_setting(&self, key: &str, tenant_id: &str) -> Result<Option<String>, AppError> {
        Ok(self
            .values
            .lock()
            .unwrap()
            .get(&(key.to_string(), tenant_id.to_string()))
            .cloned())
    }

    async fn get_active_storage_provider(
        &self,
        tenant_id: &str,
    ) -> Result<Option<ProviderRecord>, AppError> {
        Ok(self.active.lock().unwrap().get(tenant_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemorySystemSettings {
    managed: Mutex<Option<ProviderRecord>>,
}

impl InMemorySystemSettings {
    pub fn set_managed_provider(&self, record: ProviderRecord) {
        *self.managed.lock().unwrap() = Some(record);
    }
}

#[async_trait]
impl SystemSettingStore for InMemorySystemSettings {
    async fn get_managed_storage_provider(&self) -> Result<Option<ProviderRecord>, AppError> {
        Ok(self.managed.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct InMemoryPlans {
    plans: Mutex<HashMap<String, StoragePlanSummary>>,
}

impl InMemoryPlans {
    pub fn grant(&self, tenant_id: &str, plan_id: &str) {
        self.plans.lock().unwrap().insert(
            tenant_id.to_string(),
            StoragePlanSummary {
                plan_id: plan_id.to_string(),
                quota_bytes: None,
            },
        );
    }
}

#[async_trait]
impl StoragePlanService for InMemoryPlans {
    async fn get_plan_summary_for_tenant(
        &self,
        tenant_id: &str,
    ) -> Result<Option<StoragePlanSummary>, AppError> {
        Ok(self.plans.lock().unwrap().get(tenant_id).cloned())
    }
}

/// Every tenant starts from the same defaults.
pub struct DefaultBuilderConfigs;

#[async_trait]
impl BuilderConfigSource for DefaultBuilderConfigs {
    async fn get_config_for_tenant(&self, _tenant_id: &str) -> Result<BuilderConfig, AppError> {
        Ok(BuilderConfig::default())
    }
}

pub struct Harness {
    pub settings: Arc<InMemorySettings>,
    pub system_settings: Arc<InMemorySystemSettings>,
    pub plans: Arc<InMemoryPlans>,
    pub bucket: Arc<InMemoryStorageProvider>,
    pub photo_storage: Arc<PhotoStorageService>,
    pub providers: Arc<StorageProviderCache>,
}

impl Harness {
    pub fn new() -> Self {
        let bucket = Arc::new(InMemoryStorageProvider::with_base_url("https://cdn.test"));

        let mut factory = StorageFactory::with_default_providers();
        let shared = bucket.clone();
        factory.register_provider(
            "s3",
            move |_, _| Ok(shared.clone() as Arc<dyn StorageProvider>),
            ProviderCategory::Remote,
        );

        let settings = Arc::new(InMemorySettings::default());
        let system_settings = Arc::new(InMemorySystemSettings::default());
        let plans = Arc::new(InMemoryPlans::default());
        let photo_storage = Arc::new(PhotoStorageService::new(
            settings.clone(),
            Arc::new(DefaultBuilderConfigs),
            system_settings.clone(),
            plans.clone(),
        ));
        let providers = Arc::new(StorageProviderCache::new(Arc::new(factory), 16));

        Self {
            settings,
            system_settings,
            plans,
            bucket,
            photo_storage,
            providers,
        }
    }

    /// Tenant `tenant_id` on the managed tier over the shared bucket.
    pub fn managed_tenant(&self, tenant_id: &str) {
        self.system_settings.set_managed_provider(
            ProviderRecord::new("managed-s3", "s3")
                .with("bucket", "shared")
                .with("prefix", "tenants"),
        );
        self.settings
            .set_active_provider_id(tenant_id, photon_services::MANAGED_ACTIVE_PROVIDER_ID);
        self.plans.grant(tenant_id, "pro");
    }

    pub fn assets(&self) -> PhotoAssetService {
        PhotoAssetService::new(self.photo_storage.clone(), self.providers.clone())
    }

    pub fn data_management(&self) -> DataManagementService {
        DataManagementService::new(self.photo_storage.clone(), self.providers.clone())
    }
}
