//! Photon Services Layer
//!
//! This crate is the **business service layer** on top of `photon-storage`:
//! it resolves which storage a tenant syncs against (including the managed
//! tier), backs the storage URL and asset upload endpoints, and purges a
//! tenant's managed namespace on account deletion. The collaborators it needs
//! (settings, billing, builder config) are traits so the API crate can plug
//! in its own persistence.

pub mod assets;
pub mod builder_config;
pub mod collaborators;
pub mod data_management;
pub mod photo_storage;

pub use assets::{AssetUpload, PhotoAssetService, UploadedAsset};
pub use builder_config::{BuilderConfig, ProcessingSettings, SystemSettings, UserSettings};
pub use collaborators::{
    BuilderConfigSource, SettingStore, StoragePlanService, StoragePlanSummary, SystemSettingStore,
};
pub use data_management::DataManagementService;
pub use photo_storage::{
    PhotoStorageService, ResolveOverrides, ResolvedStorage, ACTIVE_PROVIDER_SETTING,
    MANAGED_ACTIVE_PROVIDER_ID,
};
pub use photon_storage::{
    StorageConfig, StorageError, StorageFactory, StorageProvider, StorageProviderCache,
    StorageResult,
};
