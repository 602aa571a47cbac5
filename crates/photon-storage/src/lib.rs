//! Photon Storage Library
//!
//! This crate provides the storage abstraction used by the photo platform:
//! the `StorageProvider` trait, one adapter per backend (S3/OSS/COS, GitHub,
//! B2, local filesystem, in-memory), and the managed decorator that confines
//! a tenant to its own namespace inside a shared upstream.
//!
//! # Storage key format
//!
//! Keys are `/`-separated paths relative to the provider's scope. They never
//! start or end with `/` and never contain `.` or `..` segments. The managed
//! provider maps tenant-relative keys to `{upstream base}/{base prefix}/{tenant}/...`.

#[cfg(feature = "storage-b2")]
pub mod b2;
pub mod cache;
pub mod config;
pub mod factory;
#[cfg(feature = "storage-github")]
pub mod github;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod managed;
pub mod mapper;
pub mod media;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
#[cfg(feature = "storage-b2")]
pub use b2::B2Provider;
pub use cache::{StorageProviderCache, DEFAULT_CACHE_CAPACITY};
pub use config::{
    B2Config, EagleConfig, GitHubConfig, LocalConfig, ManagedStorageConfig, MemoryConfig,
    ProviderCategory, RemoteStorageConfig, RetryMode, S3CompatibleConfig, SecretString,
    StorageConfig,
};
pub use factory::{StorageFactory, LOCAL_STORAGE_PROVIDERS};
#[cfg(feature = "storage-github")]
pub use github::GitHubProvider;
#[cfg(feature = "storage-local")]
pub use local::LocalProvider;
pub use managed::ManagedStorageProvider;
pub use mapper::{assert_provider_supported, map_provider_to_storage_config, ProviderRecord};
pub use memory::InMemoryStorageProvider;
#[cfg(feature = "storage-s3")]
pub use s3::{S3Flavor, S3Provider};
pub use traits::{
    ListProgress, ProgressCallback, StorageError, StorageObject, StorageProvider, StorageResult,
    UploadOptions,
};
