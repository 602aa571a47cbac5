//! Storage abstraction trait
//!
//! This module defines the `StorageProvider` trait that every backend adapter
//! implements, along with the object metadata and error types it speaks.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use photon_core::{AppError, MissingValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::media;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("List failed: {0}")]
    ListFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{0}")]
    UnsupportedProvider(String),

    #[error("No storage provider registered for `{0}`")]
    ProviderNotRegistered(String),

    #[error("Invalid tenant: {0}")]
    InvalidTenant(String),
}

impl StorageError {
    /// Whether the error describes a configuration problem the tenant can fix.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StorageError::ConfigError(_)
                | StorageError::UnsupportedProvider(_)
                | StorageError::ProviderNotRegistered(_)
                | StorageError::InvalidTenant(_)
        )
    }
}

impl From<MissingValue> for StorageError {
    fn from(err: MissingValue) -> Self {
        StorageError::ConfigError(err.0)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("File not found: {}", key)),
            StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
            other if other.is_configuration() => AppError::StorageConfiguration(other.to_string()),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Metadata for one stored object. Keys are relative to the provider's scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageObject {
    pub key: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl StorageObject {
    pub fn with_key(&self, key: impl Into<String>) -> Self {
        StorageObject {
            key: key.into(),
            ..self.clone()
        }
    }
}

/// Progress snapshot reported by `list_all_files` after each page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProgress {
    pub current_path: String,
    pub files_scanned: usize,
    pub total_files: Option<usize>,
}

/// Invoked synchronously inside the listing loop; must not block.
pub type ProgressCallback = dyn Fn(ListProgress) + Send + Sync;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    pub content_type: Option<String>,
}

impl UploadOptions {
    pub fn with_content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
        }
    }
}

/// Storage abstraction trait
///
/// All backends (S3-family, GitHub, B2, managed, local, in-memory) implement
/// this trait and are interchangeable at every call site.
///
/// "Not found" is a valid result only for `get_file`; `delete_file` and
/// `delete_folder` succeed on missing targets; `move_file` fails with
/// `StorageError::NotFound` when the source is missing.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Fetch raw content, or `None` when the key does not exist.
    async fn get_file(&self, key: &str) -> StorageResult<Option<Bytes>>;

    /// List image objects only. Ordering is backend-defined.
    async fn list_images(&self) -> StorageResult<Vec<StorageObject>>;

    /// Enumerate every object under the provider's scope, paginating internally.
    async fn list_all_files(
        &self,
        progress: Option<&ProgressCallback>,
    ) -> StorageResult<Vec<StorageObject>>;

    /// URL usable to fetch the object without going through this service.
    async fn generate_public_url(&self, key: &str) -> StorageResult<String>;

    /// Pair stills with their motion sidecars. Pure function of the listing.
    fn detect_live_photos(&self, objects: &[StorageObject]) -> HashMap<String, StorageObject> {
        media::detect_live_photos(objects)
    }

    /// Delete one object. Deleting a missing key succeeds.
    async fn delete_file(&self, key: &str) -> StorageResult<()>;

    /// Delete every object under `prefix`. An empty prefix clears the whole
    /// provider scope.
    async fn delete_folder(&self, prefix: &str) -> StorageResult<()>;

    /// Write content, overwriting any existing object at `key`.
    async fn upload_file(
        &self,
        key: &str,
        data: Bytes,
        options: UploadOptions,
    ) -> StorageResult<StorageObject>;

    /// Logical rename. Atomic where the backend supports it, otherwise
    /// copy-then-delete.
    async fn move_file(
        &self,
        source_key: &str,
        target_key: &str,
        options: UploadOptions,
    ) -> StorageResult<StorageObject>;

    /// Provider tag (e.g. "s3", "github", "managed")
    fn provider_name(&self) -> &'static str;
}
