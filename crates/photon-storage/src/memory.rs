//! In-memory provider for local debugging and tests.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::keys;
use crate::media::ImageFilter;
use crate::traits::{
    ListProgress, ProgressCallback, StorageError, StorageObject, StorageProvider, StorageResult,
    UploadOptions,
};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
    last_modified: DateTime<Utc>,
    etag: String,
}

impl StoredObject {
    fn metadata(&self, key: &str) -> StorageObject {
        StorageObject {
            key: key.to_string(),
            size: self.data.len() as u64,
            last_modified: Some(self.last_modified),
            etag: Some(self.etag.clone()),
        }
    }
}

/// Objects live in a sorted map so listings come back in key order.
#[derive(Debug, Default)]
pub struct InMemoryStorageProvider {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    base_url: Option<String>,
}

impl InMemoryStorageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            base_url: Some(base_url.into()),
        }
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Every stored key, sorted.
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    /// Content type recorded at upload time.
    pub async fn content_type(&self, key: &str) -> Option<String> {
        let key = keys::normalize_key(key);
        self.objects
            .read()
            .await
            .get(&key)
            .and_then(|object| object.content_type.clone())
    }

    fn is_under(prefix: &str, key: &str) -> bool {
        prefix.is_empty() || key == prefix || key.starts_with(&format!("{}/", prefix))
    }
}

#[async_trait]
impl StorageProvider for InMemoryStorageProvider {
    async fn get_file(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let key = keys::validate_key(key)?;
        Ok(self
            .objects
            .read()
            .await
            .get(&key)
            .map(|object| object.data.clone()))
    }

    async fn list_images(&self) -> StorageResult<Vec<StorageObject>> {
        let objects = self.list_all_files(None).await?;
        Ok(ImageFilter::default().apply(objects))
    }

    async fn list_all_files(
        &self,
        progress: Option<&ProgressCallback>,
    ) -> StorageResult<Vec<StorageObject>> {
        let objects: Vec<StorageObject> = self
            .objects
            .read()
            .await
            .iter()
            .map(|(key, object)| object.metadata(key))
            .collect();

        if let Some(progress) = progress {
            progress(ListProgress {
                current_path: String::new(),
                files_scanned: objects.len(),
                total_files: Some(objects.len()),
            });
        }
        Ok(objects)
    }

    async fn generate_public_url(&self, key: &str) -> StorageResult<String> {
        let key = keys::validate_key(key)?;
        Ok(match &self.base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => format!("memory://{}", key),
        })
    }

    async fn delete_file(&self, key: &str) -> StorageResult<()> {
        let key = keys::validate_key(key)?;
        self.objects.write().await.remove(&key);
        Ok(())
    }

    async fn delete_folder(&self, prefix: &str) -> StorageResult<()> {
        let prefix = keys::validate_key(prefix)?;
        let mut objects = self.objects.write().await;
        let before = objects.len();
        objects.retain(|key, _| !Self::is_under(&prefix, key));
        tracing::debug!(
            prefix = %prefix,
            deleted = before - objects.len(),
            "In-memory folder delete"
        );
        Ok(())
    }

    async fn upload_file(
        &self,
        key: &str,
        data: Bytes,
        options: UploadOptions,
    ) -> StorageResult<StorageObject> {
        let key = keys::validate_key(key)?;
        if key.is_empty() {
            return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
        }

        let stored = StoredObject {
            data,
            content_type: options.content_type,
            last_modified: Utc::now(),
            etag: Uuid::new_v4().simple().to_string(),
        };
        let metadata = stored.metadata(&key);
        self.objects.write().await.insert(key, stored);
        Ok(metadata)
    }

    async fn move_file(
        &self,
        source_key: &str,
        target_key: &str,
        options: UploadOptions,
    ) -> StorageResult<StorageObject> {
        let source = keys::validate_key(source_key)?;
        let target = keys::validate_key(target_key)?;
        if target.is_empty() {
            return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
        }

        let mut objects = self.objects.write().await;
        let mut stored = objects
            .remove(&source)
            .ok_or_else(|| StorageError::NotFound(source.clone()))?;
        if options.content_type.is_some() {
            stored.content_type = options.content_type;
        }
        stored.last_modified = Utc::now();
        let metadata = stored.metadata(&target);
        objects.insert(target, stored);
        Ok(metadata)
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_get_and_list() {
        let provider = InMemoryStorageProvider::new();
        provider
            .upload_file("/a/b.jpg", Bytes::from_static(b"1"), UploadOptions::default())
            .await
            .unwrap();
        provider
            .upload_file("notes.txt", Bytes::from_static(b"22"), UploadOptions::default())
            .await
            .unwrap();

        assert_eq!(
            provider.get_file("a/b.jpg").await.unwrap(),
            Some(Bytes::from_static(b"1"))
        );
        assert_eq!(provider.get_file("missing.jpg").await.unwrap(), None);

        let all = provider.list_all_files(None).await.unwrap();
        assert_eq!(all.len(), 2);
        let images = provider.list_images().await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].key, "a/b.jpg");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let provider = InMemoryStorageProvider::new();
        provider
            .upload_file("a.jpg", Bytes::from_static(b"1"), UploadOptions::default())
            .await
            .unwrap();
        provider.delete_file("a.jpg").await.unwrap();
        provider.delete_file("a.jpg").await.unwrap();
        assert!(provider.is_empty().await);
    }

    #[tokio::test]
    async fn delete_folder_matches_whole_segments() {
        let provider = InMemoryStorageProvider::new();
        for key in ["acme/a.jpg", "acme/b/c.jpg", "acme2/a.jpg"] {
            provider
                .upload_file(key, Bytes::from_static(b"1"), UploadOptions::default())
                .await
                .unwrap();
        }
        provider.delete_folder("acme").await.unwrap();
        assert_eq!(provider.keys().await, vec!["acme2/a.jpg".to_string()]);

        provider.delete_folder("").await.unwrap();
        assert!(provider.is_empty().await);
    }

    #[tokio::test]
    async fn move_requires_existing_source() {
        let provider = InMemoryStorageProvider::new();
        let err = provider
            .move_file("a.jpg", "b.jpg", UploadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));

        provider
            .upload_file("a.jpg", Bytes::from_static(b"1"), UploadOptions::default())
            .await
            .unwrap();
        let moved = provider
            .move_file("a.jpg", "b.jpg", UploadOptions::with_content_type("image/jpeg"))
            .await
            .unwrap();
        assert_eq!(moved.key, "b.jpg");
        assert_eq!(provider.get_file("a.jpg").await.unwrap(), None);
        assert_eq!(
            provider.content_type("b.jpg").await.as_deref(),
            Some("image/jpeg")
        );
    }

    #[tokio::test]
    async fn progress_is_reported() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let provider = InMemoryStorageProvider::new();
        provider
            .upload_file("a.jpg", Bytes::from_static(b"1"), UploadOptions::default())
            .await
            .unwrap();

        let scanned = Arc::new(AtomicUsize::new(0));
        let seen = scanned.clone();
        let callback = move |progress: ListProgress| {
            seen.store(progress.files_scanned, Ordering::SeqCst);
        };
        provider.list_all_files(Some(&callback)).await.unwrap();
        assert_eq!(scanned.load(Ordering::SeqCst), 1);
    }
}
