use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::LocalConfig;
use crate::keys;
use crate::media::ImageFilter;
use crate::traits::{
    ListProgress, ProgressCallback, StorageError, StorageObject, StorageProvider, StorageResult,
    UploadOptions,
};

/// Local filesystem storage provider
#[derive(Debug)]
pub struct LocalProvider {
    base_path: PathBuf,
    base_url: String,
    filter: ImageFilter,
}

impl LocalProvider {
    /// Create a provider rooted at `base_path`, creating the directory if needed.
    pub fn new(config: LocalConfig) -> StorageResult<Self> {
        let base_path = PathBuf::from(&config.base_path);

        std::fs::create_dir_all(&base_path).map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalProvider {
            base_path,
            base_url: config.base_url.unwrap_or_else(|| "/media".to_string()),
            filter: ImageFilter::new(config.exclude_regex.as_deref(), config.max_file_limit),
        })
    }

    /// Convert a storage key to a filesystem path under the base directory.
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        let key = keys::validate_key(key)?;
        if key.is_empty() {
            return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
        }

        let path = self.base_path.join(&key);
        if let (Ok(base), Ok(canonical)) = (self.base_path.canonicalize(), path.canonicalize()) {
            if canonical.strip_prefix(&base).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }
        Ok(path)
    }

    fn path_to_key(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        Some(key)
    }

    fn generate_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn metadata_for(&self, key: &str, path: &Path) -> StorageResult<StorageObject> {
        let meta = fs::metadata(path).await?;
        Ok(StorageObject {
            key: key.to_string(),
            size: meta.len(),
            last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
            etag: None,
        })
    }

    /// Walk `root` depth-first, collecting regular files.
    async fn walk(
        &self,
        root: PathBuf,
        progress: Option<&ProgressCallback>,
    ) -> StorageResult<Vec<StorageObject>> {
        let mut objects = Vec::new();
        let mut pending = vec![root];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::ListFailed(format!("{}: {}", dir.display(), e))),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::ListFailed(e.to_string()))?
            {
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StorageError::ListFailed(e.to_string()))?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    if let Some(key) = self.path_to_key(&path) {
                        objects.push(self.metadata_for(&key, &path).await?);
                    }
                }
            }

            if let Some(progress) = progress {
                progress(ListProgress {
                    current_path: self.path_to_key(&dir).unwrap_or_default(),
                    files_scanned: objects.len(),
                    total_files: None,
                });
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn write(&self, key: &str, path: &Path, data: &[u8]) -> StorageResult<()> {
        self.ensure_parent_dir(path).await?;

        let mut file = fs::File::create(path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;
        file.write_all(data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;
        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        tracing::debug!(key = %key, path = %path.display(), "Local file written");
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for LocalProvider {
    async fn get_file(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::DownloadFailed(format!(
                    "Failed to read file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage download successful"
        );
        Ok(Some(Bytes::from(data)))
    }

    async fn list_images(&self) -> StorageResult<Vec<StorageObject>> {
        let objects = self.walk(self.base_path.clone(), None).await?;
        Ok(self.filter.apply(objects))
    }

    async fn list_all_files(
        &self,
        progress: Option<&ProgressCallback>,
    ) -> StorageResult<Vec<StorageObject>> {
        self.walk(self.base_path.clone(), progress).await
    }

    async fn generate_public_url(&self, key: &str) -> StorageResult<String> {
        let key = keys::validate_key(key)?;
        Ok(self.generate_url(&key))
    }

    async fn delete_file(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(StorageError::DeleteFailed(format!(
                    "Failed to delete file {}: {}",
                    path.display(),
                    e
                )))
            }
        }

        tracing::info!(
            path = %path.display(),
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );
        Ok(())
    }

    async fn delete_folder(&self, prefix: &str) -> StorageResult<()> {
        let prefix = keys::validate_key(prefix)?;
        let start = std::time::Instant::now();

        if prefix.is_empty() {
            // Clear the contents but keep the root directory itself.
            let mut entries = fs::read_dir(&self.base_path).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    fs::remove_dir_all(&path).await?;
                } else {
                    fs::remove_file(&path).await?;
                }
            }
        } else {
            let path = self.key_to_path(&prefix)?;
            match fs::remove_dir_all(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(StorageError::DeleteFailed(format!(
                        "Failed to delete directory {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }

        tracing::info!(
            prefix = %prefix,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage folder delete successful"
        );
        Ok(())
    }

    async fn upload_file(
        &self,
        key: &str,
        data: Bytes,
        _options: UploadOptions,
    ) -> StorageResult<StorageObject> {
        let path = self.key_to_path(key)?;
        let key = keys::normalize_key(key);
        let start = std::time::Instant::now();

        self.write(&key, &path, &data).await?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );
        self.metadata_for(&key, &path).await
    }

    async fn move_file(
        &self,
        source_key: &str,
        target_key: &str,
        _options: UploadOptions,
    ) -> StorageResult<StorageObject> {
        let from_path = self.key_to_path(source_key)?;
        let to_path = self.key_to_path(target_key)?;
        let target_key = keys::normalize_key(target_key);

        if !fs::try_exists(&from_path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(source_key.to_string()));
        }

        self.ensure_parent_dir(&to_path).await?;
        fs::rename(&from_path, &to_path).await.map_err(|e| {
            StorageError::BackendError(format!(
                "Failed to move {} to {}: {}",
                from_path.display(),
                to_path.display(),
                e
            ))
        })?;

        tracing::info!(
            from_key = %source_key,
            to_key = %target_key,
            from_path = %from_path.display(),
            to_path = %to_path.display(),
            "Local storage move successful"
        );
        self.metadata_for(&target_key, &to_path).await
    }

    fn provider_name(&self) -> &'static str {
        "local"
    }
}
