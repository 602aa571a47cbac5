//! Backblaze B2 backend over the native v2 API.
//!
//! Account authorization and upload URLs are cached and refreshed on expiry
//! or when B2 answers 401. The configured `prefix` is the provider's scope.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use sha1::{Digest, Sha1};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::{B2Config, SecretString};
use crate::keys::{self, join_segments};
use crate::media::ImageFilter;
use crate::traits::{
    ListProgress, ProgressCallback, StorageError, StorageObject, StorageProvider, StorageResult,
    UploadOptions,
};

const DEFAULT_API_BASE: &str = "https://api.backblazeb2.com";
const DEFAULT_AUTHORIZATION_TTL_MS: u64 = 23 * 60 * 60 * 1000;
const DEFAULT_UPLOAD_URL_TTL_MS: u64 = 60 * 60 * 1000;
const LIST_PAGE_SIZE: u32 = 1000;

const FILE_NAME: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Authorization {
    authorization_token: String,
    api_url: String,
    download_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadUrl {
    upload_url: String,
    authorization_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileInfo {
    file_id: String,
    file_name: String,
    #[serde(default)]
    content_length: u64,
    #[serde(default)]
    upload_timestamp: Option<i64>,
    #[serde(default)]
    action: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListFilesResponse {
    files: Vec<FileInfo>,
    #[serde(default)]
    next_file_name: Option<String>,
    #[serde(default)]
    next_file_id: Option<String>,
}

struct Cached<T> {
    value: T,
    expires_at: Instant,
}

impl<T: Clone> Cached<T> {
    fn fresh(slot: &Option<Cached<T>>) -> Option<T> {
        slot.as_ref()
            .filter(|cached| cached.expires_at > Instant::now())
            .map(|cached| cached.value.clone())
    }
}

/// B2 storage provider
pub struct B2Provider {
    client: Client,
    api_base: String,
    application_key_id: String,
    application_key: SecretString,
    bucket_id: String,
    bucket_name: String,
    prefix: Option<String>,
    custom_domain: Option<String>,
    filter: ImageFilter,
    authorization_ttl: Duration,
    upload_url_ttl: Duration,
    authorization: Mutex<Option<Cached<Authorization>>>,
    upload_url: Mutex<Option<Cached<UploadUrl>>>,
}

impl B2Provider {
    pub fn new(config: B2Config) -> StorageResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| {
                StorageError::ConfigError(format!("Failed to create HTTP client for B2: {}", e))
            })?;

        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            application_key_id: config.application_key_id,
            application_key: config.application_key,
            bucket_id: config.bucket_id,
            bucket_name: config.bucket_name,
            prefix: keys::normalize_path(config.prefix.as_deref()),
            custom_domain: config.custom_domain,
            filter: ImageFilter::new(config.exclude_regex.as_deref(), config.max_file_limit),
            authorization_ttl: Duration::from_millis(
                config
                    .authorization_ttl_ms
                    .unwrap_or(DEFAULT_AUTHORIZATION_TTL_MS),
            ),
            upload_url_ttl: Duration::from_millis(
                config.upload_url_ttl_ms.unwrap_or(DEFAULT_UPLOAD_URL_TTL_MS),
            ),
            authorization: Mutex::new(None),
            upload_url: Mutex::new(None),
        })
    }

    /// Point account authorization at another host (test servers).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn file_name(&self, key: &str) -> StorageResult<String> {
        let key = keys::validate_key(key)?;
        Ok(join_segments([self.prefix.as_deref().unwrap_or_default(), key.as_str()]))
    }

    fn relative_key(&self, file_name: &str) -> String {
        keys::strip_prefix(self.prefix.as_deref().unwrap_or_default(), file_name)
    }

    fn to_object(&self, file: FileInfo) -> StorageObject {
        StorageObject {
            key: self.relative_key(&file.file_name),
            size: file.content_length,
            last_modified: file.upload_timestamp.and_then(DateTime::<Utc>::from_timestamp_millis),
            etag: Some(file.file_id),
        }
    }

    async fn error_from(response: Response, operation: &str) -> StorageError {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        StorageError::BackendError(format!("B2 {} failed: {} - {}", operation, status, body))
    }

    async fn authorize(&self) -> StorageResult<Authorization> {
        let mut slot = self.authorization.lock().await;
        if let Some(authorization) = Cached::fresh(&*slot) {
            return Ok(authorization);
        }

        let response = self
            .client
            .get(format!("{}/b2api/v2/b2_authorize_account", self.api_base))
            .basic_auth(&self.application_key_id, Some(self.application_key.expose()))
            .send()
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        if !response.status().is_success() {
            let err = Self::error_from(response, "authorize").await;
            tracing::error!(error = %err, bucket = %self.bucket_name, "B2 authorization failed");
            return Err(err);
        }

        let authorization = response
            .json::<Authorization>()
            .await
            .map_err(|e| StorageError::BackendError(format!("Invalid B2 response: {}", e)))?;

        tracing::debug!(bucket = %self.bucket_name, "B2 account authorized");
        *slot = Some(Cached {
            value: authorization.clone(),
            expires_at: Instant::now() + self.authorization_ttl,
        });
        Ok(authorization)
    }

    async fn reset_authorization(&self) {
        *self.authorization.lock().await = None;
        *self.upload_url.lock().await = None;
    }

    /// POST a JSON body to a `b2api/v2` operation, re-authorizing once on 401.
    async fn api_call<T: DeserializeOwned>(&self, operation: &str, body: &Value) -> StorageResult<T> {
        let mut retried = false;
        loop {
            let authorization = self.authorize().await?;
            let response = self
                .client
                .post(format!("{}/b2api/v2/{}", authorization.api_url, operation))
                .header("Authorization", &authorization.authorization_token)
                .json(body)
                .send()
                .await
                .map_err(|e| StorageError::BackendError(e.to_string()))?;

            if response.status() == StatusCode::UNAUTHORIZED && !retried {
                retried = true;
                self.reset_authorization().await;
                continue;
            }
            if !response.status().is_success() {
                return Err(Self::error_from(response, operation).await);
            }

            return response
                .json::<T>()
                .await
                .map_err(|e| StorageError::BackendError(format!("Invalid B2 response: {}", e)));
        }
    }

    async fn get_upload_url(&self) -> StorageResult<UploadUrl> {
        if let Some(upload_url) = Cached::fresh(&*self.upload_url.lock().await) {
            return Ok(upload_url);
        }

        let upload_url: UploadUrl = self
            .api_call("b2_get_upload_url", &json!({ "bucketId": self.bucket_id }))
            .await?;
        *self.upload_url.lock().await = Some(Cached {
            value: upload_url.clone(),
            expires_at: Instant::now() + self.upload_url_ttl,
        });
        Ok(upload_url)
    }

    async fn list_file_names(
        &self,
        prefix: &str,
        progress: Option<&ProgressCallback>,
    ) -> StorageResult<Vec<FileInfo>> {
        let mut files = Vec::new();
        let mut start_file_name: Option<String> = None;

        loop {
            let mut body = json!({
                "bucketId": self.bucket_id,
                "maxFileCount": LIST_PAGE_SIZE,
            });
            if !prefix.is_empty() {
                body["prefix"] = json!(prefix);
            }
            if let Some(ref start) = start_file_name {
                body["startFileName"] = json!(start);
            }

            let page: ListFilesResponse = self
                .api_call("b2_list_file_names", &body)
                .await
                .map_err(|e| StorageError::ListFailed(e.to_string()))?;
            files.extend(
                page.files
                    .into_iter()
                    .filter(|file| file.action.as_deref().unwrap_or("upload") == "upload"),
            );

            if let Some(progress) = progress {
                progress(ListProgress {
                    current_path: prefix.to_string(),
                    files_scanned: files.len(),
                    total_files: page.next_file_name.is_none().then_some(files.len()),
                });
            }

            match page.next_file_name {
                Some(next) => start_file_name = Some(next),
                None => break,
            }
        }

        Ok(files)
    }

    /// Scope prefix for listings, with a trailing slash so siblings sharing
    /// a name prefix are excluded.
    fn list_prefix(&self, prefix: &str) -> String {
        let scoped = join_segments([self.prefix.as_deref().unwrap_or_default(), prefix]);
        if scoped.is_empty() {
            scoped
        } else {
            format!("{}/", scoped)
        }
    }

    async fn list_scoped(
        &self,
        progress: Option<&ProgressCallback>,
    ) -> StorageResult<Vec<StorageObject>> {
        let start = std::time::Instant::now();
        let files = self.list_file_names(&self.list_prefix(""), progress).await?;
        let objects: Vec<StorageObject> = files.into_iter().map(|file| self.to_object(file)).collect();

        tracing::debug!(
            bucket = %self.bucket_name,
            count = objects.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "B2 list successful"
        );
        Ok(objects)
    }

    /// Newest version of an exact file name, if present.
    async fn find_file(&self, file_name: &str) -> StorageResult<Option<FileInfo>> {
        let page: ListFilesResponse = self
            .api_call(
                "b2_list_file_names",
                &json!({
                    "bucketId": self.bucket_id,
                    "startFileName": file_name,
                    "maxFileCount": 1,
                }),
            )
            .await?;
        Ok(page
            .files
            .into_iter()
            .find(|file| file.file_name == file_name))
    }

    /// Every version of an exact file name, oldest pages first.
    async fn list_versions(&self, file_name: &str) -> StorageResult<Vec<FileInfo>> {
        let mut versions = Vec::new();
        let mut start_file_id: Option<String> = None;

        loop {
            let mut body = json!({
                "bucketId": self.bucket_id,
                "startFileName": file_name,
                "prefix": file_name,
                "maxFileCount": LIST_PAGE_SIZE,
            });
            if let Some(ref file_id) = start_file_id {
                body["startFileId"] = json!(file_id);
            }

            let page: ListFilesResponse = self.api_call("b2_list_file_versions", &body).await?;
            versions.extend(page.files.into_iter().filter(|file| file.file_name == file_name));

            // Versions of one name are contiguous; stop once the cursor moves past it.
            match (page.next_file_name, page.next_file_id) {
                (Some(next_name), Some(next_id)) if next_name == file_name => {
                    start_file_id = Some(next_id)
                }
                _ => break,
            }
        }

        Ok(versions)
    }

    async fn delete_versions(&self, file_name: &str) -> StorageResult<usize> {
        let versions = self.list_versions(file_name).await?;
        let deleted = versions.len();

        for version in versions {
            let _: Value = self
                .api_call(
                    "b2_delete_file_version",
                    &json!({ "fileName": version.file_name, "fileId": version.file_id }),
                )
                .await?;
        }
        Ok(deleted)
    }

    fn encode_file_name(file_name: &str) -> String {
        utf8_percent_encode(file_name, FILE_NAME).to_string()
    }
}

#[async_trait]
impl StorageProvider for B2Provider {
    async fn get_file(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let start = std::time::Instant::now();
        let file_name = self.file_name(key)?;

        let mut retried = false;
        let response = loop {
            let authorization = self.authorize().await?;
            let response = self
                .client
                .get(format!(
                    "{}/file/{}/{}",
                    authorization.download_url,
                    self.bucket_name,
                    Self::encode_file_name(&file_name)
                ))
                .header("Authorization", &authorization.authorization_token)
                .send()
                .await
                .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

            if response.status() == StatusCode::UNAUTHORIZED && !retried {
                retried = true;
                self.reset_authorization().await;
                continue;
            }
            break response;
        };

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let err = Self::error_from(response, "download").await;
            tracing::error!(
                error = %err,
                bucket = %self.bucket_name,
                key = %file_name,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "B2 download failed"
            );
            return Err(StorageError::DownloadFailed(err.to_string()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        tracing::info!(
            bucket = %self.bucket_name,
            key = %file_name,
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "B2 download successful"
        );
        Ok(Some(bytes))
    }

    async fn list_images(&self) -> StorageResult<Vec<StorageObject>> {
        let objects = self.list_scoped(None).await?;
        Ok(self.filter.apply(objects))
    }

    async fn list_all_files(
        &self,
        progress: Option<&ProgressCallback>,
    ) -> StorageResult<Vec<StorageObject>> {
        self.list_scoped(progress).await
    }

    async fn generate_public_url(&self, key: &str) -> StorageResult<String> {
        let file_name = Self::encode_file_name(&self.file_name(key)?);
        if let Some(ref domain) = self.custom_domain {
            return Ok(format!("{}/{}", domain.trim_end_matches('/'), file_name));
        }

        let authorization = self.authorize().await?;
        Ok(format!(
            "{}/file/{}/{}",
            authorization.download_url.trim_end_matches('/'),
            self.bucket_name,
            file_name
        ))
    }

    async fn delete_file(&self, key: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let file_name = self.file_name(key)?;

        let deleted = self.delete_versions(&file_name).await.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket_name,
                key = %file_name,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "B2 delete failed"
            );
            StorageError::DeleteFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket_name,
            key = %file_name,
            versions = deleted,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "B2 delete successful"
        );
        Ok(())
    }

    async fn delete_folder(&self, prefix: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let prefix = keys::validate_key(prefix)?;
        let files = self.list_file_names(&self.list_prefix(&prefix), None).await?;
        let count = files.len();

        for file in files {
            self.delete_versions(&file.file_name)
                .await
                .map_err(|e| StorageError::DeleteFailed(format!("{}: {}", file.file_name, e)))?;
        }

        tracing::info!(
            bucket = %self.bucket_name,
            prefix = %prefix,
            deleted = count,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "B2 folder delete successful"
        );
        Ok(())
    }

    async fn upload_file(
        &self,
        key: &str,
        data: Bytes,
        options: UploadOptions,
    ) -> StorageResult<StorageObject> {
        let start = std::time::Instant::now();
        let file_name = self.file_name(key)?;
        if keys::normalize_key(key).is_empty() {
            return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
        }
        let sha1 = hex::encode(Sha1::digest(&data));
        let content_type = options
            .content_type
            .unwrap_or_else(|| "b2/x-auto".to_string());

        let mut retried = false;
        let file = loop {
            let upload_url = self.get_upload_url().await?;
            let response = self
                .client
                .post(&upload_url.upload_url)
                .header("Authorization", &upload_url.authorization_token)
                .header("X-Bz-File-Name", Self::encode_file_name(&file_name))
                .header("Content-Type", &content_type)
                .header("X-Bz-Content-Sha1", &sha1)
                .body(data.clone())
                .send()
                .await
                .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

            // Upload URLs can expire or be busy; fetch a new one and try once more.
            let status = response.status();
            if !retried
                && (status == StatusCode::UNAUTHORIZED || status == StatusCode::SERVICE_UNAVAILABLE)
            {
                retried = true;
                *self.upload_url.lock().await = None;
                continue;
            }
            if !status.is_success() {
                let err = Self::error_from(response, "upload").await;
                tracing::error!(
                    error = %err,
                    bucket = %self.bucket_name,
                    key = %file_name,
                    size_bytes = data.len(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "B2 upload failed"
                );
                return Err(StorageError::UploadFailed(err.to_string()));
            }

            break response
                .json::<FileInfo>()
                .await
                .map_err(|e| StorageError::UploadFailed(format!("Invalid B2 response: {}", e)))?;
        };

        tracing::info!(
            bucket = %self.bucket_name,
            key = %file.file_name,
            size_bytes = file.content_length,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "B2 upload successful"
        );
        Ok(self.to_object(file))
    }

    async fn move_file(
        &self,
        source_key: &str,
        target_key: &str,
        _options: UploadOptions,
    ) -> StorageResult<StorageObject> {
        let start = std::time::Instant::now();
        let source_name = self.file_name(source_key)?;
        let target_name = self.file_name(target_key)?;

        let source = self
            .find_file(&source_name)
            .await?
            .ok_or_else(|| StorageError::NotFound(source_key.to_string()))?;

        let copied: FileInfo = self
            .api_call(
                "b2_copy_file",
                &json!({ "sourceFileId": source.file_id, "fileName": target_name }),
            )
            .await?;
        self.delete_versions(&source_name).await?;

        tracing::info!(
            from_key = %source_name,
            to_key = %target_name,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "B2 move successful"
        );
        Ok(self.to_object(copied))
    }

    fn provider_name(&self) -> &'static str {
        "b2"
    }
}
