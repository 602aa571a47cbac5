//! S3-compatible backends (AWS S3, Aliyun OSS, Tencent COS) over `object_store`.
//!
//! Keys are passed to the bucket as-is. The configured `prefix` bounds
//! listings and the default scope of `delete_folder`, but reads and writes
//! are not confined by it.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, Attributes, BackoffConfig, ClientOptions, ObjectMeta, ObjectStore, ObjectStoreExt,
    PutOptions, PutPayload, Result as ObjectResult, RetryConfig,
};
use std::time::Duration;

use crate::config::{RetryMode, S3CompatibleConfig};
use crate::keys;
use crate::media::ImageFilter;
use crate::traits::{
    ListProgress, ProgressCallback, StorageError, StorageObject, StorageProvider, StorageResult,
    UploadOptions,
};

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_DELETE_CONCURRENCY: usize = 8;
/// Listing progress is reported every this many objects.
const PROGRESS_BATCH: usize = 1000;

/// Which S3 dialect a config speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S3Flavor {
    S3,
    Oss,
    Cos,
}

impl S3Flavor {
    fn tag(self) -> &'static str {
        match self {
            S3Flavor::S3 => "s3",
            S3Flavor::Oss => "oss",
            S3Flavor::Cos => "cos",
        }
    }

    /// Default endpoint when the config names none. AWS resolves its own.
    fn default_endpoint(self, region: &str) -> Option<String> {
        match self {
            S3Flavor::S3 => None,
            S3Flavor::Oss => Some(format!("https://oss-{}.aliyuncs.com", region)),
            S3Flavor::Cos => Some(format!("https://cos.{}.myqcloud.com", region)),
        }
    }
}

/// S3-compatible storage provider
pub struct S3Provider {
    store: AmazonS3,
    flavor: S3Flavor,
    bucket: String,
    region: String,
    endpoint: Option<String>,
    prefix: Option<String>,
    custom_domain: Option<String>,
    filter: ImageFilter,
    delete_concurrency: usize,
}

impl S3Provider {
    pub fn new(flavor: S3Flavor, config: S3CompatibleConfig) -> StorageResult<Self> {
        let region = config
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let endpoint = config
            .endpoint
            .clone()
            .or_else(|| flavor.default_endpoint(&region));

        if config.sig_v4_service.is_some() {
            tracing::debug!(
                provider = flavor.tag(),
                bucket = %config.bucket,
                "Ignoring sigV4Service override; requests are signed for s3"
            );
        }

        let mut builder = AmazonS3Builder::new()
            .with_region(region.clone())
            .with_bucket_name(config.bucket.clone())
            .with_client_options(client_options(&config))
            .with_retry(retry_config(&config));

        if let Some(ref endpoint) = endpoint {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http)
                .with_virtual_hosted_style_request(flavor != S3Flavor::S3);
        }
        if let Some(ref access_key_id) = config.access_key_id {
            builder = builder.with_access_key_id(access_key_id.clone());
        }
        if let Some(ref secret) = config.secret_access_key {
            builder = builder.with_secret_access_key(secret.expose());
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Provider {
            store,
            flavor,
            bucket: config.bucket,
            region,
            endpoint,
            prefix: keys::normalize_path(config.prefix.as_deref()),
            custom_domain: config.custom_domain,
            filter: ImageFilter::new(config.exclude_regex.as_deref(), config.max_file_limit),
            delete_concurrency: config
                .download_concurrency
                .map(|n| n.max(1) as usize)
                .unwrap_or(DEFAULT_DELETE_CONCURRENCY),
        })
    }

    /// Public URL for an object
    ///
    /// A custom domain wins. S3 with a custom endpoint uses path-style
    /// `{endpoint}/{bucket}/{key}`, OSS and COS use virtual-hosted
    /// `{bucket}.{endpoint host}`, and plain AWS uses the regional bucket host.
    fn generate_url(&self, key: &str) -> String {
        if let Some(ref domain) = self.custom_domain {
            return format!("{}/{}", domain.trim_end_matches('/'), key);
        }

        match (self.flavor, &self.endpoint) {
            (S3Flavor::S3, Some(endpoint)) => {
                format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key)
            }
            (_, Some(endpoint)) => {
                let endpoint = endpoint.trim_end_matches('/');
                let (scheme, host) = endpoint
                    .split_once("://")
                    .unwrap_or(("https", endpoint));
                format!("{}://{}.{}/{}", scheme, self.bucket, host, key)
            }
            (_, None) => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            ),
        }
    }

    fn location(key: &str) -> StorageResult<Path> {
        let key = keys::validate_key(key)?;
        if key.is_empty() {
            return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
        }
        // `Path::from` would percent-encode each segment and store a different name.
        Path::parse(&key).map_err(|e| StorageError::InvalidKey(e.to_string()))
    }

    fn to_object(meta: ObjectMeta) -> StorageObject {
        StorageObject {
            key: meta.location.to_string(),
            size: meta.size,
            last_modified: Some(meta.last_modified),
            etag: meta.e_tag,
        }
    }

    async fn list_under(
        &self,
        prefix: Option<&str>,
        progress: Option<&ProgressCallback>,
    ) -> StorageResult<Vec<StorageObject>> {
        let metas = self.list_meta(prefix, progress).await?;
        Ok(metas.into_iter().map(Self::to_object).collect())
    }

    async fn list_meta(
        &self,
        prefix: Option<&str>,
        progress: Option<&ProgressCallback>,
    ) -> StorageResult<Vec<ObjectMeta>> {
        let start = std::time::Instant::now();
        let prefix_path = prefix
            .map(Path::parse)
            .transpose()
            .map_err(|e| StorageError::InvalidKey(e.to_string()))?;
        let current_path = prefix.unwrap_or_default().to_string();

        let mut stream = self.store.list(prefix_path.as_ref());
        let mut objects = Vec::new();
        while let Some(meta) = stream.next().await {
            let meta = meta.map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    prefix = %current_path,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 list failed"
                );
                StorageError::ListFailed(e.to_string())
            })?;
            objects.push(meta);

            if objects.len() % PROGRESS_BATCH == 0 {
                if let Some(progress) = progress {
                    progress(ListProgress {
                        current_path: current_path.clone(),
                        files_scanned: objects.len(),
                        total_files: None,
                    });
                }
            }
        }

        if let Some(progress) = progress {
            progress(ListProgress {
                current_path,
                files_scanned: objects.len(),
                total_files: Some(objects.len()),
            });
        }

        tracing::debug!(
            bucket = %self.bucket,
            count = objects.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 list successful"
        );
        Ok(objects)
    }
}

fn client_options(config: &S3CompatibleConfig) -> ClientOptions {
    let mut options = ClientOptions::new();
    if let Some(ms) = config.connection_timeout_ms {
        options = options.with_connect_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = config.request_timeout_ms.or(config.socket_timeout_ms) {
        options = options.with_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = config.idle_timeout_ms {
        options = options.with_pool_idle_timeout(Duration::from_millis(ms));
    }
    match (config.keep_alive, config.max_sockets) {
        (Some(false), _) => options = options.with_pool_max_idle_per_host(0),
        (_, Some(max)) => options = options.with_pool_max_idle_per_host(max as usize),
        _ => {}
    }
    options
}

fn retry_config(config: &S3CompatibleConfig) -> RetryConfig {
    let mut retry = RetryConfig::default();
    if let Some(attempts) = config.max_attempts {
        retry.max_retries = attempts.saturating_sub(1) as usize;
    }
    if let Some(ms) = config.total_timeout_ms {
        retry.retry_timeout = Duration::from_millis(ms);
    }
    match config.retry_mode {
        Some(RetryMode::Adaptive) => {
            let mut backoff = BackoffConfig::default();
            backoff.init_backoff = Duration::from_millis(200);
            backoff.max_backoff = Duration::from_secs(30);
            backoff.base = 3.0;
            retry.backoff = backoff;
        }
        Some(RetryMode::Legacy) => {
            let mut backoff = BackoffConfig::default();
            backoff.init_backoff = Duration::from_millis(100);
            backoff.max_backoff = Duration::from_secs(20);
            backoff.base = 2.0;
            retry.backoff = backoff;
        }
        Some(RetryMode::Standard) | None => {}
    }
    retry
}

#[async_trait]
impl StorageProvider for S3Provider {
    async fn get_file(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let start = std::time::Instant::now();
        let location = Self::location(key)?;

        let result: ObjectResult<_> = self.store.get(&location).await;
        let result = match result {
            Ok(result) => result,
            Err(ObjectStoreError::NotFound { .. }) => return Ok(None),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 download failed"
                );
                return Err(StorageError::DownloadFailed(e.to_string()));
            }
        };

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 download successful"
        );
        Ok(Some(bytes))
    }

    async fn list_images(&self) -> StorageResult<Vec<StorageObject>> {
        let objects = self.list_under(self.prefix.as_deref(), None).await?;
        Ok(self.filter.apply(objects))
    }

    async fn list_all_files(
        &self,
        progress: Option<&ProgressCallback>,
    ) -> StorageResult<Vec<StorageObject>> {
        self.list_under(self.prefix.as_deref(), progress).await
    }

    async fn generate_public_url(&self, key: &str) -> StorageResult<String> {
        let key = keys::validate_key(key)?;
        Ok(self.generate_url(&key))
    }

    async fn delete_file(&self, key: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let location = Self::location(key)?;

        let result: ObjectResult<_> = self.store.delete(&location).await;
        match result {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {}
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                return Err(StorageError::DeleteFailed(e.to_string()));
            }
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );
        Ok(())
    }

    async fn delete_folder(&self, prefix: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let prefix = keys::validate_key(prefix)?;
        let scope = if prefix.is_empty() {
            self.prefix.clone()
        } else {
            Some(prefix)
        };

        let metas = self.list_meta(scope.as_deref(), None).await?;
        let count = metas.len();

        // Delete the listed locations as-is; re-deriving them from keys would encode twice.
        futures::stream::iter(metas)
            .map(|meta| async move {
                match self.store.delete(&meta.location).await {
                    Ok(()) | Err(ObjectStoreError::NotFound { .. }) => Ok(()),
                    Err(e) => Err(StorageError::DeleteFailed(format!("{}: {}", meta.location, e))),
                }
            })
            .buffer_unordered(self.delete_concurrency)
            .try_collect::<Vec<()>>()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    prefix = scope.as_deref().unwrap_or_default(),
                    "S3 folder delete failed"
                );
                e
            })?;

        tracing::info!(
            bucket = %self.bucket,
            prefix = scope.as_deref().unwrap_or_default(),
            deleted = count,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 folder delete successful"
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
        let location = Self::location(key)?;
        let size = data.len() as u64;

        let mut attributes = Attributes::new();
        if let Some(content_type) = options.content_type {
            attributes.insert(Attribute::ContentType, content_type.into());
        }
        let put_options = PutOptions {
            attributes,
            ..Default::default()
        };

        let result: ObjectResult<_> = self
            .store
            .put_opts(&location, PutPayload::from(data), put_options)
            .await;

        let put = result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %location,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(StorageObject {
            key: location.to_string(),
            size,
            last_modified: Some(chrono::Utc::now()),
            etag: put.e_tag,
        })
    }

    async fn move_file(
        &self,
        source_key: &str,
        target_key: &str,
        _options: UploadOptions,
    ) -> StorageResult<StorageObject> {
        let start = std::time::Instant::now();
        let from = Self::location(source_key)?;
        let to = Self::location(target_key)?;

        let copy_result: ObjectResult<_> = self.store.copy(&from, &to).await;
        copy_result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(source_key.to_string()),
            other => StorageError::BackendError(other.to_string()),
        })?;

        let delete_result: ObjectResult<_> = self.store.delete(&from).await;
        if let Err(e) = delete_result {
            if !matches!(e, ObjectStoreError::NotFound { .. }) {
                return Err(StorageError::DeleteFailed(e.to_string()));
            }
        }

        let meta = self
            .store
            .head(&to)
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        tracing::info!(
            from_key = %from,
            to_key = %to,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 move successful"
        );
        Ok(Self::to_object(meta))
    }

    fn provider_name(&self) -> &'static str {
        self.flavor.tag()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn provider(flavor: S3Flavor, config: S3CompatibleConfig) -> S3Provider {
        S3Provider::new(flavor, config).unwrap()
    }

    #[test]
    fn aws_url_uses_regional_bucket_host() {
        let s3 = provider(
            S3Flavor::S3,
            S3CompatibleConfig {
                region: Some("eu-west-1".to_string()),
                ..S3CompatibleConfig::new("photos")
            },
        );
        assert_eq!(
            s3.generate_url("2024/a.jpg"),
            "https://photos.s3.eu-west-1.amazonaws.com/2024/a.jpg"
        );
    }

    #[test]
    fn custom_endpoint_uses_path_style() {
        let s3 = provider(
            S3Flavor::S3,
            S3CompatibleConfig {
                endpoint: Some("http://localhost:9000/".to_string()),
                ..S3CompatibleConfig::new("photos")
            },
        );
        assert_eq!(s3.generate_url("a.jpg"), "http://localhost:9000/photos/a.jpg");
    }

    #[test]
    fn custom_domain_wins() {
        let oss = provider(
            S3Flavor::Oss,
            S3CompatibleConfig {
                region: Some("cn-hangzhou".to_string()),
                custom_domain: Some("https://cdn.example.com/".to_string()),
                ..S3CompatibleConfig::new("photos")
            },
        );
        assert_eq!(oss.generate_url("a.jpg"), "https://cdn.example.com/a.jpg");
    }

    #[test]
    fn cos_defaults_to_virtual_hosted_endpoint() {
        let cos = provider(
            S3Flavor::Cos,
            S3CompatibleConfig {
                region: Some("ap-shanghai".to_string()),
                ..S3CompatibleConfig::new("photos-1250000000")
            },
        );
        assert_eq!(cos.provider_name(), "cos");
        assert_eq!(
            cos.generate_url("a.jpg"),
            "https://photos-1250000000.cos.ap-shanghai.myqcloud.com/a.jpg"
        );
    }

    #[test]
    fn tuning_maps_to_retry_config() {
        let config = S3CompatibleConfig {
            max_attempts: Some(4),
            total_timeout_ms: Some(60_000),
            ..S3CompatibleConfig::new("photos")
        };
        let retry = retry_config(&config);
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.retry_timeout, Duration::from_secs(60));

        let config = S3CompatibleConfig {
            max_attempts: Some(0),
            ..S3CompatibleConfig::new("photos")
        };
        assert_eq!(retry_config(&config).max_retries, 0);
    }

    #[tokio::test]
    async fn relative_keys_are_rejected_before_any_request() {
        let s3 = provider(S3Flavor::S3, S3CompatibleConfig::new("photos"));
        let err = s3.get_file("../secrets.txt").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }

    /// Path-style provider against a local test endpoint.
    fn endpoint_provider(endpoint: String) -> S3Provider {
        provider(
            S3Flavor::S3,
            S3CompatibleConfig {
                endpoint: Some(endpoint),
                access_key_id: Some("AKIDEXAMPLE".to_string()),
                secret_access_key: Some("secret".into()),
                max_attempts: Some(1),
                ..S3CompatibleConfig::new("photos")
            },
        )
    }

    #[tokio::test]
    async fn upload_keeps_unicode_keys_verbatim() {
        let mut server = mockito::Server::new_async().await;
        let put = server
            .mock("PUT", "/photos/%E7%85%A7%E7%89%87/IMG_0001.heic")
            .with_status(200)
            .with_header("ETag", "\"e1\"")
            .expect(1)
            .create_async()
            .await;

        let s3 = endpoint_provider(server.url());
        let object = s3
            .upload_file(
                "照片/IMG_0001.heic",
                Bytes::from_static(b"hello"),
                UploadOptions::with_content_type("image/heic"),
            )
            .await
            .unwrap();

        assert_eq!(object.key, "照片/IMG_0001.heic");
        assert_eq!(object.size, 5);
        assert_eq!(
            s3.generate_public_url(&object.key).await.unwrap(),
            format!("{}/photos/照片/IMG_0001.heic", server.url())
        );
        put.assert_async().await;
    }

    #[tokio::test]
    async fn folder_delete_targets_listed_unicode_keys() {
        let mut server = mockito::Server::new_async().await;
        let list = server
            .mock("GET", Matcher::Regex("^/photos/?$".to_string()))
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/xml")
            .with_body(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>photos</Name>
  <Prefix>照片/</Prefix>
  <KeyCount>2</KeyCount>
  <MaxKeys>1000</MaxKeys>
  <IsTruncated>false</IsTruncated>
  <Contents>
    <Key>照片/IMG_0001.heic</Key>
    <LastModified>2024-05-01T10:00:00.000Z</LastModified>
    <ETag>"e1"</ETag>
    <Size>5</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
  <Contents>
    <Key>照片/100% #1.jpg</Key>
    <LastModified>2024-05-01T10:00:00.000Z</LastModified>
    <ETag>"e2"</ETag>
    <Size>7</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
</ListBucketResult>"#,
            )
            .expect(1)
            .create_async()
            .await;
        // Single-object deletes go through the multi-object delete API with the raw key.
        let delete_heic = server
            .mock("POST", "/photos")
            .match_query(Matcher::Any)
            .match_body(Matcher::Regex(r"<Key>照片/IMG_0001\.heic</Key>".to_string()))
            .with_status(200)
            .with_body("<DeleteResult><Deleted><Key>ok</Key></Deleted></DeleteResult>")
            .expect(1)
            .create_async()
            .await;
        let delete_jpg = server
            .mock("POST", "/photos")
            .match_query(Matcher::Any)
            .match_body(Matcher::Regex(r"<Key>照片/100% #1\.jpg</Key>".to_string()))
            .with_status(200)
            .with_body("<DeleteResult><Deleted><Key>ok</Key></Deleted></DeleteResult>")
            .expect(1)
            .create_async()
            .await;

        let s3 = endpoint_provider(server.url());
        s3.delete_folder("照片").await.unwrap();

        list.assert_async().await;
        delete_heic.assert_async().await;
        delete_jpg.assert_async().await;
    }
}
