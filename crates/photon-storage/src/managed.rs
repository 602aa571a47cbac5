//! Tenant-scoped storage decorator
//!
//! `ManagedStorageProvider` lets many tenants share one upstream bucket, repo
//! or account. Each tenant's objects live under
//! `{upstream base}/{base prefix}/{tenant}` and callers only ever see
//! tenant-relative keys.
//!
//! S3-family upstreams list and fetch across the whole bucket regardless of
//! their configured prefix, so keys are prefixed and stripped by hand. Path-based
//! upstreams (GitHub, B2) are confined by rewriting their own prefix/path field
//! and receive keys untouched.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{ManagedStorageConfig, StorageConfig};
use crate::factory::StorageFactory;
use crate::keys::{self, join_segments};
use crate::traits::{
    ProgressCallback, StorageError, StorageObject, StorageProvider, StorageResult, UploadOptions,
};

pub struct ManagedStorageProvider {
    upstream: Arc<dyn StorageProvider>,
    tenant_id: String,
    provider_key: String,
    effective_prefix: String,
    needs_manual_prefix: bool,
}

impl ManagedStorageProvider {
    /// Build the tenant view and its upstream. Fails immediately when the
    /// tenant id does not normalize to a usable path segment.
    pub fn new(config: ManagedStorageConfig, factory: &StorageFactory) -> StorageResult<Self> {
        let tenant_segment = keys::normalize_path(Some(&config.tenant_id))
            .filter(|segment| !segment.split('/').any(|part| part == ".." || part == "."))
            .ok_or_else(|| {
                StorageError::InvalidTenant(
                    "Managed storage provider requires a valid tenantId.".to_string(),
                )
            })?;

        let upstream_base = config.upstream.base_path().unwrap_or_default();
        let custom_base = keys::normalize_path(config.base_prefix.as_deref()).unwrap_or_default();
        let effective_prefix = join_segments([
            upstream_base.as_str(),
            custom_base.as_str(),
            tenant_segment.as_str(),
        ]);

        let scoped = config.upstream.with_base_path(&effective_prefix);
        let needs_manual_prefix = scoped.is_s3_family();
        let upstream = factory.create_provider(&StorageConfig::from(scoped))?;

        tracing::debug!(
            tenant_id = %config.tenant_id,
            provider_key = %config.provider_key,
            upstream = upstream.provider_name(),
            effective_prefix = %effective_prefix,
            needs_manual_prefix,
            "Created managed storage provider"
        );

        Ok(Self {
            upstream,
            tenant_id: config.tenant_id,
            provider_key: config.provider_key,
            effective_prefix,
            needs_manual_prefix,
        })
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn provider_key(&self) -> &str {
        &self.provider_key
    }

    pub fn effective_prefix(&self) -> &str {
        &self.effective_prefix
    }

    pub fn needs_manual_prefix(&self) -> bool {
        self.needs_manual_prefix
    }

    /// Translate a tenant-relative key into the key the upstream expects.
    pub fn prepare_key_for_upstream(&self, key: &str) -> StorageResult<String> {
        let normalized = keys::validate_key(key)?;
        if !self.needs_manual_prefix {
            return Ok(normalized);
        }
        Ok(join_segments([self.effective_prefix.as_str(), normalized.as_str()]))
    }

    /// Translate an upstream key back into a tenant-relative key. Returns the
    /// empty string for the namespace root itself.
    pub fn strip_effective_prefix(&self, raw_key: &str) -> String {
        if !self.needs_manual_prefix {
            // Path-based upstreams already report keys relative to their scope.
            return keys::normalize_key(raw_key);
        }
        keys::strip_prefix(&self.effective_prefix, raw_key)
    }

    fn normalize_result(&self, object: StorageObject) -> StorageObject {
        let key = self.strip_effective_prefix(&object.key);
        StorageObject { key, ..object }
    }

    fn is_in_namespace(&self, raw_key: &str) -> bool {
        if !self.needs_manual_prefix {
            return true;
        }
        let key = keys::normalize_key(raw_key);
        key == self.effective_prefix || key.starts_with(&format!("{}/", self.effective_prefix))
    }

    /// Strip every key, dropping entries outside the namespace and the
    /// namespace root itself.
    fn normalize_results(&self, objects: Vec<StorageObject>) -> Vec<StorageObject> {
        objects
            .into_iter()
            .filter(|object| !object.key.is_empty() && self.is_in_namespace(&object.key))
            .map(|object| self.normalize_result(object))
            .filter(|object| !object.key.is_empty())
            .collect()
    }

    fn to_upstream_objects(&self, objects: &[StorageObject]) -> Vec<StorageObject> {
        objects
            .iter()
            .filter(|object| !object.key.is_empty())
            .filter_map(|object| {
                self.prepare_key_for_upstream(&object.key)
                    .ok()
                    .map(|key| object.with_key(key))
            })
            .collect()
    }
}

#[async_trait]
impl StorageProvider for ManagedStorageProvider {
    async fn get_file(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let target = self.prepare_key_for_upstream(key)?;
        self.upstream.get_file(&target).await
    }

    async fn list_images(&self) -> StorageResult<Vec<StorageObject>> {
        let objects = self.upstream.list_images().await?;
        Ok(self.normalize_results(objects))
    }

    async fn list_all_files(
        &self,
        progress: Option<&ProgressCallback>,
    ) -> StorageResult<Vec<StorageObject>> {
        let objects = self.upstream.list_all_files(progress).await?;
        Ok(self.normalize_results(objects))
    }

    async fn generate_public_url(&self, key: &str) -> StorageResult<String> {
        let target = self.prepare_key_for_upstream(key)?;
        self.upstream.generate_public_url(&target).await
    }

    fn detect_live_photos(&self, objects: &[StorageObject]) -> HashMap<String, StorageObject> {
        let upstream_objects = self.to_upstream_objects(objects);
        let pairs = self.upstream.detect_live_photos(&upstream_objects);

        pairs
            .into_iter()
            .filter_map(|(still_key, video)| {
                let still_key = self.strip_effective_prefix(&still_key);
                if still_key.is_empty() {
                    return None;
                }
                Some((still_key, self.normalize_result(video)))
            })
            .collect()
    }

    async fn delete_file(&self, key: &str) -> StorageResult<()> {
        let target = self.prepare_key_for_upstream(key)?;
        self.upstream.delete_file(&target).await
    }

    async fn delete_folder(&self, prefix: &str) -> StorageResult<()> {
        let normalized = keys::validate_key(prefix)?;
        let target = if self.needs_manual_prefix && normalized.is_empty() {
            // "Everything" means this tenant's namespace, never the whole bucket.
            self.effective_prefix.clone()
        } else {
            self.prepare_key_for_upstream(&normalized)?
        };

        tracing::info!(
            tenant_id = %self.tenant_id,
            prefix = %normalized,
            upstream_prefix = %target,
            "Deleting managed storage folder"
        );
        self.upstream.delete_folder(&target).await
    }

    async fn upload_file(
        &self,
        key: &str,
        data: Bytes,
        options: UploadOptions,
    ) -> StorageResult<StorageObject> {
        let target = self.prepare_key_for_upstream(key)?;
        let uploaded = self.upstream.upload_file(&target, data, options).await?;
        Ok(self.normalize_result(uploaded))
    }

    async fn move_file(
        &self,
        source_key: &str,
        target_key: &str,
        options: UploadOptions,
    ) -> StorageResult<StorageObject> {
        let source = self.prepare_key_for_upstream(source_key)?;
        let target = self.prepare_key_for_upstream(target_key)?;
        let moved = self.upstream.move_file(&source, &target, options).await?;
        Ok(self.normalize_result(moved))
    }

    fn provider_name(&self) -> &'static str {
        "managed"
    }
}
