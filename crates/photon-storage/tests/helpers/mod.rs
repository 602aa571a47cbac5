//! Test helpers: a recording upstream and a factory that hands it out.
//!
//! Run from workspace root: `cargo test -p photon-storage --test managed_test`.

use async_trait::async_trait;
use bytes::Bytes;
use photon_storage::{
    InMemoryStorageProvider, ProgressCallback, ProviderCategory, StorageConfig, StorageFactory,
    StorageObject, StorageProvider, StorageResult, UploadOptions,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One call observed by the recording upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Get(String),
    ListImages,
    ListAll,
    PublicUrl(String),
    Delete(String),
    DeleteFolder(String),
    Upload(String),
    Move(String, String),
}

/// In-memory upstream that records every call and the config it was built from.
#[derive(Default)]
pub struct RecordingProvider {
    inner: InMemoryStorageProvider,
    calls: Mutex<Vec<Call>>,
    configs: Mutex<Vec<StorageConfig>>,
}

impl RecordingProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn last_config(&self) -> Option<StorageConfig> {
        self.configs.lock().unwrap().last().cloned()
    }

    pub async fn stored_keys(&self) -> Vec<String> {
        self.inner.keys().await
    }

    /// Write directly to the backing store, bypassing any decorator.
    pub async fn seed(&self, key: &str) {
        self.inner
            .upload_file(key, Bytes::from_static(b"seed"), UploadOptions::default())
            .await
            .unwrap();
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl StorageProvider for RecordingProvider {
    async fn get_file(&self, key: &str) -> StorageResult<Option<Bytes>> {
        self.record(Call::Get(key.to_string()));
        self.inner.get_file(key).await
    }

    async fn list_images(&self) -> StorageResult<Vec<StorageObject>> {
        self.record(Call::ListImages);
        self.inner.list_images().await
    }

    async fn list_all_files(
        &self,
        progress: Option<&ProgressCallback>,
    ) -> StorageResult<Vec<StorageObject>> {
        self.record(Call::ListAll);
        self.inner.list_all_files(progress).await
    }

    async fn generate_public_url(&self, key: &str) -> StorageResult<String> {
        self.record(Call::PublicUrl(key.to_string()));
        Ok(format!("https://cdn.test/{}", key))
    }

    fn detect_live_photos(&self, objects: &[StorageObject]) -> HashMap<String, StorageObject> {
        self.inner.detect_live_photos(objects)
    }

    async fn delete_file(&self, key: &str) -> StorageResult<()> {
        self.record(Call::Delete(key.to_string()));
        self.inner.delete_file(key).await
    }

    async fn delete_folder(&self, prefix: &str) -> StorageResult<()> {
        self.record(Call::DeleteFolder(prefix.to_string()));
        self.inner.delete_folder(prefix).await
    }

    async fn upload_file(
        &self,
        key: &str,
        data: Bytes,
        options: UploadOptions,
    ) -> StorageResult<StorageObject> {
        self.record(Call::Upload(key.to_string()));
        self.inner.upload_file(key, data, options).await
    }

    async fn move_file(
        &self,
        source_key: &str,
        target_key: &str,
        options: UploadOptions,
    ) -> StorageResult<StorageObject> {
        self.record(Call::Move(source_key.to_string(), target_key.to_string()));
        self.inner.move_file(source_key, target_key, options).await
    }

    fn provider_name(&self) -> &'static str {
        "recording"
    }
}

/// Default registry with `s3` and `github` replaced by the shared recorder.
pub fn recording_factory(recorder: Arc<RecordingProvider>) -> StorageFactory {
    let mut factory = StorageFactory::with_default_providers();
    for tag in ["s3", "github"] {
        let recorder = recorder.clone();
        factory.register_provider(
            tag,
            move |config, _| {
                recorder.configs.lock().unwrap().push(config.clone());
                Ok(recorder.clone() as Arc<dyn StorageProvider>)
            },
            ProviderCategory::Remote,
        );
    }
    factory
}
