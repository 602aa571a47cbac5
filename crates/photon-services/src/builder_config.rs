//! Builder configuration handed to the sync pipeline alongside the resolved
//! storage config.

use photon_storage::StorageConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingSettings {
    pub default_concurrency: usize,
    pub enable_live_photo_detection: bool,
    /// Length of the content digest appended to generated photo ids; 0 disables it.
    pub digest_suffix_length: usize,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            default_concurrency: 10,
            enable_live_photo_detection: true,
            digest_suffix_length: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilitySettings {
    pub show_progress: bool,
    pub show_detailed_stats: bool,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            show_progress: true,
            show_detailed_stats: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSettings {
    #[serde(default)]
    pub processing: ProcessingSettings,
    #[serde(default)]
    pub observability: ObservabilitySettings,
}

/// Per-tenant settings. `storage` is filled in by the storage resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    #[serde(default)]
    pub storage: Option<StorageConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderConfig {
    #[serde(default)]
    pub system: SystemSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSettings>,
}

impl BuilderConfig {
    /// Return the user settings, creating empty ones when absent.
    pub fn ensure_user_settings(&mut self) -> &mut UserSettings {
        self.user.get_or_insert_with(UserSettings::default)
    }

    pub fn user_storage(&self) -> Option<&StorageConfig> {
        self.user.as_ref().and_then(|user| user.storage.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use photon_storage::S3CompatibleConfig;

    #[test]
    fn ensure_user_settings_creates_and_reuses() {
        let mut config = BuilderConfig::default();
        assert!(config.user_storage().is_none());

        config.ensure_user_settings().storage =
            Some(StorageConfig::S3(S3CompatibleConfig::new("photos")));
        assert!(config.user.is_some());

        // A second call keeps what was written
        config.ensure_user_settings();
        assert_eq!(config.user_storage().map(|s| s.provider_tag()), Some("s3"));
    }

    #[test]
    fn deserializes_partial_json_with_defaults() {
        let config: BuilderConfig = serde_json::from_str(
            r#"{"system":{"processing":{"defaultConcurrency":4,"enableLivePhotoDetection":false,"digestSuffixLength":8}}}"#,
        )
        .unwrap();
        assert_eq!(config.system.processing.default_concurrency, 4);
        assert!(!config.system.processing.enable_live_photo_detection);
        assert!(config.system.observability.show_progress);
        assert!(config.user.is_none());
    }
}
