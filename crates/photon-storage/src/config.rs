//! Storage configuration model
//!
//! `StorageConfig` is a tagged union discriminated by the `provider` field.
//! Each variant carries only the fields its backend understands, so a config
//! can never hold fields from another provider.

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::keys;
use crate::traits::StorageError;

/// A credential that serializes as a plain string but never prints.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for SecretString {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("\"***\"")
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// SDK retry strategy for S3-family backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryMode {
    Standard,
    Adaptive,
    Legacy,
}

impl FromStr for RetryMode {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(RetryMode::Standard),
            "adaptive" => Ok(RetryMode::Adaptive),
            "legacy" => Ok(RetryMode::Legacy),
            _ => Err(StorageError::ConfigError(format!("Invalid retry mode: {}", s))),
        }
    }
}

/// Parse a retry mode, treating blank or unknown input as absent.
pub fn parse_retry_mode(value: Option<&str>) -> Option<RetryMode> {
    photon_core::normalize_string_to_undefined(value)?.parse().ok()
}

/// Whether a provider may be used when storage is decoupled from the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderCategory {
    Local,
    Remote,
}

impl Display for ProviderCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ProviderCategory::Local => write!(f, "local"),
            ProviderCategory::Remote => write!(f, "remote"),
        }
    }
}

/// S3-compatible backends (AWS S3, Aliyun OSS, Tencent COS).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3CompatibleConfig {
    pub bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<SecretString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sockets: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_mode: Option<RetryMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_concurrency: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig_v4_service: Option<String>,
}

impl S3CompatibleConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<SecretString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_raw_url: Option<bool>,
}

/// Backblaze B2 native API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct B2Config {
    pub application_key_id: String,
    pub application_key: SecretString,
    pub bucket_id: String,
    pub bucket_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_ttl_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_url_ttl_ms: Option<u64>,
}

impl Default for SecretString {
    fn default() -> Self {
        Self(String::new())
    }
}

/// Tenant-scoped view over a shared remote upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedStorageConfig {
    pub tenant_id: String,
    pub provider_key: String,
    pub upstream: RemoteStorageConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_prefix: Option<String>,
}

/// Filesystem directory served under `base_url`. Self-hosted only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalConfig {
    pub base_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_limit: Option<u64>,
}

/// Eagle desktop library. Self-hosted only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EagleConfig {
    pub library_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// In-memory debug store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum StorageConfig {
    S3(S3CompatibleConfig),
    Oss(S3CompatibleConfig),
    Cos(S3CompatibleConfig),
    Github(GitHubConfig),
    B2(B2Config),
    Managed(ManagedStorageConfig),
    Local(LocalConfig),
    Eagle(EagleConfig),
    Memory(MemoryConfig),
}

impl StorageConfig {
    pub fn provider_tag(&self) -> &'static str {
        match self {
            StorageConfig::S3(_) => "s3",
            StorageConfig::Oss(_) => "oss",
            StorageConfig::Cos(_) => "cos",
            StorageConfig::Github(_) => "github",
            StorageConfig::B2(_) => "b2",
            StorageConfig::Managed(_) => "managed",
            StorageConfig::Local(_) => "local",
            StorageConfig::Eagle(_) => "eagle",
            StorageConfig::Memory(_) => "memory",
        }
    }
}

/// Any backend that can serve as a managed upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum RemoteStorageConfig {
    S3(S3CompatibleConfig),
    Oss(S3CompatibleConfig),
    Cos(S3CompatibleConfig),
    Github(GitHubConfig),
    B2(B2Config),
}

impl RemoteStorageConfig {
    pub fn provider_tag(&self) -> &'static str {
        match self {
            RemoteStorageConfig::S3(_) => "s3",
            RemoteStorageConfig::Oss(_) => "oss",
            RemoteStorageConfig::Cos(_) => "cos",
            RemoteStorageConfig::Github(_) => "github",
            RemoteStorageConfig::B2(_) => "b2",
        }
    }

    /// S3-family list/get calls are not confined by the configured prefix,
    /// so keys must be prefixed by hand.
    pub fn is_s3_family(&self) -> bool {
        matches!(
            self,
            RemoteStorageConfig::S3(_) | RemoteStorageConfig::Oss(_) | RemoteStorageConfig::Cos(_)
        )
    }

    /// The upstream's own prefix/path field, normalized.
    pub fn base_path(&self) -> Option<String> {
        match self {
            RemoteStorageConfig::S3(c) | RemoteStorageConfig::Oss(c) | RemoteStorageConfig::Cos(c) => {
                keys::normalize_path(c.prefix.as_deref())
            }
            RemoteStorageConfig::B2(c) => keys::normalize_path(c.prefix.as_deref()),
            RemoteStorageConfig::Github(c) => keys::normalize_path(c.path.as_deref()),
        }
    }

    /// Return a copy whose prefix/path field is replaced by `prefix`.
    pub fn with_base_path(&self, prefix: &str) -> RemoteStorageConfig {
        let Some(prefix) = keys::normalize_path(Some(prefix)) else {
            return self.clone();
        };

        let mut scoped = self.clone();
        match &mut scoped {
            RemoteStorageConfig::S3(c) | RemoteStorageConfig::Oss(c) | RemoteStorageConfig::Cos(c) => {
                c.prefix = Some(prefix);
            }
            RemoteStorageConfig::B2(c) => c.prefix = Some(prefix),
            RemoteStorageConfig::Github(c) => c.path = Some(prefix),
        }
        scoped
    }
}

impl From<RemoteStorageConfig> for StorageConfig {
    fn from(config: RemoteStorageConfig) -> Self {
        match config {
            RemoteStorageConfig::S3(c) => StorageConfig::S3(c),
            RemoteStorageConfig::Oss(c) => StorageConfig::Oss(c),
            RemoteStorageConfig::Cos(c) => StorageConfig::Cos(c),
            RemoteStorageConfig::Github(c) => StorageConfig::Github(c),
            RemoteStorageConfig::B2(c) => StorageConfig::B2(c),
        }
    }
}

impl TryFrom<StorageConfig> for RemoteStorageConfig {
    type Error = StorageError;

    fn try_from(config: StorageConfig) -> Result<Self, Self::Error> {
        match config {
            StorageConfig::S3(c) => Ok(RemoteStorageConfig::S3(c)),
            StorageConfig::Oss(c) => Ok(RemoteStorageConfig::Oss(c)),
            StorageConfig::Cos(c) => Ok(RemoteStorageConfig::Cos(c)),
            StorageConfig::Github(c) => Ok(RemoteStorageConfig::Github(c)),
            StorageConfig::B2(c) => Ok(RemoteStorageConfig::B2(c)),
            other => Err(StorageError::UnsupportedProvider(format!(
                "Storage provider `{}` cannot be used as a managed upstream",
                other.provider_tag()
            ))),
        }
    }
}
