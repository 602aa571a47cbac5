//! Provider record to `StorageConfig` mapping.
//!
//! This is the only place where untyped tenant settings become a typed
//! backend contract. Required fields fail loudly with a message naming the
//! field; malformed optional tuning values are dropped silently.

use photon_core::{normalize_string_to_undefined, parse_boolean, parse_number, require_string_with_message};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::{parse_retry_mode, B2Config, GitHubConfig, S3CompatibleConfig, StorageConfig};
use crate::factory::LOCAL_STORAGE_PROVIDERS;
use crate::traits::{StorageError, StorageResult};

/// A persisted storage provider entry from tenant or system settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub provider_type: String,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

impl ProviderRecord {
    pub fn new(id: impl Into<String>, provider_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider_type: provider_type.into(),
            config: HashMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }
}

/// Reject providers that only make sense next to the control plane's filesystem.
pub fn assert_provider_supported(provider_type: &str) -> StorageResult<()> {
    if LOCAL_STORAGE_PROVIDERS.contains(&provider_type) {
        let label = match provider_type {
            "eagle" => "Eagle",
            "local" => "Local",
            other => other,
        };
        return Err(StorageError::UnsupportedProvider(format!(
            "Storage provider {} is not supported in cloud deployments",
            label
        )));
    }
    Ok(())
}

fn missing(label: &str, field: &str) -> String {
    format!("Active {} storage provider is missing `{}`.", label, field)
}

pub fn map_provider_to_storage_config(record: &ProviderRecord) -> StorageResult<StorageConfig> {
    assert_provider_supported(&record.provider_type)?;

    match record.provider_type.as_str() {
        "s3" | "oss" | "cos" => {
            let label = record.provider_type.to_uppercase();
            let config = map_s3_compatible(record, &label)?;
            Ok(match record.provider_type.as_str() {
                "oss" => StorageConfig::Oss(config),
                "cos" => StorageConfig::Cos(config),
                _ => StorageConfig::S3(config),
            })
        }
        "github" => map_github(record).map(StorageConfig::Github),
        "b2" => map_b2(record).map(StorageConfig::B2),
        other => Err(StorageError::UnsupportedProvider(format!(
            "Unsupported storage provider type: {}",
            other
        ))),
    }
}

fn map_s3_compatible(record: &ProviderRecord, label: &str) -> StorageResult<S3CompatibleConfig> {
    let bucket = require_string_with_message(record.get("bucket"), missing(label, "bucket"))?;

    Ok(S3CompatibleConfig {
        bucket,
        region: normalize_string_to_undefined(record.get("region")),
        endpoint: normalize_string_to_undefined(record.get("endpoint")),
        access_key_id: normalize_string_to_undefined(record.get("accessKeyId")),
        secret_access_key: normalize_string_to_undefined(record.get("secretAccessKey"))
            .map(Into::into),
        prefix: normalize_string_to_undefined(record.get("prefix")),
        custom_domain: normalize_string_to_undefined(record.get("customDomain")),
        exclude_regex: normalize_string_to_undefined(record.get("excludeRegex")),
        max_file_limit: parse_number(record.get("maxFileLimit")),
        keep_alive: parse_boolean(record.get("keepAlive")),
        max_sockets: parse_number(record.get("maxSockets")),
        connection_timeout_ms: parse_number(record.get("connectionTimeoutMs")),
        socket_timeout_ms: parse_number(record.get("socketTimeoutMs")),
        request_timeout_ms: parse_number(record.get("requestTimeoutMs")),
        idle_timeout_ms: parse_number(record.get("idleTimeoutMs")),
        total_timeout_ms: parse_number(record.get("totalTimeoutMs")),
        retry_mode: parse_retry_mode(record.get("retryMode")),
        max_attempts: parse_number(record.get("maxAttempts")),
        download_concurrency: parse_number(record.get("downloadConcurrency")),
        sig_v4_service: normalize_string_to_undefined(record.get("sigV4Service")),
    })
}

fn map_github(record: &ProviderRecord) -> StorageResult<GitHubConfig> {
    let owner = require_string_with_message(record.get("owner"), missing("GitHub", "owner"))?;
    let repo = require_string_with_message(record.get("repo"), missing("GitHub", "repo"))?;

    Ok(GitHubConfig {
        owner,
        repo,
        branch: normalize_string_to_undefined(record.get("branch")),
        token: normalize_string_to_undefined(record.get("token")).map(Into::into),
        path: normalize_string_to_undefined(record.get("path")),
        use_raw_url: parse_boolean(record.get("useRawUrl")),
    })
}

fn map_b2(record: &ProviderRecord) -> StorageResult<B2Config> {
    let application_key_id = require_string_with_message(
        record.get("applicationKeyId"),
        missing("B2", "applicationKeyId"),
    )?;
    let application_key = require_string_with_message(
        record.get("applicationKey"),
        missing("B2", "applicationKey"),
    )?;
    let bucket_id = require_string_with_message(record.get("bucketId"), missing("B2", "bucketId"))?;
    let bucket_name =
        require_string_with_message(record.get("bucketName"), missing("B2", "bucketName"))?;

    Ok(B2Config {
        application_key_id,
        application_key: application_key.into(),
        bucket_id,
        bucket_name,
        prefix: normalize_string_to_undefined(record.get("prefix")),
        custom_domain: normalize_string_to_undefined(record.get("customDomain")),
        exclude_regex: normalize_string_to_undefined(record.get("excludeRegex")),
        max_file_limit: parse_number(record.get("maxFileLimit")),
        authorization_ttl_ms: parse_number(record.get("authorizationTtlMs")),
        upload_url_ttl_ms: parse_number(record.get("uploadUrlTtlMs")),
    })
}
