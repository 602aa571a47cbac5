//! Helpers shared by the `photon` operator binary.

use anyhow::Context;
use photon_core::LogFormat;
use photon_storage::{
    map_provider_to_storage_config, ManagedStorageConfig, ProviderRecord, RemoteStorageConfig,
    StorageConfig,
};
use serde_json::Value;
use std::path::Path;

/// Config fields whose values are replaced before printing.
const SECRET_FIELDS: &[&str] = &["secretAccessKey", "applicationKey", "token"];

/// Initialize tracing for CLI binaries.
pub fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Read a provider record (`{"id", "type", "config"}`) from a JSON file.
pub fn load_record(path: &Path) -> anyhow::Result<ProviderRecord> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read provider record {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid provider record JSON in {}", path.display()))
}

/// Map a record to a storage config, wrapping it in a managed config when a
/// tenant is given.
pub fn build_storage_config(
    record: &ProviderRecord,
    tenant_id: Option<&str>,
    base_prefix: Option<&str>,
) -> anyhow::Result<StorageConfig> {
    let mapped = map_provider_to_storage_config(record)
        .with_context(|| format!("Provider record `{}` is invalid", record.id))?;

    let Some(tenant_id) = tenant_id else {
        return Ok(mapped);
    };

    let upstream = RemoteStorageConfig::try_from(mapped)
        .context("Managed storage needs a remote upstream")?;
    Ok(StorageConfig::Managed(ManagedStorageConfig {
        tenant_id: tenant_id.to_string(),
        provider_key: record.id.clone(),
        upstream,
        base_prefix: base_prefix.map(str::to_string),
    }))
}

/// Serialize a config for display with credentials masked.
pub fn redacted_json(config: &StorageConfig) -> anyhow::Result<Value> {
    let mut value = serde_json::to_value(config).context("Serialize storage config")?;
    redact(&mut value);
    Ok(value)
}

fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if SECRET_FIELDS.contains(&key.as_str()) && entry.is_string() {
                    *entry = Value::String("***".to_string());
                } else {
                    redact(entry);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact),
        _ => {}
    }
}

/// Truncate a string to max_len characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Human-readable byte size for listings.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
