//! Configuration module
//!
//! Process-level settings loaded from the environment. Per-tenant storage
//! provider settings are tenant data and never come from here.

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

const PROVIDER_CACHE_CAPACITY: usize = 256;

/// Where the control plane runs. Cloud deployments never serve local providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
    Cloud,
    SelfHosted,
}

impl FromStr for Deployment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cloud" => Ok(Deployment::Cloud),
            "self-hosted" | "selfhosted" | "self_hosted" => Ok(Deployment::SelfHosted),
            _ => Err(anyhow::anyhow!("Invalid deployment mode: {}", s)),
        }
    }
}

impl Display for Deployment {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Deployment::Cloud => write!(f, "cloud"),
            Deployment::SelfHosted => write!(f, "self-hosted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(anyhow::anyhow!("Invalid log format: {}", s)),
        }
    }
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub deployment: Deployment,
    pub provider_cache_capacity: usize,
    pub log_format: LogFormat,
    /// Optional base URL used by tooling when a backend cannot produce one itself
    pub public_url_base: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            deployment: Deployment::Cloud,
            provider_cache_capacity: PROVIDER_CACHE_CAPACITY,
            log_format: LogFormat::Pretty,
            public_url_base: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let deployment = match env::var("PHOTON_DEPLOYMENT") {
            Ok(value) => value.parse()?,
            Err(_) => Deployment::Cloud,
        };

        let provider_cache_capacity = env::var("STORAGE_PROVIDER_CACHE_CAPACITY")
            .unwrap_or_else(|_| PROVIDER_CACHE_CAPACITY.to_string())
            .parse::<usize>()
            .unwrap_or(PROVIDER_CACHE_CAPACITY);

        let log_format = env::var("LOG_FORMAT")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(LogFormat::Pretty);

        let public_url_base = env::var("STORAGE_PUBLIC_URL_BASE")
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty());

        let config = Config {
            environment,
            deployment,
            provider_cache_capacity,
            log_format,
            public_url_base,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.provider_cache_capacity == 0 {
            return Err(anyhow::anyhow!(
                "STORAGE_PROVIDER_CACHE_CAPACITY must be greater than zero"
            ));
        }
        Ok(())
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let environment = self.environment.to_lowercase();
        environment == "production" || environment == "prod"
    }

    pub fn is_cloud(&self) -> bool {
        self.deployment == Deployment::Cloud
    }
}
