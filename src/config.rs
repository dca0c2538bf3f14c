//! Configuration management for Sketchguard.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, SketchguardError};
use crate::ratelimit::policy::{default_policies, Policy};

/// Prefix for environment variable overrides, e.g. `SKETCHGUARD__SERVER__HTTP_ADDR`.
const ENV_PREFIX: &str = "SKETCHGUARD";

/// Main configuration for the Sketchguard service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SketchguardConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// How often expired counters are swept, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Named policies; entries override the built-in policy of the same name
    #[serde(default = "default_policies", deserialize_with = "merge_with_defaults")]
    pub policies: BTreeMap<String, Policy>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            policies: default_policies(),
        }
    }
}

impl RateLimitingConfig {
    /// Get the sweep interval.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_sweep_interval() -> u64 {
    60
}

fn merge_with_defaults<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, Policy>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let overrides = BTreeMap::<String, Policy>::deserialize(deserializer)?;
    let mut policies = default_policies();
    policies.extend(overrides);
    Ok(policies)
}

impl SketchguardConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: SketchguardConfig = serde_yaml::from_str(yaml)
            .map_err(|e| SketchguardError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file layered under
    /// `SKETCHGUARD__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(::config::File::from(path));
        }

        let config: SketchguardConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check every policy and the sweep interval.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.sweep_interval_secs == 0 {
            return Err(SketchguardError::Config(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        for (name, policy) in &self.rate_limiting.policies {
            policy
                .validate()
                .map_err(|e| SketchguardError::Config(format!("policy '{}': {}", name, e)))?;
        }
        Ok(())
    }
}
