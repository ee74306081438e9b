//! Deployment configuration: YAML file plus environment overrides

use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};
use wg_admin_api::{
    CapacityProvider, CapacityProviderStrategy, ExposureRule, LogConfiguration, NetworkMode,
    ObjectLocation, PortBinding, ReferenceKind,
};
use wg_admin_core::{AdminPassword, DeploymentParameters, TopologySettings, VpnSecrets};

const DEFAULT_CONFIG_PATH: &str = "wg-admin.yaml";

/// Configuration of one deployment of the WireGuard admin service
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployConfig {
    /// Public VPN host name (WG_HOST)
    pub host: Option<String>,

    /// Admin UI password (WG_ADMIN_PASSWORD)
    #[schemars(with = "Option<String>")]
    pub password: Option<AdminPassword>,

    /// Number of tasks to run; 0 stages the service without scheduling it
    pub desired_count: u32,

    /// Imported handles, keyed by kind (`load-balancer`) or export name (`TqsftStack-NLBArn`)
    pub references: BTreeMap<String, String>,

    /// Container image override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    pub network_mode: NetworkMode,

    /// Capacity provider strategies; empty uses AL2023AsgCapProvider with weight 1
    pub capacity: Vec<CapacityProviderStrategy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LogConfiguration>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<ObjectLocation>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_bindings: Option<Vec<PortBinding>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure_rules: Option<Vec<ExposureRule>>,
}

impl DeployConfig {
    /// Load from `WG_ADMIN_CONFIG` (or `wg-admin.yaml` when present), then
    /// apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("WG_ADMIN_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            Err(_) => {
                info!("No configuration file, using defaults and environment");
                Self::default()
            }
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Override file values with environment variables looked up through `var`
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = var("WG_HOST") {
            self.host = Some(host);
        }
        if let Some(password) = var("WG_ADMIN_PASSWORD") {
            self.password = Some(AdminPassword::new(password));
        }
        if let Some(count) = var("WG_ADMIN_DESIRED_COUNT") {
            self.desired_count = count
                .parse()
                .with_context(|| format!("WG_ADMIN_DESIRED_COUNT is not a count: {}", count))?;
        }
        if let Some(provider) = var("WG_ADMIN_CAPACITY_PROVIDER") {
            let provider: CapacityProvider = provider.parse()?;
            self.capacity = vec![CapacityProviderStrategy {
                capacity_provider: provider,
                ..Default::default()
            }];
        }
        for kind in ReferenceKind::REQUIRED {
            let name = reference_env_var(kind);
            if let Some(value) = var(&name) {
                debug!("Reference {} taken from {}", kind, name);
                self.references.retain(|key, _| {
                    ReferenceKind::from_key_or_export(key) != Some(kind)
                });
                self.references.insert(kind.key().to_string(), value);
            }
        }
        Ok(())
    }

    pub fn settings(&self) -> TopologySettings {
        let defaults = TopologySettings::default();
        TopologySettings {
            image: self.image.clone().unwrap_or(defaults.image),
            network_mode: self.network_mode,
            capacity: if self.capacity.is_empty() {
                defaults.capacity
            } else {
                self.capacity.clone()
            },
            logging: self.logging.clone().unwrap_or(defaults.logging),
            storage: self.storage.clone().unwrap_or(defaults.storage),
            port_bindings: self.port_bindings.clone().unwrap_or(defaults.port_bindings),
            exposure_rules: self.exposure_rules.clone().unwrap_or(defaults.exposure_rules),
        }
    }

    /// Missing host or password are left empty and rejected by the compiler
    pub fn parameters(&self) -> DeploymentParameters {
        DeploymentParameters {
            secrets: VpnSecrets {
                host: self.host.clone().unwrap_or_default(),
                password: self
                    .password
                    .clone()
                    .unwrap_or_else(|| AdminPassword::new("")),
            },
            desired_count: self.desired_count,
        }
    }
}

/// `WG_ADMIN_REF_LOAD_BALANCER` for `load-balancer`
pub fn reference_env_var(kind: ReferenceKind) -> String {
    format!(
        "WG_ADMIN_REF_{}",
        kind.key().replace('-', "_").to_uppercase()
    )
}
