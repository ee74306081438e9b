//! Scheduling and discovery settings of the service

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Task placement rule, applied in order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum PlacementStrategy {
    /// Bin-pack on the host with the least free memory
    PackedByMemory,
    /// Bin-pack on the host with the least free cpu
    PackedByCpu,
}

/// Capacity provider registered on the shared cluster
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum CapacityProvider {
    #[default]
    #[serde(rename = "AL2023AsgCapProvider")]
    Al2023Asg,
    #[serde(rename = "BottlerocketCapProvider")]
    Bottlerocket,
}

impl CapacityProvider {
    pub fn name(&self) -> &'static str {
        match self {
            CapacityProvider::Al2023Asg => "AL2023AsgCapProvider",
            CapacityProvider::Bottlerocket => "BottlerocketCapProvider",
        }
    }
}

impl fmt::Display for CapacityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown capacity provider: {0}")]
pub struct ParseCapacityProviderError(pub String);

impl FromStr for CapacityProvider {
    type Err = ParseCapacityProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AL2023AsgCapProvider" | "al2023" => Ok(CapacityProvider::Al2023Asg),
            "BottlerocketCapProvider" | "bottlerocket" => Ok(CapacityProvider::Bottlerocket),
            other => Err(ParseCapacityProviderError(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CapacityProviderStrategy {
    pub capacity_provider: CapacityProvider,

    #[serde(default = "default_weight")]
    pub weight: u32,

    #[serde(default)]
    pub base: u32,
}

impl Default for CapacityProviderStrategy {
    fn default() -> Self {
        Self {
            capacity_provider: CapacityProvider::default(),
            weight: default_weight(),
            base: 0,
        }
    }
}

/// Record type registered in the discovery namespace
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DnsRecordType {
    #[default]
    A,
    #[serde(rename = "AAAA")]
    Aaaa,
    #[serde(rename = "SRV")]
    Srv,
}

fn default_weight() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_provider_names() {
        assert_eq!(CapacityProvider::default().name(), "AL2023AsgCapProvider");
        assert_eq!(
            "bottlerocket".parse::<CapacityProvider>(),
            Ok(CapacityProvider::Bottlerocket)
        );
        assert_eq!(
            "spot".parse::<CapacityProvider>(),
            Err(ParseCapacityProviderError("spot".to_string()))
        );
    }

    #[test]
    fn test_strategy_defaults() {
        let strategy: CapacityProviderStrategy =
            serde_json::from_str(r#"{"capacityProvider":"BottlerocketCapProvider"}"#).unwrap();
        assert_eq!(strategy.weight, 1);
        assert_eq!(strategy.base, 0);
    }
}
