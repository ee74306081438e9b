//! Container level settings that are not port bindings

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Linux kernel capability added to the container
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    /// Modify kernel networking (interfaces, routes, netfilter)
    NetAdmin,
    /// Load and unload kernel modules
    SysModule,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::NetAdmin => "NET_ADMIN",
            Capability::SysModule => "SYS_MODULE",
        };
        f.write_str(name)
    }
}

/// Task networking mode. Both modes map host ports 1:1 onto container ports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// Share the host network stack
    #[default]
    Host,
    /// Dedicated interface with its own security group
    Awsvpc,
}

/// Where the container ships its logs. The group itself is managed elsewhere.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogConfiguration {
    pub driver: String,
    pub group: String,
    pub stream_prefix: String,
}

impl Default for LogConfiguration {
    fn default() -> Self {
        Self {
            driver: "awslogs".to_string(),
            group: "/ecs/tqsft-services".to_string(),
            stream_prefix: "WgAdminLogs".to_string(),
        }
    }
}

/// A single object in a bucket
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into().trim_start_matches('/').to_string(),
        }
    }

    /// `s3://bucket/key`
    pub fn url(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }

    pub fn bucket_arn(&self) -> String {
        format!("arn:aws:s3:::{}", self.bucket)
    }

    /// ARN matching every object under the key's directory
    pub fn prefix_arn(&self) -> String {
        match self.key.rsplit_once('/') {
            Some((prefix, _)) => format!("arn:aws:s3:::{}/{}/*", self.bucket, prefix),
            None => format!("arn:aws:s3:::{}/*", self.bucket),
        }
    }
}

impl Default for ObjectLocation {
    fn default() -> Self {
        Self::new("ecs-clusters-space", "WgAdmin/wg0.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_location_strips_leading_slash() {
        let location = ObjectLocation::new("ecs-clusters-space", "/WgAdmin/wg0.json");
        assert_eq!(location.url(), "s3://ecs-clusters-space/WgAdmin/wg0.json");
        assert_eq!(location, ObjectLocation::default());
    }

    #[test]
    fn test_object_location_arns() {
        let location = ObjectLocation::default();
        assert_eq!(location.bucket_arn(), "arn:aws:s3:::ecs-clusters-space");
        assert_eq!(location.prefix_arn(), "arn:aws:s3:::ecs-clusters-space/WgAdmin/*");

        let flat = ObjectLocation::new("b", "state.json");
        assert_eq!(flat.prefix_arn(), "arn:aws:s3:::b/*");
    }
}
