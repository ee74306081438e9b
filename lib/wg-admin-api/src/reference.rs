use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kind of an externally owned handle the topology is attached to.
///
/// All of these are created by the shared network stack and imported
/// by name; the topology never creates or deletes them.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceKind {
    /// Container cluster the service is scheduled into
    Cluster,
    /// Virtual network hosting the cluster and the target groups
    Network,
    /// Service discovery namespace id
    NamespaceId,
    /// Service discovery namespace ARN
    NamespaceArn,
    /// Service discovery namespace DNS name
    NamespaceName,
    /// Shared network load balancer ARN
    LoadBalancer,
    /// Security group attached to the shared load balancer
    LoadBalancerSecurityGroup,
}

impl ReferenceKind {
    /// Every kind the composition needs, in resolution order
    pub const REQUIRED: [ReferenceKind; 7] = [
        ReferenceKind::Cluster,
        ReferenceKind::Network,
        ReferenceKind::NamespaceId,
        ReferenceKind::NamespaceArn,
        ReferenceKind::NamespaceName,
        ReferenceKind::LoadBalancer,
        ReferenceKind::LoadBalancerSecurityGroup,
    ];

    /// Key used for this kind in raw reference maps
    pub fn key(&self) -> &'static str {
        match self {
            ReferenceKind::Cluster => "cluster",
            ReferenceKind::Network => "network",
            ReferenceKind::NamespaceId => "namespace-id",
            ReferenceKind::NamespaceArn => "namespace-arn",
            ReferenceKind::NamespaceName => "namespace-name",
            ReferenceKind::LoadBalancer => "load-balancer",
            ReferenceKind::LoadBalancerSecurityGroup => "load-balancer-security-group",
        }
    }

    /// Name under which the network stack exports this handle
    pub fn export_name(&self) -> &'static str {
        match self {
            ReferenceKind::Cluster => "TqsftStack-ClusterName",
            ReferenceKind::Network => "TqsftStack-VpcId",
            ReferenceKind::NamespaceId => "TqsftStack-NsId",
            ReferenceKind::NamespaceArn => "TqsftStack-NsArn",
            ReferenceKind::NamespaceName => "TqsftStack-NsName",
            ReferenceKind::LoadBalancer => "TqsftStack-NLBArn",
            ReferenceKind::LoadBalancerSecurityGroup => "TqsftStack-NLBSG",
        }
    }

    /// Look a kind up by its map key or by its export name
    pub fn from_key_or_export(name: &str) -> Option<Self> {
        Self::REQUIRED
            .into_iter()
            .find(|kind| kind.key() == name || kind.export_name() == name)
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown reference kind: {0}")]
pub struct ParseReferenceKindError(pub String);

impl FromStr for ReferenceKind {
    type Err = ParseReferenceKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key_or_export(s).ok_or_else(|| ParseReferenceKindError(s.to_string()))
    }
}
