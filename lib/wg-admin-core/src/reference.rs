//! Binding of imported identifiers to typed references

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};
use wg_admin_api::ReferenceKind;

use crate::error::ResolutionError;

/// An opaque identifier tagged with its kind.
///
/// The identifier is never parsed; the backend may change its grammar.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ExternalReference {
    kind: ReferenceKind,
    id: String,
}

impl ExternalReference {
    pub fn kind(&self) -> ReferenceKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ExternalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind, self.id)
    }
}

/// The three handles of a discovery namespace
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DiscoveryNamespace {
    pub id: ExternalReference,
    pub arn: ExternalReference,
    pub name: ExternalReference,
}

impl DiscoveryNamespace {
    /// Fully qualified name of `service` inside this namespace
    pub fn fqdn(&self, service: &str) -> String {
        format!("{}.{}", service, self.name.id())
    }
}

/// Every required reference, resolved
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedReferences {
    cluster: ExternalReference,
    network: ExternalReference,
    namespace: DiscoveryNamespace,
    load_balancer: ExternalReference,
    load_balancer_security_group: ExternalReference,
}

impl ResolvedReferences {
    pub fn cluster(&self) -> &ExternalReference {
        &self.cluster
    }

    pub fn network(&self) -> &ExternalReference {
        &self.network
    }

    pub fn namespace(&self) -> &DiscoveryNamespace {
        &self.namespace
    }

    pub fn load_balancer(&self) -> &ExternalReference {
        &self.load_balancer
    }

    pub fn load_balancer_security_group(&self) -> &ExternalReference {
        &self.load_balancer_security_group
    }

    pub fn get(&self, kind: ReferenceKind) -> &ExternalReference {
        match kind {
            ReferenceKind::Cluster => &self.cluster,
            ReferenceKind::Network => &self.network,
            ReferenceKind::NamespaceId => &self.namespace.id,
            ReferenceKind::NamespaceArn => &self.namespace.arn,
            ReferenceKind::NamespaceName => &self.namespace.name,
            ReferenceKind::LoadBalancer => &self.load_balancer,
            ReferenceKind::LoadBalancerSecurityGroup => &self.load_balancer_security_group,
        }
    }

    /// All references keyed by kind
    pub fn to_map(&self) -> BTreeMap<ReferenceKind, ExternalReference> {
        ReferenceKind::REQUIRED
            .into_iter()
            .map(|kind| (kind, self.get(kind).clone()))
            .collect()
    }
}

/// Resolves raw `key -> identifier` maps into [`ResolvedReferences`].
///
/// Keys may be either the kind key (`load-balancer`) or the export name of
/// the network stack (`TqsftStack-NLBArn`). Unknown keys are ignored.
pub struct ReferenceResolver;

impl ReferenceResolver {
    pub fn resolve(
        raw_refs: &BTreeMap<String, String>,
    ) -> Result<ResolvedReferences, ResolutionError> {
        let mut found: BTreeMap<ReferenceKind, &str> = BTreeMap::new();

        for (key, value) in raw_refs {
            let Some(kind) = ReferenceKind::from_key_or_export(key) else {
                warn!("Ignoring unknown reference key: {}", key);
                continue;
            };

            if let Some(previous) = found.insert(kind, value.as_str()) {
                if previous != value.as_str() {
                    return Err(ResolutionError::InvalidReference {
                        kind,
                        reason: "conflicting values for the same kind".to_string(),
                    });
                }
            }
        }

        let mut take = |kind: ReferenceKind| -> Result<ExternalReference, ResolutionError> {
            let id = found
                .remove(&kind)
                .ok_or(ResolutionError::MissingReference { kind })?;
            validate(kind, id)?;
            Ok(ExternalReference {
                kind,
                id: id.to_string(),
            })
        };

        let resolved = ResolvedReferences {
            cluster: take(ReferenceKind::Cluster)?,
            network: take(ReferenceKind::Network)?,
            namespace: DiscoveryNamespace {
                id: take(ReferenceKind::NamespaceId)?,
                arn: take(ReferenceKind::NamespaceArn)?,
                name: take(ReferenceKind::NamespaceName)?,
            },
            load_balancer: take(ReferenceKind::LoadBalancer)?,
            load_balancer_security_group: take(ReferenceKind::LoadBalancerSecurityGroup)?,
        };

        debug!("Resolved {} external references", ReferenceKind::REQUIRED.len());
        Ok(resolved)
    }
}

fn validate(kind: ReferenceKind, id: &str) -> Result<(), ResolutionError> {
    if id.trim().is_empty() {
        return Err(ResolutionError::InvalidReference {
            kind,
            reason: "identifier is empty".to_string(),
        });
    }
    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ResolutionError::InvalidReference {
            kind,
            reason: "identifier contains whitespace".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn raw_refs() -> BTreeMap<String, String> {
        [
            ("cluster", "tqsft-cluster"),
            ("network", "vpc-0a1b2c3d"),
            ("namespace-id", "ns-abc123"),
            ("namespace-arn", "arn:aws:servicediscovery:eu-west-1:123456789012:namespace/ns-abc123"),
            ("namespace-name", "tqsft.local"),
            ("load-balancer", "arn:aws:elasticloadbalancing:eu-west-1:123456789012:loadbalancer/net/tqsft/abc"),
            ("load-balancer-security-group", "sg-0123456789"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_resolve_all_kinds() {
        let refs = ReferenceResolver::resolve(&raw_refs()).unwrap();
        assert_eq!(refs.cluster().id(), "tqsft-cluster");
        assert_eq!(refs.load_balancer_security_group().kind(), ReferenceKind::LoadBalancerSecurityGroup);
        assert_eq!(refs.namespace().fqdn("wg-admin"), "wg-admin.tqsft.local");
        assert_eq!(refs.to_map().len(), 7);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let first = ReferenceResolver::resolve(&raw_refs()).unwrap();
        let second = ReferenceResolver::resolve(&raw_refs()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_map(), second.to_map());
    }

    #[test]
    fn test_missing_load_balancer() {
        let mut raw = raw_refs();
        raw.remove("load-balancer");
        assert_eq!(
            ReferenceResolver::resolve(&raw),
            Err(ResolutionError::MissingReference {
                kind: ReferenceKind::LoadBalancer
            })
        );
    }

    #[test]
    fn test_empty_identifier_is_invalid() {
        let mut raw = raw_refs();
        raw.insert("network".to_string(), "  ".to_string());
        assert!(matches!(
            ReferenceResolver::resolve(&raw),
            Err(ResolutionError::InvalidReference {
                kind: ReferenceKind::Network,
                ..
            })
        ));
    }

    #[test]
    fn test_export_names_are_accepted() {
        let mut raw = raw_refs();
        let arn = raw.remove("load-balancer").unwrap();
        raw.insert("TqsftStack-NLBArn".to_string(), arn.clone());
        raw.insert("unrelated".to_string(), "value".to_string());

        let refs = ReferenceResolver::resolve(&raw).unwrap();
        assert_eq!(refs.load_balancer().id(), arn);
    }

    #[test]
    fn test_conflicting_aliases() {
        let mut raw = raw_refs();
        raw.insert("TqsftStack-ClusterName".to_string(), "other-cluster".to_string());
        assert!(matches!(
            ReferenceResolver::resolve(&raw),
            Err(ResolutionError::InvalidReference {
                kind: ReferenceKind::Cluster,
                ..
            })
        ));
    }

    #[test]
    fn test_identifiers_are_opaque() {
        let mut raw = raw_refs();
        raw.insert("cluster".to_string(), "not/an:arn?#".to_string());
        let refs = ReferenceResolver::resolve(&raw).unwrap();
        assert_eq!(refs.cluster().id(), "not/an:arn?#");
    }
}
