//! Seam to the provisioning platform

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use wg_admin_api::{IngressRule, PolicyStatement, Protocol, RoleKind};

use crate::exposure::{Listener, TargetGroup};
use crate::reference::{DiscoveryNamespace, ExternalReference};
use crate::wiring::ServiceDescriptor;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflicting resource: {0}")]
    Conflict(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Result of adding an ingress permission to a shared security group
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IngressOutcome {
    Created,
    /// The same rule, with the same owner tag, was already there
    AlreadyPresent,
    /// Another owner (the contained tag) already opened this permission.
    /// The caller is recorded as a co-owner, the permission itself is unchanged.
    SharedWith(String),
}

/// Provisioning operations used by the composition.
///
/// Each call completes before the next one is issued. Every `ensure_*`
/// operation is additive and idempotent: re-applying the same value is a
/// no-op, and nothing the caller does not own is ever removed or rewritten.
#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    /// Check that the discovery namespace exists and is reachable
    async fn lookup_namespace(&self, namespace: &DiscoveryNamespace) -> BackendResult<()>;

    /// Attach a statement to one of the service roles
    async fn grant(
        &self,
        service: &str,
        role: RoleKind,
        statement: &PolicyStatement,
    ) -> BackendResult<()>;

    /// Create or update the service, its task definition and discovery record
    async fn register_service(&self, service: &ServiceDescriptor) -> BackendResult<()>;

    async fn find_listener(
        &self,
        load_balancer: &ExternalReference,
        port: u16,
        protocol: Protocol,
    ) -> BackendResult<Option<Listener>>;

    async fn find_target_group(&self, name: &str) -> BackendResult<Option<TargetGroup>>;

    async fn ensure_target_group(
        &self,
        network: &ExternalReference,
        target_group: &TargetGroup,
    ) -> BackendResult<()>;

    async fn ensure_listener(
        &self,
        load_balancer: &ExternalReference,
        listener: &Listener,
    ) -> BackendResult<()>;

    /// Open `rule` on a shared security group under the rule's description.
    /// One permission may carry several owner tags; it stays open while any
    /// owner remains.
    async fn ensure_ingress_rule(
        &self,
        security_group: &ExternalReference,
        rule: &IngressRule,
    ) -> BackendResult<IngressOutcome>;
}
