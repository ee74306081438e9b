//! Service wiring: placement, capacity, discovery and role grants

use serde::Serialize;
use tracing::{debug, info};
use wg_admin_api::{
    any_ipv4, CapacityProviderStrategy, DnsRecordType, IngressRule, NetworkMode, ObjectLocation,
    PlacementStrategy, PolicyStatement, RoleKind,
};

use crate::backend::{BackendError, ProvisioningBackend};
use crate::container::ContainerSpec;
use crate::error::WiringError;
use crate::reference::{DiscoveryNamespace, ExternalReference};
use crate::topology;

/// Pack by memory then by cpu to keep the number of active hosts low
pub const PLACEMENT: [PlacementStrategy; 2] =
    [PlacementStrategy::PackedByMemory, PlacementStrategy::PackedByCpu];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRegistration {
    pub name: String,
    pub namespace_id: String,
    pub namespace_name: String,
    pub record_type: DnsRecordType,
    pub fqdn: String,
}

/// A fully wired service. Only [`ServiceWiringEngine::wire`] creates one and
/// it is read-only afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    name: String,
    cluster: ExternalReference,
    network: ExternalReference,
    container: ContainerSpec,
    placement: Vec<PlacementStrategy>,
    capacity: Vec<CapacityProviderStrategy>,
    desired_count: u32,
    discovery: DiscoveryRegistration,
    enable_execute_command: bool,
    execution_policy: Vec<PolicyStatement>,
    task_policy: Vec<PolicyStatement>,
    service_ingress: Vec<IngressRule>,
}

impl ServiceDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cluster(&self) -> &ExternalReference {
        &self.cluster
    }

    pub fn network(&self) -> &ExternalReference {
        &self.network
    }

    pub fn container(&self) -> &ContainerSpec {
        &self.container
    }

    pub fn placement(&self) -> &[PlacementStrategy] {
        &self.placement
    }

    pub fn capacity(&self) -> &[CapacityProviderStrategy] {
        &self.capacity
    }

    /// Zero means registered but not scheduled
    pub fn desired_count(&self) -> u32 {
        self.desired_count
    }

    pub fn discovery(&self) -> &DiscoveryRegistration {
        &self.discovery
    }

    pub fn enable_execute_command(&self) -> bool {
        self.enable_execute_command
    }

    pub fn policy(&self, role: RoleKind) -> &[PolicyStatement] {
        match role {
            RoleKind::Execution => &self.execution_policy,
            RoleKind::Task => &self.task_policy,
        }
    }

    /// Rules on the service's own security group (awsvpc mode only)
    pub fn service_ingress(&self) -> &[IngressRule] {
        &self.service_ingress
    }
}

/// Turns a container spec into a registered service
pub struct ServiceWiringEngine<'a, B: ProvisioningBackend + ?Sized> {
    backend: &'a B,
    capacity: Vec<CapacityProviderStrategy>,
    storage: ObjectLocation,
}

impl<'a, B: ProvisioningBackend + ?Sized> ServiceWiringEngine<'a, B> {
    pub fn new(backend: &'a B, storage: ObjectLocation) -> Self {
        Self {
            backend,
            capacity: vec![CapacityProviderStrategy::default()],
            storage,
        }
    }

    /// Capacity provider strategies; an empty list keeps the default
    pub fn with_capacity(mut self, capacity: Vec<CapacityProviderStrategy>) -> Self {
        if !capacity.is_empty() {
            self.capacity = capacity;
        }
        self
    }

    pub async fn wire(
        &self,
        cluster: &ExternalReference,
        network: &ExternalReference,
        namespace: &DiscoveryNamespace,
        spec: ContainerSpec,
        desired_count: u32,
    ) -> Result<ServiceDescriptor, WiringError> {
        let unavailable = |err: BackendError| WiringError::DiscoveryUnavailable {
            namespace: namespace.id.id().to_string(),
            reason: err.to_string(),
        };

        self.backend
            .lookup_namespace(namespace)
            .await
            .map_err(unavailable)?;

        let service_ingress = match spec.network_mode() {
            NetworkMode::Awsvpc => spec
                .port_bindings()
                .iter()
                .map(|binding| IngressRule {
                    source_cidr: any_ipv4(),
                    port: binding.container_port,
                    protocol: binding.protocol,
                    description: format!(
                        "{}: container {} {}/{}",
                        topology::SERVICE_NAME,
                        binding.name,
                        binding.protocol,
                        binding.container_port
                    ),
                })
                .collect(),
            NetworkMode::Host => Vec::new(),
        };

        let discovery = DiscoveryRegistration {
            name: topology::DISCOVERY_NAME.to_string(),
            namespace_id: namespace.id.id().to_string(),
            namespace_name: namespace.name.id().to_string(),
            record_type: DnsRecordType::A,
            fqdn: namespace.fqdn(topology::DISCOVERY_NAME),
        };

        let descriptor = ServiceDescriptor {
            name: topology::SERVICE_NAME.to_string(),
            cluster: cluster.clone(),
            network: network.clone(),
            execution_policy: vec![log_statement(&spec)],
            task_policy: storage_statements(&self.storage),
            container: spec,
            placement: PLACEMENT.to_vec(),
            capacity: self.capacity.clone(),
            desired_count,
            discovery,
            enable_execute_command: true,
            service_ingress,
        };

        self.backend
            .register_service(&descriptor)
            .await
            .map_err(|err| match err {
                BackendError::NotFound(_) => unavailable(err),
                other => WiringError::Registration(other.to_string()),
            })?;

        self.grant_all(&descriptor).await?;

        if desired_count == 0 {
            info!(
                "Service {} registered as {} but not scheduled (desired count 0)",
                descriptor.name, descriptor.discovery.fqdn
            );
        } else {
            info!(
                "Service {} registered as {} with {} task(s)",
                descriptor.name, descriptor.discovery.fqdn, desired_count
            );
        }
        Ok(descriptor)
    }

    async fn grant_all(&self, descriptor: &ServiceDescriptor) -> Result<(), WiringError> {
        for role in [RoleKind::Execution, RoleKind::Task] {
            for statement in descriptor.policy(role) {
                self.backend
                    .grant(&descriptor.name, role, statement)
                    .await
                    .map_err(|err| WiringError::PermissionGrant {
                        role,
                        reason: err.to_string(),
                    })?;
                debug!("Granted {:?} to {} role", statement.actions, role);
            }
        }
        Ok(())
    }
}

fn log_statement(spec: &ContainerSpec) -> PolicyStatement {
    PolicyStatement::allow(
        ["logs:CreateLogStream", "logs:PutLogEvents"],
        [format!("arn:aws:logs:*:*:log-group:{}:*", spec.logging().group)],
    )
}

fn storage_statements(storage: &ObjectLocation) -> Vec<PolicyStatement> {
    vec![
        PolicyStatement::allow(["s3:ListBucket"], [storage.bucket_arn()]),
        PolicyStatement::allow(["s3:GetObject", "s3:PutObject"], [storage.prefix_arn()]),
    ]
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::{BackendResult, IngressOutcome};
    use crate::container::ContainerSpecBuilder;
    use crate::exposure::{Listener, TargetGroup};
    use crate::reference::tests::raw_refs;
    use crate::reference::{ReferenceResolver, ResolvedReferences};
    use crate::registry::InMemoryBackend;
    use crate::secret::VpnSecrets;
    use wg_admin_api::{CapacityProvider, PortBinding, Protocol};

    pub(crate) fn references() -> ResolvedReferences {
        ReferenceResolver::resolve(&raw_refs()).unwrap()
    }

    pub(crate) fn spec(ports: Vec<PortBinding>, mode: NetworkMode) -> ContainerSpec {
        ContainerSpecBuilder::new(topology::IMAGE)
            .network_mode(mode)
            .build(
                &VpnSecrets::new("vpn.example.com", "secret"),
                &topology::config_location(),
                ports,
            )
            .unwrap()
    }

    pub(crate) async fn wired(
        backend: &InMemoryBackend,
        ports: Vec<PortBinding>,
    ) -> ServiceDescriptor {
        let refs = references();
        ServiceWiringEngine::new(backend, topology::config_location())
            .wire(
                refs.cluster(),
                refs.network(),
                refs.namespace(),
                spec(ports, NetworkMode::Host),
                0,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_wire_unscheduled_service() {
        let refs = references();
        let backend = InMemoryBackend::for_references(&refs);
        let service = wired(&backend, topology::port_bindings()).await;

        assert_eq!(service.name(), "WgAdminService");
        assert_eq!(service.desired_count(), 0);
        assert_eq!(service.discovery().name, "wg-admin");
        assert_eq!(service.discovery().fqdn, "wg-admin.tqsft.local");
        assert_eq!(service.discovery().record_type, DnsRecordType::A);
        assert_eq!(service.placement(), &PLACEMENT);
        assert_eq!(service.capacity(), &[CapacityProviderStrategy::default()]);
        assert!(service.enable_execute_command());
        assert!(service.service_ingress().is_empty());
        assert_eq!(service.cluster(), refs.cluster());

        assert_eq!(backend.service("WgAdminService").await, Some(service));
    }

    #[tokio::test]
    async fn test_grants_are_scoped() {
        let backend = InMemoryBackend::for_references(&references());
        wired(&backend, topology::port_bindings()).await;

        let execution = backend.grants("WgAdminService", RoleKind::Execution).await;
        assert_eq!(execution.len(), 1);
        assert_eq!(
            execution[0].actions,
            vec!["logs:CreateLogStream", "logs:PutLogEvents"]
        );
        assert_eq!(
            execution[0].resources,
            vec!["arn:aws:logs:*:*:log-group:/ecs/tqsft-services:*"]
        );

        let task = backend.grants("WgAdminService", RoleKind::Task).await;
        assert_eq!(task.len(), 2);
        let bucket = topology::config_location().bucket_arn();
        assert!(task.iter().all(|statement| !statement.escapes(&bucket)));
        assert_eq!(task[0].resources, vec!["arn:aws:s3:::ecs-clusters-space"]);
        assert_eq!(task[1].actions, vec!["s3:GetObject", "s3:PutObject"]);
        assert_eq!(
            task[1].resources,
            vec!["arn:aws:s3:::ecs-clusters-space/WgAdmin/*"]
        );
    }

    #[tokio::test]
    async fn test_unreachable_namespace_aborts() {
        let refs = references();
        let backend = InMemoryBackend::new();

        let result = ServiceWiringEngine::new(&backend, topology::config_location())
            .wire(
                refs.cluster(),
                refs.network(),
                refs.namespace(),
                spec(topology::port_bindings(), NetworkMode::Host),
                1,
            )
            .await;

        assert!(matches!(
            result,
            Err(WiringError::DiscoveryUnavailable { ref namespace, .. }) if namespace == "ns-abc123"
        ));
        assert_eq!(backend.resource_count().await, 0);

        backend.add_namespace("ns-abc123").await;
        let service = ServiceWiringEngine::new(&backend, topology::config_location())
            .wire(
                refs.cluster(),
                refs.network(),
                refs.namespace(),
                spec(topology::port_bindings(), NetworkMode::Host),
                1,
            )
            .await
            .unwrap();
        assert_eq!(service.desired_count(), 1);
    }

    #[tokio::test]
    async fn test_awsvpc_opens_service_ports() {
        let refs = references();
        let backend = InMemoryBackend::for_references(&refs);

        let service = ServiceWiringEngine::new(&backend, topology::config_location())
            .with_capacity(vec![CapacityProviderStrategy {
                capacity_provider: CapacityProvider::Bottlerocket,
                weight: 2,
                base: 0,
            }])
            .wire(
                refs.cluster(),
                refs.network(),
                refs.namespace(),
                spec(topology::port_bindings(), NetworkMode::Awsvpc),
                0,
            )
            .await
            .unwrap();

        let ports: Vec<_> = service
            .service_ingress()
            .iter()
            .map(|rule| (rule.port, rule.protocol, rule.source_cidr.to_string()))
            .collect();
        assert_eq!(
            ports,
            vec![
                (51821, Protocol::Tcp, "0.0.0.0/0".to_string()),
                (10443, Protocol::Udp, "0.0.0.0/0".to_string()),
            ]
        );
        assert_eq!(
            service.capacity()[0].capacity_provider,
            CapacityProvider::Bottlerocket
        );
    }

    /// Accepts everything except service registration
    struct RegistrationDown(InMemoryBackend);

    #[async_trait::async_trait]
    impl ProvisioningBackend for RegistrationDown {
        async fn lookup_namespace(&self, namespace: &DiscoveryNamespace) -> BackendResult<()> {
            self.0.lookup_namespace(namespace).await
        }

        async fn grant(
            &self,
            service: &str,
            role: RoleKind,
            statement: &PolicyStatement,
        ) -> BackendResult<()> {
            self.0.grant(service, role, statement).await
        }

        async fn register_service(&self, _service: &ServiceDescriptor) -> BackendResult<()> {
            Err(BackendError::Unavailable("service registry throttled".to_string()))
        }

        async fn find_listener(
            &self,
            load_balancer: &ExternalReference,
            port: u16,
            protocol: Protocol,
        ) -> BackendResult<Option<Listener>> {
            self.0.find_listener(load_balancer, port, protocol).await
        }

        async fn find_target_group(&self, name: &str) -> BackendResult<Option<TargetGroup>> {
            self.0.find_target_group(name).await
        }

        async fn ensure_target_group(
            &self,
            network: &ExternalReference,
            target_group: &TargetGroup,
        ) -> BackendResult<()> {
            self.0.ensure_target_group(network, target_group).await
        }

        async fn ensure_listener(
            &self,
            load_balancer: &ExternalReference,
            listener: &Listener,
        ) -> BackendResult<()> {
            self.0.ensure_listener(load_balancer, listener).await
        }

        async fn ensure_ingress_rule(
            &self,
            security_group: &ExternalReference,
            rule: &IngressRule,
        ) -> BackendResult<IngressOutcome> {
            self.0.ensure_ingress_rule(security_group, rule).await
        }
    }

    #[tokio::test]
    async fn test_failed_registration_grants_nothing() {
        let refs = references();
        let inner = InMemoryBackend::for_references(&refs);
        let backend = RegistrationDown(inner.clone());

        let result = ServiceWiringEngine::new(&backend, topology::config_location())
            .wire(
                refs.cluster(),
                refs.network(),
                refs.namespace(),
                spec(topology::port_bindings(), NetworkMode::Host),
                1,
            )
            .await;

        assert!(matches!(result, Err(WiringError::Registration(_))));
        assert!(inner.grants("WgAdminService", RoleKind::Execution).await.is_empty());
        assert!(inner.grants("WgAdminService", RoleKind::Task).await.is_empty());
        assert_eq!(inner.resource_count().await, 0);
    }

    #[tokio::test]
    async fn test_rewiring_is_idempotent() {
        let backend = InMemoryBackend::for_references(&references());
        let first = wired(&backend, topology::port_bindings()).await;
        let count = backend.resource_count().await;

        let second = wired(&backend, topology::port_bindings()).await;
        assert_eq!(first, second);
        assert_eq!(backend.resource_count().await, count);
    }
}
