//! In-memory provisioning backend used for dry runs and tests

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use wg_admin_api::{IngressRule, PolicyStatement, Protocol, RoleKind};

use crate::backend::{BackendError, BackendResult, IngressOutcome, ProvisioningBackend};
use crate::exposure::{Listener, TargetGroup};
use crate::reference::{DiscoveryNamespace, ExternalReference, ResolvedReferences};
use crate::wiring::ServiceDescriptor;

#[derive(Default)]
struct State {
    // Externally owned handles that exist before the composition runs
    namespaces: HashSet<String>,
    networks: HashSet<String>,
    load_balancers: HashSet<String>,
    security_groups: HashSet<String>,

    grants: BTreeMap<(String, RoleKind), Vec<PolicyStatement>>,
    services: HashMap<String, ServiceDescriptor>,
    target_groups: HashMap<String, TargetGroup>,
    // (load balancer, port, protocol)
    listeners: HashMap<(String, u16, Protocol), Listener>,
    // security group -> rules, in insertion order
    ingress: HashMap<String, Vec<IngressRule>>,
}

/// InMemoryBackend keeps every provisioned record behind a lock
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<RwLock<State>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend where every imported handle of `refs` exists
    pub fn for_references(refs: &ResolvedReferences) -> Self {
        let state = State {
            namespaces: HashSet::from([refs.namespace().id.id().to_string()]),
            networks: HashSet::from([refs.network().id().to_string()]),
            load_balancers: HashSet::from([refs.load_balancer().id().to_string()]),
            security_groups: HashSet::from([refs
                .load_balancer_security_group()
                .id()
                .to_string()]),
            ..Default::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub async fn add_namespace(&self, id: impl Into<String>) {
        self.state.write().await.namespaces.insert(id.into());
    }

    pub async fn add_network(&self, id: impl Into<String>) {
        self.state.write().await.networks.insert(id.into());
    }

    pub async fn add_load_balancer(&self, arn: impl Into<String>) {
        self.state.write().await.load_balancers.insert(arn.into());
    }

    pub async fn add_security_group(&self, id: impl Into<String>) {
        self.state.write().await.security_groups.insert(id.into());
    }

    /// Register a listener owned by some other service
    pub async fn add_foreign_listener(&self, load_balancer: &str, listener: Listener) {
        let key = (load_balancer.to_string(), listener.port, listener.protocol);
        self.state.write().await.listeners.insert(key, listener);
    }

    /// Register an ingress rule owned by some other service
    pub async fn add_foreign_ingress(&self, security_group: &str, rule: IngressRule) {
        self.state
            .write()
            .await
            .ingress
            .entry(security_group.to_string())
            .or_default()
            .push(rule);
    }

    pub async fn service(&self, name: &str) -> Option<ServiceDescriptor> {
        self.state.read().await.services.get(name).cloned()
    }

    pub async fn grants(&self, service: &str, role: RoleKind) -> Vec<PolicyStatement> {
        self.state
            .read()
            .await
            .grants
            .get(&(service.to_string(), role))
            .cloned()
            .unwrap_or_default()
    }

    pub async fn listeners(&self) -> Vec<Listener> {
        let state = self.state.read().await;
        let mut listeners: Vec<Listener> = state.listeners.values().cloned().collect();
        listeners.sort_by_key(|listener| (listener.port, listener.protocol));
        listeners
    }

    pub async fn target_groups(&self) -> Vec<TargetGroup> {
        let state = self.state.read().await;
        let mut groups: Vec<TargetGroup> = state.target_groups.values().cloned().collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        groups
    }

    pub async fn ingress_rules(&self, security_group: &str) -> Vec<IngressRule> {
        self.state
            .read()
            .await
            .ingress
            .get(security_group)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop every ingress entry tagged `description`, as another service
    /// withdrawing its exposure would. Returns the number of entries removed.
    pub async fn revoke_ingress(&self, security_group: &str, description: &str) -> usize {
        let mut state = self.state.write().await;
        match state.ingress.get_mut(security_group) {
            Some(rules) => {
                let before = rules.len();
                rules.retain(|rule| rule.description != description);
                before - rules.len()
            }
            None => 0,
        }
    }

    /// True while at least one owner keeps the permission of `rule` open
    pub async fn permits(&self, security_group: &str, rule: &IngressRule) -> bool {
        self.state
            .read()
            .await
            .ingress
            .get(security_group)
            .map(|rules| rules.iter().any(|r| r.permission() == rule.permission()))
            .unwrap_or(false)
    }

    /// Number of records created through the backend operations
    pub async fn resource_count(&self) -> usize {
        let state = self.state.read().await;
        state.grants.values().map(Vec::len).sum::<usize>()
            + state.services.len()
            + state.target_groups.len()
            + state.listeners.len()
            + state.ingress.values().map(Vec::len).sum::<usize>()
    }
}

#[async_trait]
impl ProvisioningBackend for InMemoryBackend {
    async fn lookup_namespace(&self, namespace: &DiscoveryNamespace) -> BackendResult<()> {
        let state = self.state.read().await;
        if state.namespaces.contains(namespace.id.id()) {
            Ok(())
        } else {
            Err(BackendError::NotFound(format!(
                "namespace {}",
                namespace.id.id()
            )))
        }
    }

    async fn grant(
        &self,
        service: &str,
        role: RoleKind,
        statement: &PolicyStatement,
    ) -> BackendResult<()> {
        let mut state = self.state.write().await;
        let statements = state
            .grants
            .entry((service.to_string(), role))
            .or_default();
        if !statements.contains(statement) {
            statements.push(statement.clone());
        }
        Ok(())
    }

    async fn register_service(&self, service: &ServiceDescriptor) -> BackendResult<()> {
        let mut state = self.state.write().await;
        let namespace = &service.discovery().namespace_id;
        if !state.namespaces.contains(namespace) {
            return Err(BackendError::NotFound(format!("namespace {}", namespace)));
        }
        state
            .services
            .insert(service.name().to_string(), service.clone());
        debug!("Registered service: {}", service.name());
        Ok(())
    }

    async fn find_listener(
        &self,
        load_balancer: &ExternalReference,
        port: u16,
        protocol: Protocol,
    ) -> BackendResult<Option<Listener>> {
        let state = self.state.read().await;
        if !state.load_balancers.contains(load_balancer.id()) {
            return Err(BackendError::NotFound(format!(
                "load balancer {}",
                load_balancer.id()
            )));
        }
        Ok(state
            .listeners
            .get(&(load_balancer.id().to_string(), port, protocol))
            .cloned())
    }

    async fn find_target_group(&self, name: &str) -> BackendResult<Option<TargetGroup>> {
        Ok(self.state.read().await.target_groups.get(name).cloned())
    }

    async fn ensure_target_group(
        &self,
        network: &ExternalReference,
        target_group: &TargetGroup,
    ) -> BackendResult<()> {
        let mut state = self.state.write().await;
        if !state.networks.contains(network.id()) {
            return Err(BackendError::NotFound(format!("network {}", network.id())));
        }
        match state.target_groups.get(&target_group.name) {
            Some(existing) if existing == target_group => Ok(()),
            Some(_) => Err(BackendError::Conflict(format!(
                "target group {}",
                target_group.name
            ))),
            None => {
                state
                    .target_groups
                    .insert(target_group.name.clone(), target_group.clone());
                debug!("Created target group: {}", target_group.name);
                Ok(())
            }
        }
    }

    async fn ensure_listener(
        &self,
        load_balancer: &ExternalReference,
        listener: &Listener,
    ) -> BackendResult<()> {
        let mut state = self.state.write().await;
        if !state.load_balancers.contains(load_balancer.id()) {
            return Err(BackendError::NotFound(format!(
                "load balancer {}",
                load_balancer.id()
            )));
        }
        if !state.target_groups.contains_key(&listener.target_group) {
            return Err(BackendError::NotFound(format!(
                "target group {}",
                listener.target_group
            )));
        }

        let key = (
            load_balancer.id().to_string(),
            listener.port,
            listener.protocol,
        );
        match state.listeners.get(&key) {
            Some(existing) if existing == listener => Ok(()),
            Some(existing) => Err(BackendError::Conflict(format!(
                "listener {}/{} forwards to {}",
                listener.protocol, listener.port, existing.target_group
            ))),
            None => {
                state.listeners.insert(key, listener.clone());
                debug!("Created listener: {}/{}", listener.protocol, listener.port);
                Ok(())
            }
        }
    }

    async fn ensure_ingress_rule(
        &self,
        security_group: &ExternalReference,
        rule: &IngressRule,
    ) -> BackendResult<IngressOutcome> {
        let mut state = self.state.write().await;
        if !state.security_groups.contains(security_group.id()) {
            return Err(BackendError::NotFound(format!(
                "security group {}",
                security_group.id()
            )));
        }

        let rules = state
            .ingress
            .entry(security_group.id().to_string())
            .or_default();
        if rules.contains(rule) {
            return Ok(IngressOutcome::AlreadyPresent);
        }
        let outcome = match rules.iter().find(|r| r.permission() == rule.permission()) {
            Some(owner) => IngressOutcome::SharedWith(owner.description.clone()),
            None => IngressOutcome::Created,
        };
        rules.push(rule.clone());
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exposure::TargetRef;
    use crate::wiring::tests::references;
    use wg_admin_api::{any_ipv4, HealthCheck};

    fn target_group(name: &str, port: u16) -> TargetGroup {
        TargetGroup {
            name: name.to_string(),
            protocol: Protocol::Tcp,
            port,
            target: TargetRef {
                container_name: "WgAdmin".to_string(),
                container_port: 51821,
                protocol: Protocol::Tcp,
            },
            health_check: HealthCheck::tcp(51821),
        }
    }

    fn ingress(port: u16, description: &str) -> IngressRule {
        IngressRule {
            source_cidr: any_ipv4(),
            port,
            protocol: Protocol::Tcp,
            description: description.to_string(),
        }
    }

    #[tokio::test]
    async fn test_target_groups_are_idempotent() {
        let refs = references();
        let backend = InMemoryBackend::for_references(&refs);
        let group = target_group("web", 8080);

        backend.ensure_target_group(refs.network(), &group).await.unwrap();
        backend.ensure_target_group(refs.network(), &group).await.unwrap();
        assert_eq!(backend.target_groups().await, vec![group]);

        let changed = target_group("web", 9090);
        assert!(matches!(
            backend.ensure_target_group(refs.network(), &changed).await,
            Err(BackendError::Conflict(_))
        ));
        assert_eq!(backend.resource_count().await, 1);
    }

    #[tokio::test]
    async fn test_listener_needs_its_target_group() {
        let refs = references();
        let backend = InMemoryBackend::for_references(&refs);
        let listener = Listener {
            port: 8080,
            protocol: Protocol::Tcp,
            target_group: "web".to_string(),
        };

        assert!(matches!(
            backend.ensure_listener(refs.load_balancer(), &listener).await,
            Err(BackendError::NotFound(_))
        ));

        backend
            .ensure_target_group(refs.network(), &target_group("web", 8080))
            .await
            .unwrap();
        backend.ensure_listener(refs.load_balancer(), &listener).await.unwrap();
        backend.ensure_listener(refs.load_balancer(), &listener).await.unwrap();
        assert_eq!(backend.listeners().await, vec![listener.clone()]);

        let hijack = Listener {
            target_group: "other".to_string(),
            ..listener
        };
        backend
            .ensure_target_group(refs.network(), &target_group("other", 8080))
            .await
            .unwrap();
        assert!(matches!(
            backend.ensure_listener(refs.load_balancer(), &hijack).await,
            Err(BackendError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_ingress_outcomes() {
        let refs = references();
        let backend = InMemoryBackend::for_references(&refs);
        let sg = refs.load_balancer_security_group();

        let outcome = backend.ensure_ingress_rule(sg, &ingress(8080, "a")).await.unwrap();
        assert_eq!(outcome, IngressOutcome::Created);

        let outcome = backend.ensure_ingress_rule(sg, &ingress(8080, "a")).await.unwrap();
        assert_eq!(outcome, IngressOutcome::AlreadyPresent);

        let outcome = backend.ensure_ingress_rule(sg, &ingress(8080, "b")).await.unwrap();
        assert_eq!(outcome, IngressOutcome::SharedWith("a".to_string()));

        assert_eq!(
            backend.ingress_rules(sg.id()).await,
            vec![ingress(8080, "a"), ingress(8080, "b")]
        );
    }

    #[tokio::test]
    async fn test_shared_permission_outlives_one_owner() {
        let refs = references();
        let backend = InMemoryBackend::for_references(&refs);
        let sg = refs.load_balancer_security_group();

        backend.ensure_ingress_rule(sg, &ingress(8080, "a")).await.unwrap();
        backend.ensure_ingress_rule(sg, &ingress(8080, "b")).await.unwrap();

        assert_eq!(backend.revoke_ingress(sg.id(), "a").await, 1);
        assert!(backend.permits(sg.id(), &ingress(8080, "a")).await);

        assert_eq!(backend.revoke_ingress(sg.id(), "b").await, 1);
        assert!(!backend.permits(sg.id(), &ingress(8080, "a")).await);
        assert_eq!(backend.revoke_ingress(sg.id(), "b").await, 0);
    }

    #[tokio::test]
    async fn test_unknown_handles() {
        let refs = references();
        let backend = InMemoryBackend::new();

        assert!(matches!(
            backend.lookup_namespace(refs.namespace()).await,
            Err(BackendError::NotFound(_))
        ));
        assert!(matches!(
            backend.find_listener(refs.load_balancer(), 8080, Protocol::Tcp).await,
            Err(BackendError::NotFound(_))
        ));
        assert!(matches!(
            backend
                .ensure_target_group(refs.network(), &target_group("web", 8080))
                .await,
            Err(BackendError::NotFound(_))
        ));
        assert!(matches!(
            backend
                .ensure_ingress_rule(refs.load_balancer_security_group(), &ingress(8080, "a"))
                .await,
            Err(BackendError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_grants_are_deduplicated() {
        let backend = InMemoryBackend::new();
        let statement = PolicyStatement::allow(["s3:ListBucket"], ["arn:aws:s3:::bucket"]);

        backend.grant("svc", RoleKind::Task, &statement).await.unwrap();
        backend.grant("svc", RoleKind::Task, &statement).await.unwrap();

        assert_eq!(backend.grants("svc", RoleKind::Task).await, vec![statement]);
        assert!(backend.grants("svc", RoleKind::Execution).await.is_empty());
    }
}
