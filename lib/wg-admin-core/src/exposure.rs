//! Publishing the service on the shared load balancer

use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};
use wg_admin_api::{ExposureRule, HealthCheck, HttpCodeRange, IngressRule, Protocol};

use crate::backend::{IngressOutcome, ProvisioningBackend};
use crate::container::ContainerSpec;
use crate::error::ExposureError;
use crate::reference::ExternalReference;
use crate::wiring::ServiceDescriptor;

/// Container endpoint a target group forwards to
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    pub container_name: String,
    pub container_port: u16,
    pub protocol: Protocol,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroup {
    pub name: String,
    pub protocol: Protocol,
    /// Port of the group itself, the listener port
    pub port: u16,
    pub target: TargetRef,
    pub health_check: HealthCheck,
}

/// Listener on the shared load balancer, keyed by (port, protocol)
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub port: u16,
    pub protocol: Protocol,
    /// Target group receiving all traffic of the listener
    pub target_group: String,
}

/// One listener, its single target group and the ingress it needs
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedExposure {
    pub listener: Listener,
    pub target_group: TargetGroup,
    pub ingress: IngressRule,
}

/// Validated exposure of one service. Built by [`NetworkExposureBinder::plan`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExposurePlan {
    entries: Vec<PlannedExposure>,
}

impl ExposurePlan {
    pub fn entries(&self) -> &[PlannedExposure] {
        &self.entries
    }

    pub fn listeners(&self) -> impl Iterator<Item = &Listener> {
        self.entries.iter().map(|entry| &entry.listener)
    }

    pub fn target_groups(&self) -> impl Iterator<Item = &TargetGroup> {
        self.entries.iter().map(|entry| &entry.target_group)
    }

    pub fn ingress_rules(&self) -> Vec<IngressRule> {
        self.entries.iter().map(|entry| entry.ingress.clone()).collect()
    }
}

/// Attaches a wired service to the shared load balancer and its security group
pub struct NetworkExposureBinder<'a, B: ProvisioningBackend + ?Sized> {
    backend: &'a B,
}

impl<'a, B: ProvisioningBackend + ?Sized> NetworkExposureBinder<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Validate `rules` against the container of `service_name` and derive
    /// listeners, target groups and ingress rules. Touches nothing, so it can
    /// run before the service is wired.
    pub fn plan(
        &self,
        service_name: &str,
        container: &ContainerSpec,
        rules: &[ExposureRule],
    ) -> Result<ExposurePlan, ExposureError> {
        let mut listener_keys = HashSet::new();
        let mut names = HashSet::new();
        let mut entries = Vec::with_capacity(rules.len());

        for rule in rules {
            let name = &rule.target_group_name;

            if !listener_keys.insert(rule.listener_key()) {
                return Err(ExposureError::DuplicateListener {
                    port: rule.listener_port,
                    protocol: rule.listener_protocol,
                });
            }
            if !names.insert(name.as_str()) {
                return Err(ExposureError::DuplicateTargetGroup(name.clone()));
            }
            if rule.listener_protocol != rule.target_protocol {
                return Err(ExposureError::ListenerProtocolMismatch {
                    target_group: name.clone(),
                    listener: rule.listener_protocol,
                    target: rule.target_protocol,
                });
            }

            let port = rule.target_container_port;
            let binding = match container.binding(port, rule.target_protocol) {
                Some(binding) => binding,
                None => {
                    return Err(match container.bindings_on(port).next() {
                        Some(other) => ExposureError::ProtocolMismatch {
                            target_group: name.clone(),
                            port,
                            requested: rule.target_protocol,
                            declared: other.protocol,
                        },
                        None => ExposureError::UnknownTargetPort {
                            target_group: name.clone(),
                            port,
                        },
                    })
                }
            };

            let health_check = checked_health_check(name, &rule.health_check, container)?;

            entries.push(PlannedExposure {
                listener: Listener {
                    port: rule.listener_port,
                    protocol: rule.listener_protocol,
                    target_group: name.clone(),
                },
                target_group: TargetGroup {
                    name: name.clone(),
                    protocol: rule.target_protocol,
                    port: rule.listener_port,
                    target: TargetRef {
                        container_name: container.name().to_string(),
                        container_port: binding.container_port,
                        protocol: binding.protocol,
                    },
                    health_check,
                },
                ingress: IngressRule {
                    source_cidr: rule.source_cidr,
                    port: rule.listener_port,
                    protocol: rule.listener_protocol,
                    description: format!(
                        "{}: {} {}/{}",
                        service_name,
                        name,
                        rule.listener_protocol,
                        rule.listener_port
                    ),
                },
            });
        }

        debug!(
            "Planned {} listeners for service {}",
            entries.len(),
            service_name
        );
        Ok(ExposurePlan { entries })
    }

    /// Apply a plan. Every listener and target group is checked against the
    /// shared load balancer before the first one is created.
    pub async fn apply(
        &self,
        load_balancer: &ExternalReference,
        security_group: &ExternalReference,
        service: &ServiceDescriptor,
        plan: &ExposurePlan,
    ) -> Result<Vec<IngressRule>, ExposureError> {
        for entry in plan.entries() {
            let listener = &entry.listener;
            if let Some(existing) = self
                .backend
                .find_listener(load_balancer, listener.port, listener.protocol)
                .await?
            {
                if existing.target_group != listener.target_group {
                    return Err(ExposureError::ListenerConflict {
                        port: listener.port,
                        protocol: listener.protocol,
                        owner: existing.target_group,
                    });
                }
            }

            let target_group = &entry.target_group;
            if let Some(existing) = self.backend.find_target_group(&target_group.name).await? {
                if &existing != target_group {
                    return Err(ExposureError::TargetGroupConflict(target_group.name.clone()));
                }
            }
        }

        let mut applied = Vec::with_capacity(plan.entries().len());
        for entry in plan.entries() {
            self.backend
                .ensure_target_group(service.network(), &entry.target_group)
                .await?;
            self.backend
                .ensure_listener(load_balancer, &entry.listener)
                .await?;

            match self
                .backend
                .ensure_ingress_rule(security_group, &entry.ingress)
                .await?
            {
                IngressOutcome::Created => info!("Opened ingress {}", entry.ingress),
                IngressOutcome::AlreadyPresent => debug!("Ingress {} already present", entry.ingress),
                IngressOutcome::SharedWith(owner) => info!(
                    "Ingress {} shares its permission with '{}'",
                    entry.ingress, owner
                ),
            }

            info!(
                "Exposed {} {}/{} -> {}:{}",
                entry.target_group.name,
                entry.listener.protocol,
                entry.listener.port,
                entry.target_group.target.container_name,
                entry.target_group.target.container_port
            );
            applied.push(entry.ingress.clone());
        }

        Ok(applied)
    }

    /// Plan and apply `rules` for `service`
    pub async fn expose(
        &self,
        load_balancer: &ExternalReference,
        security_group: &ExternalReference,
        service: &ServiceDescriptor,
        rules: &[ExposureRule],
    ) -> Result<Vec<IngressRule>, ExposureError> {
        let plan = self.plan(service.name(), service.container(), rules)?;
        self.apply(load_balancer, security_group, service, &plan).await
    }
}

/// The probe must hit a TCP binding of the same container; UDP ports
/// cannot answer HTTP or TCP probes.
fn checked_health_check(
    target_group: &str,
    check: &HealthCheck,
    container: &ContainerSpec,
) -> Result<HealthCheck, ExposureError> {
    let port = check.probe_port;
    if container.bindings_on(port).next().is_none() {
        return Err(ExposureError::HealthCheckTargetMissing {
            target_group: target_group.to_string(),
            port,
        });
    }
    if container.binding(port, check.probe_protocol.transport()).is_none() {
        return Err(ExposureError::UnprobeableHealthCheck {
            target_group: target_group.to_string(),
            port,
        });
    }

    let invalid = |reason: &str| ExposureError::InvalidHealthCheck {
        target_group: target_group.to_string(),
        reason: reason.to_string(),
    };

    let mut check = check.clone();
    if check.probe_protocol.is_http() {
        match check.path.as_deref() {
            Some(path) if path.starts_with('/') => {}
            Some(_) => return Err(invalid("path must start with '/'")),
            None => return Err(invalid("HTTP probes need a path")),
        }
        check.healthy_codes.get_or_insert(HttpCodeRange::SUCCESS);
    } else if check.path.is_some() || check.healthy_codes.is_some() {
        return Err(invalid("path and status codes only apply to HTTP probes"));
    }
    Ok(check)
}
