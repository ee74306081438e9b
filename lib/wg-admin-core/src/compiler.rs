//! Composition of the four stages
//!
//! ```text
//! ReferenceResolver -> ContainerSpecBuilder -> ServiceWiringEngine -> NetworkExposureBinder
//! ```
//!
//! Every stage runs to completion before the next starts and consumes only
//! the outputs of the stages before it. The first failure aborts the whole
//! composition; nothing after the failing stage is attempted.
//!
//! The exposure rules are planned against the container spec before wiring,
//! so an invalid rule set fails without registering or granting anything.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, error, info};
use wg_admin_api::{
    CapacityProviderStrategy, ExposureRule, IngressRule, LogConfiguration, NetworkMode,
    ObjectLocation, PortBinding,
};

use crate::backend::ProvisioningBackend;
use crate::container::{ContainerSpecBuilder, EnvValue};
use crate::error::Result;
use crate::exposure::{ExposurePlan, NetworkExposureBinder};
use crate::reference::{ReferenceResolver, ResolvedReferences};
use crate::secret::VpnSecrets;
use crate::topology;
use crate::wiring::{ServiceDescriptor, ServiceWiringEngine};

/// Deployment-independent shape of the topology
#[derive(Clone, Debug)]
pub struct TopologySettings {
    pub image: String,
    pub network_mode: NetworkMode,
    pub capacity: Vec<CapacityProviderStrategy>,
    pub logging: LogConfiguration,
    pub storage: ObjectLocation,
    pub port_bindings: Vec<PortBinding>,
    pub exposure_rules: Vec<ExposureRule>,
}

impl Default for TopologySettings {
    fn default() -> Self {
        Self {
            image: topology::IMAGE.to_string(),
            network_mode: NetworkMode::default(),
            capacity: vec![CapacityProviderStrategy::default()],
            logging: LogConfiguration::default(),
            storage: topology::config_location(),
            port_bindings: topology::port_bindings(),
            exposure_rules: topology::exposure_rules(),
        }
    }
}

/// Values supplied at deployment time
#[derive(Clone, Debug)]
pub struct DeploymentParameters {
    pub secrets: VpnSecrets,
    pub desired_count: u32,
}

/// Everything one composition produced
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledTopology {
    pub references: ResolvedReferences,
    pub service: ServiceDescriptor,
    pub exposure: ExposurePlan,
    pub ingress_rules: Vec<IngressRule>,
}

impl CompiledTopology {
    /// SHA-256 of the serialized topology; equal inputs give equal digests.
    ///
    /// Secrets serialize as `<redacted>`, so the fingerprint of each secret
    /// environment value is hashed in as well: rotating the password changes
    /// the digest without the digest revealing it.
    pub fn fingerprint(&self) -> std::result::Result<String, serde_json::Error> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(self)?);
        for (name, value) in self.service.container().environment() {
            if let EnvValue::Secret(secret) = value {
                hasher.update(name.as_bytes());
                hasher.update(secret.fingerprint().as_bytes());
            }
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

pub struct TopologyCompiler<'a, B: ProvisioningBackend + ?Sized> {
    backend: &'a B,
    settings: TopologySettings,
}

impl<'a, B: ProvisioningBackend + ?Sized> TopologyCompiler<'a, B> {
    pub fn new(backend: &'a B, settings: TopologySettings) -> Self {
        Self { backend, settings }
    }

    pub async fn compile(
        &self,
        raw_refs: &BTreeMap<String, String>,
        params: &DeploymentParameters,
    ) -> Result<CompiledTopology> {
        let result = self.run(raw_refs, params).await;
        if let Err(err) = &result {
            error!("Composition aborted during {}: {}", err.stage(), err);
        }
        result
    }

    async fn run(
        &self,
        raw_refs: &BTreeMap<String, String>,
        params: &DeploymentParameters,
    ) -> Result<CompiledTopology> {
        let settings = &self.settings;

        let references = ReferenceResolver::resolve(raw_refs)?;
        info!("Resolved references for cluster {}", references.cluster().id());

        let spec = ContainerSpecBuilder::new(settings.image.clone())
            .network_mode(settings.network_mode)
            .logging(settings.logging.clone())
            .build(
                &params.secrets,
                &settings.storage,
                settings.port_bindings.clone(),
            )?;
        info!("Built container spec {}", spec.name());

        let binder = NetworkExposureBinder::new(self.backend);
        let exposure = binder.plan(topology::SERVICE_NAME, &spec, &settings.exposure_rules)?;
        debug!(
            "Exposure plan validated: {} listener(s)",
            exposure.entries().len()
        );

        let service = ServiceWiringEngine::new(self.backend, settings.storage.clone())
            .with_capacity(settings.capacity.clone())
            .wire(
                references.cluster(),
                references.network(),
                references.namespace(),
                spec,
                params.desired_count,
            )
            .await?;

        let ingress_rules = binder
            .apply(
                references.load_balancer(),
                references.load_balancer_security_group(),
                &service,
                &exposure,
            )
            .await?;
        info!(
            "Exposed service {} through {} listener(s)",
            service.name(),
            ingress_rules.len()
        );

        Ok(CompiledTopology {
            references,
            service,
            exposure,
            ingress_rules,
        })
    }
}
