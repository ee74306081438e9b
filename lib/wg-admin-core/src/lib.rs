//! Topology compiler for the WireGuard admin service
//!
//! This library expands a handful of imported handles and deployment
//! parameters into a fully wired service:
//! - ReferenceResolver: binds imported identifiers to typed references
//! - ContainerSpecBuilder: the privileged VPN container definition
//! - ServiceWiringEngine: placement, discovery registration and role grants
//! - NetworkExposureBinder: listeners, target groups, health checks and ingress
//! - TopologyCompiler: runs the four stages in order against a backend

pub mod backend;
pub mod compiler;
pub mod container;
pub mod error;
pub mod exposure;
pub mod reference;
pub mod registry;
pub mod secret;
pub mod topology;
pub mod wiring;

pub use backend::{BackendError, IngressOutcome, ProvisioningBackend};
pub use compiler::{CompiledTopology, DeploymentParameters, TopologyCompiler, TopologySettings};
pub use container::{ContainerSpec, ContainerSpecBuilder, EnvValue};
pub use error::{
    CompileError, ContainerSpecError, ExposureError, ResolutionError, Result, Stage, WiringError,
};
pub use exposure::{
    ExposurePlan, Listener, NetworkExposureBinder, PlannedExposure, TargetGroup, TargetRef,
};
pub use reference::{DiscoveryNamespace, ExternalReference, ReferenceResolver, ResolvedReferences};
pub use registry::InMemoryBackend;
pub use secret::{AdminPassword, VpnSecrets};
pub use wiring::{DiscoveryRegistration, ServiceDescriptor, ServiceWiringEngine};
