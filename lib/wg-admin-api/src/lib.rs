//! WireGuard admin topology value types
//!
//! This library defines the plain values shared by every stage of the
//! topology compiler:
//! - ReferenceKind: the externally owned handles the topology binds to
//! - PortBinding: container ports and their transport protocol
//! - ExposureRule / IngressRule: how the service is published on the shared load balancer
//! - PolicyStatement: permissions granted to the task roles
//! - PlacementStrategy / CapacityProviderStrategy: scheduling policy

pub mod container;
pub mod exposure;
pub mod policy;
pub mod port;
pub mod reference;
pub mod service;

pub use container::{Capability, LogConfiguration, NetworkMode, ObjectLocation};
pub use exposure::{
    any_ipv4, ExposureRule, HealthCheck, HttpCodeRange, IngressRule, ParseCodeRangeError,
    ProbeProtocol,
};
pub use policy::{Effect, PolicyStatement, RoleKind};
pub use port::{PortBinding, Protocol};
pub use reference::{ParseReferenceKindError, ReferenceKind};
pub use service::{
    CapacityProvider, CapacityProviderStrategy, DnsRecordType, ParseCapacityProviderError,
    PlacementStrategy,
};
