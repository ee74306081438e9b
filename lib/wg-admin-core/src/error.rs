use thiserror::Error;
use wg_admin_api::{Protocol, ReferenceKind, RoleKind};

use crate::backend::BackendError;

pub type Result<T> = std::result::Result<T, CompileError>;

/// Composition stage, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Resolution,
    ContainerSpec,
    Wiring,
    Exposure,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Resolution => "reference resolution",
            Stage::ContainerSpec => "container spec",
            Stage::Wiring => "service wiring",
            Stage::Exposure => "network exposure",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Missing reference: {kind}")]
    MissingReference { kind: ReferenceKind },

    #[error("Invalid reference {kind}: {reason}")]
    InvalidReference { kind: ReferenceKind, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContainerSpecError {
    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Container image must not be empty")]
    EmptyImage,

    #[error("Duplicate port binding {protocol}/{port}")]
    DuplicatePortBinding { port: u16, protocol: Protocol },

    #[error("Duplicate port binding name: {0}")]
    DuplicatePortName(String),

    #[error("Port binding {name}: host port {host_port} must equal container port {container_port}")]
    HostPortMismatch {
        name: String,
        container_port: u16,
        host_port: u16,
    },

    #[error("No UDP port binding for the VPN data plane")]
    MissingDataPlanePort,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WiringError {
    #[error("Discovery namespace {namespace} unavailable: {reason}")]
    DiscoveryUnavailable { namespace: String, reason: String },

    #[error("Could not grant {role} role permissions: {reason}")]
    PermissionGrant { role: RoleKind, reason: String },

    #[error("Service registration failed: {0}")]
    Registration(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExposureError {
    #[error(
        "Target group {target_group}: requested {requested}/{port} but the service declares {declared}/{port}"
    )]
    ProtocolMismatch {
        target_group: String,
        port: u16,
        requested: Protocol,
        declared: Protocol,
    },

    #[error("Target group {target_group}: listener protocol {listener} differs from target protocol {target}")]
    ListenerProtocolMismatch {
        target_group: String,
        listener: Protocol,
        target: Protocol,
    },

    #[error("Target group {target_group}: container port {port} is not bound by the service")]
    UnknownTargetPort { target_group: String, port: u16 },

    #[error("Target group {target_group}: health check port {port} is not bound by the service")]
    HealthCheckTargetMissing { target_group: String, port: u16 },

    #[error("Target group {target_group}: health check port {port} has no TCP binding to probe")]
    UnprobeableHealthCheck { target_group: String, port: u16 },

    #[error("Target group {target_group}: invalid health check: {reason}")]
    InvalidHealthCheck { target_group: String, reason: String },

    #[error("Duplicate listener {protocol}/{port}")]
    DuplicateListener { port: u16, protocol: Protocol },

    #[error("Duplicate target group: {0}")]
    DuplicateTargetGroup(String),

    #[error("Listener {protocol}/{port} already forwards to {owner}")]
    ListenerConflict {
        port: u16,
        protocol: Protocol,
        owner: String,
    },

    #[error("Target group {0} already exists with a different definition")]
    TargetGroupConflict(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Failure of a whole composition, tagged with the stage that aborted it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Container spec error: {0}")]
    ContainerSpec(#[from] ContainerSpecError),

    #[error("Wiring error: {0}")]
    Wiring(#[from] WiringError),

    #[error("Exposure error: {0}")]
    Exposure(#[from] ExposureError),
}

impl CompileError {
    pub fn stage(&self) -> Stage {
        match self {
            CompileError::Resolution(_) => Stage::Resolution,
            CompileError::ContainerSpec(_) => Stage::ContainerSpec,
            CompileError::Wiring(_) => Stage::Wiring,
            CompileError::Exposure(_) => Stage::Exposure,
        }
    }
}

impl From<BackendError> for ExposureError {
    fn from(err: BackendError) -> Self {
        ExposureError::Backend(err.to_string())
    }
}
