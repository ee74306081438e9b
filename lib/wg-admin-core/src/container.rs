//! Definition of the privileged VPN container

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;
use wg_admin_api::{Capability, LogConfiguration, NetworkMode, ObjectLocation, PortBinding, Protocol};

use crate::error::ContainerSpecError;
use crate::secret::{AdminPassword, VpnSecrets};
use crate::topology;

/// Capabilities WireGuard needs to create its interface and NAT rules
pub const REQUIRED_CAPABILITIES: [Capability; 2] = [Capability::NetAdmin, Capability::SysModule];

/// Kernel parameters set on every VPN container
pub const REQUIRED_SYSTEM_CONTROLS: [(&str, &str); 3] = [
    ("net.ipv4.ip_forward", "1"),
    ("net.ipv4.conf.all.proxy_arp", "1"),
    ("net.ipv4.conf.all.src_valid_mark", "1"),
];

/// Value of a container environment variable
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnvValue {
    Plain(String),
    Secret(AdminPassword),
}

impl EnvValue {
    /// The value as the backend must receive it
    pub fn expose(&self) -> &str {
        match self {
            EnvValue::Plain(value) => value,
            EnvValue::Secret(secret) => secret.expose(),
        }
    }
}

impl Serialize for EnvValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EnvValue::Plain(value) => serializer.serialize_str(value),
            EnvValue::Secret(secret) => secret.serialize(serializer),
        }
    }
}

/// A validated container definition. Only [`ContainerSpecBuilder`] creates one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    name: String,
    image: String,
    cpu: u32,
    memory_mib: u32,
    port_bindings: Vec<PortBinding>,
    capabilities: BTreeSet<Capability>,
    system_controls: BTreeMap<String, String>,
    environment: BTreeMap<String, EnvValue>,
    privileged: bool,
    network_mode: NetworkMode,
    logging: LogConfiguration,
}

impl ContainerSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn cpu(&self) -> u32 {
        self.cpu
    }

    pub fn memory_mib(&self) -> u32 {
        self.memory_mib
    }

    pub fn port_bindings(&self) -> &[PortBinding] {
        &self.port_bindings
    }

    pub fn binding(&self, port: u16, protocol: Protocol) -> Option<&PortBinding> {
        self.port_bindings
            .iter()
            .find(|binding| binding.key() == (port, protocol))
    }

    /// Every binding on `port`, whatever its protocol
    pub fn bindings_on(&self, port: u16) -> impl Iterator<Item = &PortBinding> {
        self.port_bindings
            .iter()
            .filter(move |binding| binding.container_port == port)
    }

    /// First UDP binding; the builder guarantees there is one
    pub fn data_plane_port(&self) -> Option<&PortBinding> {
        self.port_bindings
            .iter()
            .find(|binding| binding.protocol == Protocol::Udp)
    }

    pub fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }

    pub fn system_controls(&self) -> &BTreeMap<String, String> {
        &self.system_controls
    }

    pub fn environment(&self) -> &BTreeMap<String, EnvValue> {
        &self.environment
    }

    pub fn privileged(&self) -> bool {
        self.privileged
    }

    pub fn network_mode(&self) -> NetworkMode {
        self.network_mode
    }

    pub fn logging(&self) -> &LogConfiguration {
        &self.logging
    }
}

/// Builds the VPN container definition.
///
/// Sizing, name and log routing default to the deployment conventions in
/// [`topology`]; only the image is mandatory.
#[derive(Clone, Debug)]
pub struct ContainerSpecBuilder {
    name: String,
    image: String,
    cpu: u32,
    memory_mib: u32,
    network_mode: NetworkMode,
    logging: LogConfiguration,
}

impl ContainerSpecBuilder {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            name: topology::CONTAINER_NAME.to_string(),
            image: image.into(),
            cpu: topology::CPU_UNITS,
            memory_mib: topology::MEMORY_MIB,
            network_mode: NetworkMode::default(),
            logging: LogConfiguration::default(),
        }
    }

    pub fn network_mode(mut self, network_mode: NetworkMode) -> Self {
        self.network_mode = network_mode;
        self
    }

    pub fn logging(mut self, logging: LogConfiguration) -> Self {
        self.logging = logging;
        self
    }

    pub fn build(
        self,
        secrets: &VpnSecrets,
        storage: &ObjectLocation,
        ports: Vec<PortBinding>,
    ) -> Result<ContainerSpec, ContainerSpecError> {
        if self.image.trim().is_empty() {
            return Err(ContainerSpecError::EmptyImage);
        }
        if secrets.host.trim().is_empty() {
            return Err(ContainerSpecError::MissingParameter("host"));
        }
        if secrets.password.is_empty() {
            return Err(ContainerSpecError::MissingParameter("password"));
        }

        validate_ports(&ports)?;
        let data_port = ports
            .iter()
            .find(|binding| binding.protocol == Protocol::Udp)
            .map(|binding| binding.container_port)
            .ok_or(ContainerSpecError::MissingDataPlanePort)?;

        let capabilities = REQUIRED_CAPABILITIES.into_iter().collect();
        let system_controls = REQUIRED_SYSTEM_CONTROLS
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();

        let mut environment = BTreeMap::new();
        environment.insert("WG_HOST".to_string(), EnvValue::Plain(secrets.host.clone()));
        environment.insert(
            "PASSWORD".to_string(),
            EnvValue::Secret(secrets.password.clone()),
        );
        environment.insert("WG_S3_CONFIG".to_string(), EnvValue::Plain(storage.url()));
        environment.insert("WG_PORT".to_string(), EnvValue::Plain(data_port.to_string()));

        debug!(
            "Built container spec {} ({}) with {} port bindings",
            self.name,
            self.image,
            ports.len()
        );

        Ok(ContainerSpec {
            name: self.name,
            image: self.image,
            cpu: self.cpu,
            memory_mib: self.memory_mib,
            port_bindings: ports,
            capabilities,
            system_controls,
            environment,
            privileged: true,
            network_mode: self.network_mode,
            logging: self.logging,
        })
    }
}

fn validate_ports(ports: &[PortBinding]) -> Result<(), ContainerSpecError> {
    let mut keys = HashSet::new();
    let mut names = HashSet::new();

    for binding in ports {
        if binding.host_port != binding.container_port {
            return Err(ContainerSpecError::HostPortMismatch {
                name: binding.name.clone(),
                container_port: binding.container_port,
                host_port: binding.host_port,
            });
        }
        if !keys.insert(binding.key()) {
            return Err(ContainerSpecError::DuplicatePortBinding {
                port: binding.container_port,
                protocol: binding.protocol,
            });
        }
        if !names.insert(binding.name.as_str()) {
            return Err(ContainerSpecError::DuplicatePortName(binding.name.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets() -> VpnSecrets {
        VpnSecrets::new("vpn.example.com", "secret")
    }

    fn build(ports: Vec<PortBinding>) -> Result<ContainerSpec, ContainerSpecError> {
        ContainerSpecBuilder::new(topology::IMAGE).build(
            &secrets(),
            &topology::config_location(),
            ports,
        )
    }

    fn assert_vpn_invariants(spec: &ContainerSpec) {
        for capability in REQUIRED_CAPABILITIES {
            assert!(spec.capabilities().contains(&capability));
        }
        for (name, value) in REQUIRED_SYSTEM_CONTROLS {
            assert_eq!(spec.system_controls().get(name).map(String::as_str), Some(value));
        }
        assert!(spec.privileged());
    }

    #[test]
    fn test_default_spec() {
        let spec = build(topology::port_bindings()).unwrap();
        assert_vpn_invariants(&spec);
        assert_eq!(spec.name(), "WgAdmin");
        assert_eq!(spec.cpu(), 256);
        assert_eq!(spec.memory_mib(), 512);
        assert_eq!(spec.port_bindings().len(), 2);
        assert_eq!(spec.data_plane_port().map(|b| b.container_port), Some(10443));
        assert_eq!(spec.logging().stream_prefix, "WgAdminLogs");
    }

    #[test]
    fn test_environment() {
        let spec = build(topology::port_bindings()).unwrap();
        let env = spec.environment();
        assert_eq!(env["WG_HOST"].expose(), "vpn.example.com");
        assert_eq!(env["PASSWORD"].expose(), "secret");
        assert_eq!(env["WG_S3_CONFIG"].expose(), "s3://ecs-clusters-space/WgAdmin/wg0.json");
        assert_eq!(env["WG_PORT"].expose(), "10443");

        let json = serde_json::to_string(&spec).unwrap();
        assert!(!json.contains("\"secret\""));
    }

    #[test]
    fn test_invariants_hold_for_any_port_set() {
        let port_sets = vec![
            vec![PortBinding::udp("vpn", 51820)],
            vec![PortBinding::udp("vpn", 10443), PortBinding::tcp("vpn-tcp", 10443)],
            vec![
                PortBinding::tcp("web", 80),
                PortBinding::tcp("api", 8443),
                PortBinding::udp("vpn", 443),
            ],
        ];
        for ports in port_sets {
            let spec = build(ports).unwrap();
            assert_vpn_invariants(&spec);
        }
    }

    #[test]
    fn test_rejects_host_port_mismatch() {
        let mut binding = PortBinding::udp("vpn", 10443);
        binding.host_port = 20443;
        assert!(matches!(
            build(vec![binding]),
            Err(ContainerSpecError::HostPortMismatch { host_port: 20443, .. })
        ));
    }

    #[test]
    fn test_rejects_duplicates() {
        assert_eq!(
            build(vec![PortBinding::udp("a", 10443), PortBinding::udp("b", 10443)]),
            Err(ContainerSpecError::DuplicatePortBinding {
                port: 10443,
                protocol: Protocol::Udp
            })
        );
        assert_eq!(
            build(vec![PortBinding::udp("a", 10443), PortBinding::tcp("a", 51821)]),
            Err(ContainerSpecError::DuplicatePortName("a".to_string()))
        );
    }

    #[test]
    fn test_requires_udp_port_and_parameters() {
        assert_eq!(
            build(vec![PortBinding::tcp("web", 51821)]),
            Err(ContainerSpecError::MissingDataPlanePort)
        );

        let result = ContainerSpecBuilder::new(topology::IMAGE).build(
            &VpnSecrets::new("", "secret"),
            &topology::config_location(),
            topology::port_bindings(),
        );
        assert_eq!(result, Err(ContainerSpecError::MissingParameter("host")));

        let result = ContainerSpecBuilder::new(topology::IMAGE).build(
            &VpnSecrets::new("vpn.example.com", ""),
            &topology::config_location(),
            topology::port_bindings(),
        );
        assert_eq!(result, Err(ContainerSpecError::MissingParameter("password")));

        let result = ContainerSpecBuilder::new(" ").build(
            &secrets(),
            &topology::config_location(),
            topology::port_bindings(),
        );
        assert_eq!(result, Err(ContainerSpecError::EmptyImage));
    }
}
