//! Container port bindings

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport protocol of a port binding or listener
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("TCP"),
            Protocol::Udp => f.write_str("UDP"),
        }
    }
}

/// A port exposed by the container.
///
/// Host and container ports are always identical in this topology; use
/// [`PortBinding::new`] to get that for free.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortBinding {
    /// Name of the mapping (e.g. "web")
    pub name: String,

    /// Port the process listens on inside the container
    pub container_port: u16,

    /// Port published on the host
    pub host_port: u16,

    /// Transport protocol
    #[serde(default)]
    pub protocol: Protocol,
}

impl PortBinding {
    pub fn new(name: impl Into<String>, port: u16, protocol: Protocol) -> Self {
        Self {
            name: name.into(),
            container_port: port,
            host_port: port,
            protocol,
        }
    }

    pub fn tcp(name: impl Into<String>, port: u16) -> Self {
        Self::new(name, port, Protocol::Tcp)
    }

    pub fn udp(name: impl Into<String>, port: u16) -> Self {
        Self::new(name, port, Protocol::Udp)
    }

    /// Identity of the binding within one container
    pub fn key(&self) -> (u16, Protocol) {
        (self.container_port, self.protocol)
    }
}

impl fmt::Display for PortBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.name, self.protocol, self.container_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_mirrors_host_port() {
        let binding = PortBinding::udp("vpn-access", 10443);
        assert_eq!(binding.host_port, 10443);
        assert_eq!(binding.key(), (10443, Protocol::Udp));
    }

    #[test]
    fn test_protocol_defaults_to_tcp_when_omitted() {
        let binding: PortBinding =
            serde_json::from_str(r#"{"name":"web","containerPort":51821,"hostPort":51821}"#)
                .unwrap();
        assert_eq!(binding.protocol, Protocol::Tcp);
    }
}
