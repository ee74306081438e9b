//! Load balancer exposure and security group ingress

use crate::port::Protocol;
use ipnetwork::{IpNetwork, Ipv4Network};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// One published entry point: a listener on the shared load balancer,
/// the target group behind it and the health check guarding it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExposureRule {
    /// Port the load balancer listens on
    pub listener_port: u16,

    /// Protocol of the listener
    pub listener_protocol: Protocol,

    /// Name of the target group created for this rule
    pub target_group_name: String,

    /// Container port traffic is forwarded to
    pub target_container_port: u16,

    /// Protocol the target group forwards with
    pub target_protocol: Protocol,

    /// Health check of the target group
    pub health_check: HealthCheck,

    /// Source allowed to reach the listener
    #[serde(default = "any_ipv4")]
    #[schemars(with = "String")]
    pub source_cidr: IpNetwork,
}

impl ExposureRule {
    /// Listener identity on the load balancer
    pub fn listener_key(&self) -> (u16, Protocol) {
        (self.listener_port, self.listener_protocol)
    }
}

/// Protocol used by a target group health probe
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeProtocol {
    Http,
    Https,
    Tcp,
}

impl ProbeProtocol {
    pub fn is_http(&self) -> bool {
        matches!(self, ProbeProtocol::Http | ProbeProtocol::Https)
    }

    /// Every probe is carried over TCP, whatever the data-plane protocol is
    pub fn transport(&self) -> Protocol {
        Protocol::Tcp
    }
}

impl fmt::Display for ProbeProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeProtocol::Http => f.write_str("HTTP"),
            ProbeProtocol::Https => f.write_str("HTTPS"),
            ProbeProtocol::Tcp => f.write_str("TCP"),
        }
    }
}

/// Target group health check.
///
/// `probe_port` may differ from the data-plane port: UDP targets have no
/// native HTTP probe and are checked through the service's TCP management port.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub probe_port: u16,
    pub probe_protocol: ProbeProtocol,

    /// Request path for HTTP(S) probes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Status codes counted as healthy for HTTP(S) probes
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub healthy_codes: Option<HttpCodeRange>,
}

impl HealthCheck {
    pub fn http(port: u16, path: impl Into<String>, healthy_codes: HttpCodeRange) -> Self {
        Self {
            probe_port: port,
            probe_protocol: ProbeProtocol::Http,
            path: Some(path.into()),
            healthy_codes: Some(healthy_codes),
        }
    }

    pub fn tcp(port: u16) -> Self {
        Self {
            probe_port: port,
            probe_protocol: ProbeProtocol::Tcp,
            path: None,
            healthy_codes: None,
        }
    }
}

/// Inclusive range of HTTP status codes, written `200-299`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HttpCodeRange {
    pub start: u16,
    pub end: u16,
}

impl HttpCodeRange {
    pub const SUCCESS: HttpCodeRange = HttpCodeRange { start: 200, end: 299 };

    pub fn contains(&self, code: u16) -> bool {
        (self.start..=self.end).contains(&code)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid HTTP code range '{0}': expected <code> or <start>-<end> within 200-599")]
pub struct ParseCodeRangeError(pub String);

impl FromStr for HttpCodeRange {
    type Err = ParseCodeRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseCodeRangeError(s.to_string());
        let (start, end) = match s.split_once('-') {
            Some((start, end)) => (start.trim(), end.trim()),
            None => (s.trim(), s.trim()),
        };
        let start: u16 = start.parse().map_err(|_| err())?;
        let end: u16 = end.parse().map_err(|_| err())?;
        if start < 200 || end > 599 || start > end {
            return Err(err());
        }
        Ok(Self { start, end })
    }
}

impl TryFrom<String> for HttpCodeRange {
    type Error = ParseCodeRangeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HttpCodeRange> for String {
    fn from(range: HttpCodeRange) -> Self {
        range.to_string()
    }
}

impl fmt::Display for HttpCodeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Ingress permission on a security group.
///
/// The description carries the owner of the rule so that other services
/// sharing the same group can tell their rules apart.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressRule {
    #[schemars(with = "String")]
    pub source_cidr: IpNetwork,
    pub port: u16,
    pub protocol: Protocol,
    pub description: String,
}

impl IngressRule {
    /// Permission identity, ignoring the description
    pub fn permission(&self) -> (IpNetwork, u16, Protocol) {
        (self.source_cidr, self.port, self.protocol)
    }
}

impl fmt::Display for IngressRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{} ({})", self.source_cidr, self.protocol, self.port, self.description)
    }
}

/// `0.0.0.0/0`
pub fn any_ipv4() -> IpNetwork {
    let net = Ipv4Network::new(Ipv4Addr::UNSPECIFIED, 0).expect("prefix 0 is always valid");
    IpNetwork::V4(net)
}
