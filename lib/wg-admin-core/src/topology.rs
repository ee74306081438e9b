//! Fixed conventions of the WireGuard admin deployment

use wg_admin_api::{
    any_ipv4, ExposureRule, HealthCheck, HttpCodeRange, ObjectLocation, PortBinding, Protocol,
};

pub const CONTAINER_NAME: &str = "WgAdmin";
pub const IMAGE: &str = "ghcr.io/teqsoft/wg-easy:development";
pub const CPU_UNITS: u32 = 256;
pub const MEMORY_MIB: u32 = 512;

pub const SERVICE_NAME: &str = "WgAdminService";
pub const DISCOVERY_NAME: &str = "wg-admin";

/// Web UI / management port of wg-easy
pub const MANAGEMENT_PORT: u16 = 51821;
/// WireGuard data port
pub const VPN_PORT: u16 = 10443;
/// Load balancer port fronting the management UI
pub const HTTP_LISTENER_PORT: u16 = 8080;

pub const CONFIG_BUCKET: &str = "ecs-clusters-space";
pub const CONFIG_KEY: &str = "WgAdmin/wg0.json";

pub fn port_bindings() -> Vec<PortBinding> {
    vec![
        PortBinding::tcp("web", MANAGEMENT_PORT),
        PortBinding::udp("vpn-access", VPN_PORT),
    ]
}

/// UDP data plane checked over the management UI, plus the UI itself
pub fn exposure_rules() -> Vec<ExposureRule> {
    vec![
        ExposureRule {
            listener_port: VPN_PORT,
            listener_protocol: Protocol::Udp,
            target_group_name: "WgAdminTargetGroup".to_string(),
            target_container_port: VPN_PORT,
            target_protocol: Protocol::Udp,
            health_check: HealthCheck::http(MANAGEMENT_PORT, "/", HttpCodeRange::SUCCESS),
            source_cidr: any_ipv4(),
        },
        ExposureRule {
            listener_port: HTTP_LISTENER_PORT,
            listener_protocol: Protocol::Tcp,
            target_group_name: "WgAdminHttpTargetGroup".to_string(),
            target_container_port: MANAGEMENT_PORT,
            target_protocol: Protocol::Tcp,
            health_check: HealthCheck::tcp(MANAGEMENT_PORT),
            source_cidr: any_ipv4(),
        },
    ]
}

pub fn config_location() -> ObjectLocation {
    ObjectLocation::new(CONFIG_BUCKET, CONFIG_KEY)
}
