//! HSS: the ports of the Service Juju creates for the application.

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::core::v1::ServicePort;
use k8s_openapi::api::core::v1::ServiceSpec;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::config::CharmConfig;
use crate::resources::app_labels;
use crate::resources::object_meta;

pub const DEFAULT_S6A_PORT: u16 = 3868;
pub const CONFIG_PORT: u16 = 8080;
pub const DEFAULT_PROM_EXPORTER_PORT: u16 = 9089;

/// The `(name, port)` pairs the HSS Service exposes for `config`. A port of 0 counts as unset.
pub fn service_ports(config: &CharmConfig) -> [(&'static str, u16); 3] {
    let configured = |port: Option<u16>, default| port.filter(|port| *port != 0).unwrap_or(default);
    [
        ("s6a", configured(config.s6a_port, DEFAULT_S6A_PORT)),
        ("config-port", CONFIG_PORT),
        ("prometheus-exporter", configured(config.prom_exporter_port, DEFAULT_PROM_EXPORTER_PORT)),
    ]
}

/// The strategic-merge patch adding the HSS ports to the Service named after `app`. Ports are
/// merged by number, so ports Juju put there stay. Every port targets the same port on the pod.
pub fn service_patch(app: &str, namespace: &str, config: &CharmConfig) -> Service {
    let ports = service_ports(config)
        .into_iter()
        .map(|(name, port)| ServicePort {
            name: Some(name.to_owned()),
            port: i32::from(port),
            target_port: Some(IntOrString::Int(i32::from(port))),
            protocol: Some("TCP".to_owned()),
            ..Default::default()
        })
        .collect();

    Service {
        metadata: object_meta(app, namespace, app_labels(app)),
        spec: Some(ServiceSpec {
            ports: Some(ports),
            selector: Some(app_labels(app)),
            ..Default::default()
        }),
        ..Default::default()
    }
}
