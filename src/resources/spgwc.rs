//! SPGW-C: RBAC, scripts and configuration ConfigMaps and the control plane Services.

use std::path::PathBuf;

use crate::error::Result;
use crate::resources::config_map_from_dir;
use crate::resources::role;
use crate::resources::role_binding;
use crate::resources::service;
use crate::resources::service_account;
use crate::resources::DesiredObjects;
use crate::resources::DesiredState;
use crate::resources::ServicePortSpec;

const RBAC_NAME: &str = "spgwc";

pub const CP_COMM: ServicePortSpec = ServicePortSpec::new("cp-comm", 8085, "UDP");
// No fixed node port: 32124 is taken by spgwu-dp-comm.
pub const S11: ServicePortSpec = ServicePortSpec::new("s11", 2123, "UDP");

#[derive(Debug, Clone)]
pub struct SpgwcResources {
    app: String,
    namespace: String,
    files_dir: PathBuf,
}

impl SpgwcResources {
    pub fn new(app: impl Into<String>, namespace: impl Into<String>, files_dir: impl Into<PathBuf>) -> Self {
        SpgwcResources {
            app: app.into(),
            namespace: namespace.into(),
            files_dir: files_dir.into(),
        }
    }
}

impl DesiredState for SpgwcResources {
    fn desired_objects(&self) -> Result<DesiredObjects> {
        let (app, namespace) = (self.app.as_str(), self.namespace.as_str());

        Ok(DesiredObjects {
            service_accounts: vec![service_account(RBAC_NAME, namespace, app)],
            services: vec![
                service("spgwc-cp-comm", namespace, app, None, &[CP_COMM]),
                service("spgwc-s11", namespace, app, Some("NodePort"), &[S11]),
            ],
            config_maps: vec![
                config_map_from_dir("spgwc-scripts", namespace, app, &self.files_dir.join("script"))?,
                config_map_from_dir("spgwc-configs", namespace, app, &self.files_dir.join("config"))?,
            ],
            roles: vec![role(RBAC_NAME, namespace, app)],
            role_bindings: vec![role_binding(RBAC_NAME, namespace, app)],
        })
    }
}
