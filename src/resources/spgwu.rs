//! SPGW-U: the data plane Service, its script and configuration ConfigMaps and the StatefulSet
//! additions for hugepages and the AF interface setup.

use std::path::PathBuf;

use k8s_openapi::api::core::v1::Capabilities;
use k8s_openapi::api::core::v1::ConfigMapVolumeSource;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::EmptyDirVolumeSource;
use k8s_openapi::api::core::v1::SecurityContext;
use k8s_openapi::api::core::v1::Volume;
use k8s_openapi::api::core::v1::VolumeMount;

use crate::error::Result;
use crate::resources::config_map_from_dir;
use crate::resources::service;
use crate::resources::DesiredObjects;
use crate::resources::DesiredState;
use crate::resources::ServicePortSpec;
use crate::statefulset::StatefulSetPatch;

const SCRIPT: &str = "dp-script";
const CONFIG: &str = "dp-config";
const POD_INIT_IMAGE: &str = "docker.io/omecproject/pod-init:1.0.0";

pub const DP_COMM: ServicePortSpec = ServicePortSpec::new("dp-comm", 8085, "UDP").with_node_port(32124);

#[derive(Debug, Clone)]
pub struct SpgwuResources {
    app: String,
    namespace: String,
    files_dir: PathBuf,
}

impl SpgwuResources {
    pub fn new(app: impl Into<String>, namespace: impl Into<String>, files_dir: impl Into<PathBuf>) -> Self {
        SpgwuResources {
            app: app.into(),
            namespace: namespace.into(),
            files_dir: files_dir.into(),
        }
    }

    pub fn statefulset_patch() -> StatefulSetPatch {
        StatefulSetPatch {
            id: "spgwu-volumes/v1",
            marker: ("spgwu", mount(SCRIPT, "/opt/dp/scripts/")),
            mounts: vec![(
                "spgwu",
                vec![
                    mount(SCRIPT, "/opt/dp/scripts/"),
                    mount(CONFIG, "/etc/dp/config"),
                    mount("hugepage", "/dev/hugepages"),
                ],
            )],
            volumes: vec![
                config_map_volume(SCRIPT, 0o755),
                config_map_volume(CONFIG, 0o644),
                Volume {
                    name: "hugepage".to_owned(),
                    empty_dir: Some(EmptyDirVolumeSource {
                        medium: Some("HugePages".to_owned()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ],
            init_containers: vec![Container {
                name: "spgwu-iptables-init".to_owned(),
                command: Some(vec!["/opt/dp/scripts/setup-af-iface.sh".to_owned()]),
                image: Some(POD_INIT_IMAGE.to_owned()),
                image_pull_policy: Some("IfNotPresent".to_owned()),
                security_context: Some(SecurityContext {
                    capabilities: Some(Capabilities {
                        add: Some(vec!["NET_ADMIN".to_owned()]),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                volume_mounts: Some(vec![VolumeMount {
                    name: SCRIPT.to_owned(),
                    mount_path: "/opt/dp/scripts/setup-af-iface.sh".to_owned(),
                    sub_path: Some("setup-af-iface.sh".to_owned()),
                    ..Default::default()
                }]),
                ..Default::default()
            }],
        }
    }
}

impl DesiredState for SpgwuResources {
    fn desired_objects(&self) -> Result<DesiredObjects> {
        let (app, namespace) = (self.app.as_str(), self.namespace.as_str());

        Ok(DesiredObjects {
            services: vec![service("spgwu-dp-comm", namespace, app, Some("NodePort"), &[DP_COMM])],
            config_maps: vec![
                config_map_from_dir(SCRIPT, namespace, app, &self.files_dir.join("Scripts"))?,
                config_map_from_dir(CONFIG, namespace, app, &self.files_dir.join("Config"))?,
            ],
            ..Default::default()
        })
    }
}

fn mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_owned(),
        mount_path: path.to_owned(),
        ..Default::default()
    }
}

fn config_map_volume(name: &str, mode: i32) -> Volume {
    Volume {
        name: name.to_owned(),
        config_map: Some(ConfigMapVolumeSource {
            name: name.to_owned(),
            default_mode: Some(mode),
            ..Default::default()
        }),
        ..Default::default()
    }
}
