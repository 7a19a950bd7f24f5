//! MME: RBAC, ConfigMaps with scripts and configuration, the control plane Services and the
//! StatefulSet additions the four MME containers need.

use std::path::PathBuf;

use k8s_openapi::api::core::v1::ConfigMapVolumeSource;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::EmptyDirVolumeSource;
use k8s_openapi::api::core::v1::EnvVar;
use k8s_openapi::api::core::v1::EnvVarSource;
use k8s_openapi::api::core::v1::HostPathVolumeSource;
use k8s_openapi::api::core::v1::ObjectFieldSelector;
use k8s_openapi::api::core::v1::SecurityContext;
use k8s_openapi::api::core::v1::Volume;
use k8s_openapi::api::core::v1::VolumeMount;

use crate::error::Result;
use crate::resources::config_map_from_dir;
use crate::resources::role;
use crate::resources::role_binding;
use crate::resources::service;
use crate::resources::service_account;
use crate::resources::DesiredObjects;
use crate::resources::DesiredState;
use crate::resources::ServicePortSpec;
use crate::statefulset::StatefulSetPatch;

const RBAC_NAME: &str = "mme";
const SCRIPTS: &str = "mme-scripts";
const CONFIGS: &str = "mme-configs";
const POD_INIT_IMAGE: &str = "docker.io/omecproject/pod-init:1.0.0";
const MME_IMAGE: &str = "amitinfo2k/nucleus-mme:9f86f87";

const SHARED_DATA_PATH: &str = "/opt/mme/config/shared";
const SCRIPTS_PATH: &str = "/opt/mme/scripts";
const CONFIG_PATH: &str = "/opt/mme/config";

const SCTP_MODULE_SCRIPT: &str = "if chroot /mnt/host-rootfs modinfo nf_conntrack_proto_sctp > /dev/null 2>&1; \
then chroot /mnt/host-rootfs modprobe nf_conntrack_proto_sctp; fi; chroot /mnt/host-rootfs modprobe tipc";

pub const CP_COMM: ServicePortSpec = ServicePortSpec::new("cp-comm", 8085, "UDP");
pub const S11: ServicePortSpec = ServicePortSpec::new("s11", 2123, "UDP");

/// The objects of one MME application.
#[derive(Debug, Clone)]
pub struct MmeResources {
    app: String,
    namespace: String,
    files_dir: PathBuf,
}

impl MmeResources {
    pub fn new(app: impl Into<String>, namespace: impl Into<String>, files_dir: impl Into<PathBuf>) -> Self {
        MmeResources {
            app: app.into(),
            namespace: namespace.into(),
            files_dir: files_dir.into(),
        }
    }

    /// Volumes and mounts for the `mme`, `s1ap`, `s6a` and `s11` containers plus the init
    /// containers loading the SCTP kernel module and preparing the shared configuration.
    pub fn statefulset_patch() -> StatefulSetPatch {
        let app_mounts = vec![
            mount("shared-data", SHARED_DATA_PATH),
            mount("shared-app", "/tmp"),
            mount("scripts", SCRIPTS_PATH),
            mount("configs", CONFIG_PATH),
        ];
        let interface_mounts = vec![
            mount("shared-data", SHARED_DATA_PATH),
            mount("shared-app", "/tmp"),
            mount("scripts", SCRIPTS_PATH),
        ];

        StatefulSetPatch {
            id: "mme-volumes/v1",
            marker: ("mme", mount("shared-data", SHARED_DATA_PATH)),
            mounts: vec![
                ("mme", app_mounts.clone()),
                ("s1ap", app_mounts),
                ("s6a", interface_mounts.clone()),
                ("s11", interface_mounts),
            ],
            volumes: vec![
                config_map_volume("scripts", SCRIPTS, 0o755),
                config_map_volume("configs", CONFIGS, 0o644),
                Volume {
                    name: "shared-data".to_owned(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                },
                Volume {
                    name: "shared-app".to_owned(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                },
                Volume {
                    name: "host-rootfs".to_owned(),
                    host_path: Some(HostPathVolumeSource {
                        path: "/".to_owned(),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ],
            init_containers: vec![
                Container {
                    name: "mme-load-sctp-module".to_owned(),
                    command: Some(vec!["bash".to_owned(), "-xc".to_owned()]),
                    args: Some(vec![SCTP_MODULE_SCRIPT.to_owned()]),
                    image: Some(POD_INIT_IMAGE.to_owned()),
                    image_pull_policy: Some("IfNotPresent".to_owned()),
                    security_context: Some(SecurityContext {
                        privileged: Some(true),
                        run_as_user: Some(0),
                        ..Default::default()
                    }),
                    volume_mounts: Some(vec![mount("host-rootfs", "/mnt/host-rootfs")]),
                    ..Default::default()
                },
                Container {
                    name: "mme-init".to_owned(),
                    command: Some(vec![format!("{SCRIPTS_PATH}/mme-init.sh")]),
                    image: Some(MME_IMAGE.to_owned()),
                    image_pull_policy: Some("IfNotPresent".to_owned()),
                    env: Some(vec![EnvVar {
                        name: "POD_IP".to_owned(),
                        value_from: Some(EnvVarSource {
                            field_ref: Some(ObjectFieldSelector {
                                field_path: "status.podIP".to_owned(),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    volume_mounts: Some(vec![
                        mount("shared-data", SHARED_DATA_PATH),
                        mount("scripts", SCRIPTS_PATH),
                        mount("configs", CONFIG_PATH),
                    ]),
                    ..Default::default()
                },
            ],
        }
    }
}

impl DesiredState for MmeResources {
    fn desired_objects(&self) -> Result<DesiredObjects> {
        let (app, namespace) = (self.app.as_str(), self.namespace.as_str());

        Ok(DesiredObjects {
            service_accounts: vec![service_account(RBAC_NAME, namespace, app)],
            // Prefixed with the application so they do not collide with the SPGW-C Services.
            services: vec![
                service(&format!("{app}-cp-comm"), namespace, app, None, &[CP_COMM]),
                service(&format!("{app}-s11"), namespace, app, Some("NodePort"), &[S11]),
            ],
            config_maps: vec![
                config_map_from_dir(SCRIPTS, namespace, app, &self.files_dir.join("scripts"))?,
                config_map_from_dir(CONFIGS, namespace, app, &self.files_dir.join("config"))?,
            ],
            roles: vec![role(RBAC_NAME, namespace, app)],
            role_bindings: vec![role_binding(RBAC_NAME, namespace, app)],
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

fn config_map_volume(name: &str, config_map: &str, mode: i32) -> Volume {
    Volume {
        name: name.to_owned(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map.to_owned(),
            default_mode: Some(mode),
            ..Default::default()
        }),
        ..Default::default()
    }
}
