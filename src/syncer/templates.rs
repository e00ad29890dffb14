//! Builds the desired-state object descriptors for a [`RedisCluster`]
//! (§4.6), grounded on `scheme/redis/generator.go` in the upstream operator.
//! Each function returns a plain object; [`super::Syncer`] applies it.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Affinity, Container, ContainerPort, EnvVar, ExecAction, NodeAffinity, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PodAffinityTerm, PodAntiAffinity, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements, Service, ServicePort, ServiceSpec, Volume, VolumeMount, WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::Resource;

use crate::constants;
use crate::crd::{AntiAffinityStrength, RedisCluster, StorageSettings};
use crate::labels;

pub fn owner_reference(cluster: &RedisCluster) -> OwnerReference {
    cluster
        .controller_owner_ref(&())
        .expect("RedisCluster always carries name, namespace and uid by the time it is synced")
}

fn object_meta(cluster: &RedisCluster, name: String, extra_labels: BTreeMap<String, String>) -> ObjectMeta {
    let owned = !matches!(&cluster.spec.redis.storage, StorageSettings::PersistentClaim { keep_after_deletion: true, .. });
    ObjectMeta {
        name: Some(name),
        namespace: Some(cluster.namespace_unchecked()),
        labels: Some(labels::merge_labels([labels::managed_by_labels(), extra_labels])),
        owner_references: owned.then(|| vec![owner_reference(cluster)]),
        ..Default::default()
    }
}

fn redis_command(cluster: &RedisCluster) -> Vec<String> {
    cluster
        .spec
        .redis
        .command
        .clone()
        .unwrap_or_else(|| vec!["redis-server".to_string(), "/redis/redis.conf".to_string()])
}

fn sentinel_command(cluster: &RedisCluster) -> Vec<String> {
    cluster.spec.sentinel.command.clone().unwrap_or_else(|| {
        vec![
            "redis-server".to_string(),
            "/redis/sentinel.conf".to_string(),
            "--sentinel".to_string(),
        ]
    })
}

pub fn redis_headless_service(cluster: &RedisCluster) -> Service {
    let name = labels::redis_name(cluster);
    let selector = labels::role_labels(cluster, constants::COMPONENT_LABEL, constants::REDIS_ROLE);
    let mut meta = object_meta(cluster, name, selector.clone());
    meta.annotations = Some(BTreeMap::from([
        ("prometheus.io/scrape".to_string(), "true".to_string()),
        ("prometheus.io/port".to_string(), constants::EXPORTER_PORT.to_string()),
    ]));
    Service {
        metadata: meta,
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector: Some(selector),
            ports: Some(vec![
                ServicePort { name: Some("redis".to_string()), port: constants::REDIS_PORT as i32, ..Default::default() },
                ServicePort {
                    name: Some(constants::EXPORTER_PORT_NAME.to_string()),
                    port: constants::EXPORTER_PORT as i32,
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        status: None,
    }
}

pub fn sentinel_service(cluster: &RedisCluster) -> Service {
    let name = labels::sentinel_name(cluster);
    let selector = labels::role_labels(cluster, constants::COMPONENT_LABEL, constants::SENTINEL_ROLE);
    Service {
        metadata: object_meta(cluster, name, selector.clone()),
        spec: Some(ServiceSpec {
            selector: Some(selector),
            ports: Some(vec![ServicePort {
                name: Some("sentinel".to_string()),
                port: constants::SENTINEL_PORT as i32,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

pub fn redis_configmap(cluster: &RedisCluster) -> k8s_openapi::api::core::v1::ConfigMap {
    let name = labels::redis_name(cluster);
    let mut lines = vec!["bind 0.0.0.0".to_string(), "port 6379".to_string(), "dir /data".to_string()];
    lines.extend(cluster.redis_custom_config().iter().cloned());
    let data = BTreeMap::from([(constants::REDIS_CONFIG_FILE_NAME.to_string(), lines.join("\n"))]);
    k8s_openapi::api::core::v1::ConfigMap {
        metadata: object_meta(cluster, name, BTreeMap::new()),
        data: Some(data),
        ..Default::default()
    }
}

pub fn redis_shutdown_configmap(cluster: &RedisCluster) -> k8s_openapi::api::core::v1::ConfigMap {
    let name = labels::redis_shutdown_configmap_name(cluster);
    let sentinel_host = labels::sentinel_name(cluster);
    let sentinel_port = constants::SENTINEL_PORT;
    let monitor_name = cluster.monitor_name();
    let script = format!(
        "#!/bin/sh\n\
         master=$(redis-cli -h {sentinel_host} -p {sentinel_port} --csv SENTINEL get-master-addr-by-name {monitor_name} | tr ',' ' ' | tr -d '\"' | cut -d' ' -f1)\n\
         redis-cli -h \"$(hostname)\" SAVE\n\
         if [ \"$master\" = \"$(hostname -i)\" ]; then\n\
         \tredis-cli -h {sentinel_host} -p {sentinel_port} SENTINEL failover {monitor_name}\n\
         fi\n"
    );
    let data = BTreeMap::from([("shutdown.sh".to_string(), script)]);
    k8s_openapi::api::core::v1::ConfigMap {
        metadata: object_meta(cluster, name, BTreeMap::new()),
        data: Some(data),
        ..Default::default()
    }
}

pub fn sentinel_configmap(cluster: &RedisCluster) -> k8s_openapi::api::core::v1::ConfigMap {
    let name = labels::sentinel_name(cluster);
    let mut lines = vec![
        "bind 0.0.0.0".to_string(),
        format!("port {}", constants::SENTINEL_PORT),
        format!(
            "sentinel monitor {} {} {} {}",
            cluster.monitor_name(),
            labels::redis_name(cluster),
            constants::REDIS_PORT,
            crate::crd::quorum(cluster.sentinel_replicas())
        ),
    ];
    let monitor_name = cluster.monitor_name();
    lines.extend(cluster.sentinel_custom_config().iter().map(|d| format!("sentinel set {monitor_name} {d}")));
    let data = BTreeMap::from([(constants::SENTINEL_CONFIG_FILE_NAME.to_string(), lines.join("\n"))]);
    k8s_openapi::api::core::v1::ConfigMap {
        metadata: object_meta(cluster, name, BTreeMap::new()),
        data: Some(data),
        ..Default::default()
    }
}

fn anti_affinity(cluster: &RedisCluster, strength: AntiAffinityStrength, selector: BTreeMap<String, String>) -> Affinity {
    let term = PodAffinityTerm {
        label_selector: Some(LabelSelector { match_labels: Some(selector), ..Default::default() }),
        topology_key: constants::HOSTNAME_TOPOLOGY_KEY.to_string(),
        ..Default::default()
    };
    let pod_anti_affinity = match strength {
        AntiAffinityStrength::Hard => PodAntiAffinity { required_during_scheduling_ignored_during_execution: Some(vec![term]), ..Default::default() },
        AntiAffinityStrength::Soft => PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![WeightedPodAffinityTerm { weight: 100, pod_affinity_term: term }]),
            ..Default::default()
        },
    };
    Affinity { pod_anti_affinity: Some(pod_anti_affinity), node_affinity: None::<NodeAffinity>, ..Default::default() }
}

fn redis_probe() -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                "redis-cli -h $(hostname) ping".to_string(),
            ]),
        }),
        initial_delay_seconds: Some(30),
        timeout_seconds: Some(5),
        ..Default::default()
    }
}

fn exporter_container(cluster: &RedisCluster) -> Option<Container> {
    if !cluster.spec.redis.exporter.enabled {
        return None;
    }
    Some(Container {
        name: constants::EXPORTER_CONTAINER_NAME.to_string(),
        image: cluster.spec.redis.exporter.image.clone(),
        ports: Some(vec![ContainerPort { name: Some(constants::EXPORTER_PORT_NAME.to_string()), container_port: constants::EXPORTER_PORT as i32, ..Default::default() }]),
        ..Default::default()
    })
}

pub fn redis_statefulset(cluster: &RedisCluster) -> StatefulSet {
    let name = labels::redis_name(cluster);
    let selector = labels::role_labels(cluster, constants::COMPONENT_LABEL, constants::REDIS_ROLE);
    let config_name = labels::redis_name(cluster);
    let shutdown_name = labels::redis_shutdown_configmap_name(cluster);

    let mut containers = vec![Container {
        name: constants::REDIS_NAME.to_string(),
        image: cluster.spec.redis.image.clone(),
        command: Some(redis_command(cluster)),
        ports: Some(vec![ContainerPort { name: Some("redis".to_string()), container_port: constants::REDIS_PORT as i32, ..Default::default() }]),
        readiness_probe: Some(redis_probe()),
        liveness_probe: Some(redis_probe()),
        resources: cluster.spec.redis.resources.clone(),
        lifecycle: Some(k8s_openapi::api::core::v1::Lifecycle {
            pre_stop: Some(k8s_openapi::api::core::v1::LifecycleHandler {
                exec: Some(ExecAction { command: Some(vec!["/bin/sh".to_string(), "/redis-shutdown/shutdown.sh".to_string()]) }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        volume_mounts: Some(vec![
            VolumeMount { name: constants::REDIS_CONFIG_VOLUME_NAME.to_string(), mount_path: "/redis".to_string(), ..Default::default() },
            VolumeMount { name: constants::REDIS_SHUTDOWN_CONFIG_VOLUME_NAME.to_string(), mount_path: "/redis-shutdown".to_string(), ..Default::default() },
            VolumeMount { name: constants::REDIS_STORAGE_VOLUME_NAME.to_string(), mount_path: "/data".to_string(), ..Default::default() },
        ]),
        ..Default::default()
    }];
    containers.extend(exporter_container(cluster));

    let (volume_claim_templates, data_volume) = match &cluster.spec.redis.storage {
        StorageSettings::Ephemeral => (None, Some(Volume { name: constants::REDIS_STORAGE_VOLUME_NAME.to_string(), empty_dir: Some(Default::default()), ..Default::default() })),
        StorageSettings::PersistentClaim { storage_class_name, request, .. } => (
            Some(vec![PersistentVolumeClaim {
                metadata: ObjectMeta { name: Some(constants::REDIS_STORAGE_VOLUME_NAME.to_string()), ..Default::default() },
                spec: Some(PersistentVolumeClaimSpec {
                    access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                    storage_class_name: storage_class_name.clone(),
                    resources: Some(ResourceRequirements {
                        requests: Some(BTreeMap::from([(
                            "storage".to_string(),
                            k8s_openapi::apimachinery::pkg::api::resource::Quantity(request.clone()),
                        )])),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            None,
        ),
    };

    let mut volumes = vec![
        Volume {
            name: constants::REDIS_CONFIG_VOLUME_NAME.to_string(),
            config_map: Some(k8s_openapi::api::core::v1::ConfigMapVolumeSource { name: Some(config_name), ..Default::default() }),
            ..Default::default()
        },
        Volume {
            name: constants::REDIS_SHUTDOWN_CONFIG_VOLUME_NAME.to_string(),
            config_map: Some(k8s_openapi::api::core::v1::ConfigMapVolumeSource { name: Some(shutdown_name), ..Default::default() }),
            ..Default::default()
        },
    ];
    volumes.extend(data_volume);

    StatefulSet {
        metadata: object_meta(cluster, name.clone(), selector.clone()),
        spec: Some(StatefulSetSpec {
            replicas: Some(cluster.redis_replicas()),
            service_name: labels::redis_name(cluster),
            selector: LabelSelector { match_labels: Some(selector.clone()), ..Default::default() },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta { labels: Some(selector.clone()), ..Default::default() }),
                spec: Some(PodSpec {
                    affinity: Some(cluster.spec.redis.affinity.clone().unwrap_or_else(|| anti_affinity(cluster, cluster.spec.redis.anti_affinity, selector))),
                    containers,
                    volumes: Some(volumes),
                    security_context: cluster.spec.redis.security_context.clone(),
                    tolerations: cluster.spec.redis.tolerations.clone(),
                    ..Default::default()
                }),
            },
            volume_claim_templates,
            ..Default::default()
        }),
        status: None,
    }
}

pub fn sentinel_deployment(cluster: &RedisCluster) -> Deployment {
    let name = labels::sentinel_name(cluster);
    let selector = labels::role_labels(cluster, constants::COMPONENT_LABEL, constants::SENTINEL_ROLE);
    let config_name = labels::sentinel_name(cluster);

    let init_container = Container {
        name: "copy-config".to_string(),
        image: cluster.spec.sentinel.image.clone(),
        command: Some(vec!["cp".to_string(), "/readonly/sentinel.conf".to_string(), "/redis/sentinel.conf".to_string()]),
        volume_mounts: Some(vec![
            VolumeMount { name: "sentinel-readonly-config".to_string(), mount_path: "/readonly".to_string(), ..Default::default() },
            VolumeMount { name: constants::REDIS_CONFIG_VOLUME_NAME.to_string(), mount_path: "/redis".to_string(), ..Default::default() },
        ]),
        ..Default::default()
    };

    let container = Container {
        name: constants::SENTINEL_NAME.to_string(),
        image: cluster.spec.sentinel.image.clone(),
        command: Some(sentinel_command(cluster)),
        ports: Some(vec![ContainerPort { name: Some("sentinel".to_string()), container_port: constants::SENTINEL_PORT as i32, ..Default::default() }]),
        readiness_probe: Some(Probe {
            tcp_socket: Some(k8s_openapi::api::core::v1::TCPSocketAction { port: IntOrString::Int(constants::SENTINEL_PORT as i32), ..Default::default() }),
            ..Default::default()
        }),
        resources: cluster.spec.sentinel.resources.clone(),
        volume_mounts: Some(vec![VolumeMount { name: constants::REDIS_CONFIG_VOLUME_NAME.to_string(), mount_path: "/redis".to_string(), ..Default::default() }]),
        env: Some(vec![EnvVar { name: "MONITOR_NAME".to_string(), value: Some(cluster.monitor_name()), ..Default::default() }]),
        ..Default::default()
    };

    Deployment {
        metadata: object_meta(cluster, name, selector.clone()),
        spec: Some(DeploymentSpec {
            replicas: Some(cluster.sentinel_replicas()),
            selector: LabelSelector { match_labels: Some(selector.clone()), ..Default::default() },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta { labels: Some(selector.clone()), ..Default::default() }),
                spec: Some(PodSpec {
                    affinity: Some(cluster.spec.sentinel.affinity.clone().unwrap_or_else(|| anti_affinity(cluster, cluster.spec.sentinel.anti_affinity, selector))),
                    init_containers: Some(vec![init_container]),
                    containers: vec![container],
                    volumes: Some(vec![
                        Volume {
                            name: "sentinel-readonly-config".to_string(),
                            config_map: Some(k8s_openapi::api::core::v1::ConfigMapVolumeSource { name: Some(config_name), ..Default::default() }),
                            ..Default::default()
                        },
                        Volume { name: constants::REDIS_CONFIG_VOLUME_NAME.to_string(), empty_dir: Some(Default::default()), ..Default::default() },
                    ]),
                    security_context: cluster.spec.sentinel.security_context.clone(),
                    tolerations: cluster.spec.sentinel.tolerations.clone(),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}
