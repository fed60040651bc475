use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, ContainerPort, Pod, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, Time};
use kube::api::{ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::model::{DetailMap, NOT_AVAILABLE, WorkloadRecord, WorkloadSummary};

const APP_LABEL: &str = "app";
const CONTAINER_NAME: &str = "app";
const CONTAINER_PORT: i32 = 80;
const PULL_POLICY_NEVER: &str = "Never";
const MINIKUBE_REGISTRY_HOST: &str = "host.minikube.internal:5000";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    context: String,
}

impl KubeGateway {
    pub async fn new() -> Result<Self> {
        let kubeconfig = Kubeconfig::read().ok();
        let context = kubeconfig
            .as_ref()
            .and_then(|config| config.current_context.clone())
            .unwrap_or_else(|| "in-cluster".to_string());

        let config = if let Some(kubeconfig) = kubeconfig {
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("failed to infer Kubernetes configuration")?
        } else {
            Config::infer()
                .await
                .context("failed to infer Kubernetes configuration")?
        };

        info!("connecting to cluster {} (context {context})", config.cluster_url);
        let client = Client::try_from(config).context("failed to initialize Kubernetes client")?;
        Ok(Self { client, context })
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub async fn list_pods(&self, namespace: &str) -> Result<Vec<WorkloadRecord>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&list_params())
            .await
            .with_context(|| format!("failed to list pods in {namespace}"))?;
        Ok(list.iter().map(pod_record).collect())
    }

    pub async fn list_workload_pods(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Vec<WorkloadRecord>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = list_params().labels(&format!("{APP_LABEL}={name}"));
        let list = pods
            .list(&params)
            .await
            .with_context(|| format!("failed to list pods of deployment {namespace}/{name}"))?;
        Ok(list.iter().map(pod_record).collect())
    }

    pub async fn list_deployments(&self, namespace: &str) -> Result<Vec<WorkloadSummary>> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let list = deployments
            .list(&list_params())
            .await
            .with_context(|| format!("failed to list deployments in {namespace}"))?;
        Ok(list.iter().map(deployment_summary).collect())
    }

    pub async fn pod_detail(&self, name: &str, namespace: &str) -> Result<DetailMap> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod = pods
            .get(name)
            .await
            .with_context(|| format!("failed to get pod {namespace}/{name}"))?;
        Ok(pod_details(&pod))
    }

    pub async fn create_deployment(&self, image: &str, name: &str, namespace: &str) -> Result<()> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let deployment = new_deployment(image, name, namespace);

        match deployments.create(&PostParams::default(), &deployment).await {
            Ok(_) => {
                debug!("created deployment {namespace}/{name} with image {image}");
                Ok(())
            }
            Err(kube::Error::Api(response))
                if is_already_exists(response.code, &response.reason) =>
            {
                anyhow::bail!(
                    "deployment {namespace}/{name} already exists, delete it or deploy a different image"
                )
            }
            Err(error) => Err(error)
                .with_context(|| format!("failed to create deployment {namespace}/{name}")),
        }
    }

    pub async fn update_deployment_image(
        &self,
        image: &str,
        name: &str,
        namespace: &str,
    ) -> Result<()> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let mut deployment = deployments
            .get(name)
            .await
            .with_context(|| format!("failed to get deployment {namespace}/{name}"))?;

        let Some(container) = deployment
            .spec
            .as_mut()
            .and_then(|spec| spec.template.spec.as_mut())
            .and_then(|spec| spec.containers.first_mut())
        else {
            anyhow::bail!("deployment {namespace}/{name} has no containers");
        };
        container.image = Some(image.to_string());
        container.image_pull_policy = Some(PULL_POLICY_NEVER.to_string());

        deployments
            .replace(name, &PostParams::default(), &deployment)
            .await
            .with_context(|| format!("failed to update deployment {namespace}/{name}"))?;
        debug!("updated deployment {namespace}/{name} to image {image}");
        Ok(())
    }
}

/// Points `image` at the registry the cluster pulls from, unless it already
/// names that registry or the minikube host alias.
pub fn cluster_image_reference(image: &str, registry_host: &str) -> String {
    if image.contains(registry_host) || image.contains(MINIKUBE_REGISTRY_HOST) {
        return image.to_string();
    }

    let name_and_tag = image.rsplit('/').next().unwrap_or(image);
    format!("{registry_host}/{name_and_tag}")
}

fn pod_record(pod: &Pod) -> WorkloadRecord {
    let status = pod
        .status
        .as_ref()
        .and_then(|status| status.phase.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    let restarts = pod
        .status
        .as_ref()
        .and_then(|status| status.container_statuses.as_ref())
        .map(|statuses| {
            statuses
                .iter()
                .map(|status| i64::from(status.restart_count))
                .sum::<i64>()
        })
        .unwrap_or(0);
    let node = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.node_name.clone())
        .filter(|node| !node.is_empty())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    WorkloadRecord {
        name: pod.name_any(),
        namespace: pod.namespace().unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        status,
        restarts: restarts.to_string(),
        age: human_age(pod.metadata.creation_timestamp.as_ref()),
        node,
    }
}

fn deployment_summary(deployment: &Deployment) -> WorkloadSummary {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let ready = deployment
        .status
        .as_ref()
        .and_then(|status| status.ready_replicas)
        .unwrap_or(0);
    let status = if ready == desired {
        "Ready"
    } else if ready > 0 {
        "Partial"
    } else {
        "NotReady"
    };

    WorkloadSummary {
        name: deployment.name_any(),
        namespace: deployment
            .namespace()
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        status: status.to_string(),
        replica_fraction: format!("{ready}/{desired}"),
    }
}

fn pod_details(pod: &Pod) -> DetailMap {
    let mut details = DetailMap::new();
    let spec = pod.spec.as_ref();
    let status = pod.status.as_ref();

    details.insert("Name".to_string(), pod.name_any());
    details.insert("Namespace".to_string(), pod.namespace().unwrap_or_default());
    insert_opt(&mut details, "Status", status.and_then(|s| s.phase.clone()));
    insert_opt(&mut details, "Node", spec.and_then(|s| s.node_name.clone()));
    insert_opt(
        &mut details,
        "Start Time",
        status.and_then(|s| s.start_time.as_ref()).and_then(format_time),
    );
    insert_opt(
        &mut details,
        "Created",
        pod.metadata.creation_timestamp.as_ref().and_then(format_time),
    );
    insert_opt(&mut details, "Pod IP", status.and_then(|s| s.pod_ip.clone()));
    insert_opt(&mut details, "Host IP", status.and_then(|s| s.host_ip.clone()));
    insert_opt(
        &mut details,
        "Service Account",
        spec.and_then(|s| s.service_account_name.clone()),
    );
    insert_opt(
        &mut details,
        "Restart Policy",
        spec.and_then(|s| s.restart_policy.clone()),
    );
    insert_opt(&mut details, "DNS Policy", spec.and_then(|s| s.dns_policy.clone()));

    let labels = pod
        .labels()
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>();
    details.insert(
        "Labels".to_string(),
        if labels.is_empty() {
            "None".to_string()
        } else {
            labels.join(", ")
        },
    );
    details.insert(
        "Annotations".to_string(),
        format!("{} annotations", pod.annotations().len()),
    );

    if let Some(container) = spec.and_then(|s| s.containers.first()) {
        details.insert("Container Name".to_string(), container.name.clone());
        insert_opt(&mut details, "Container Image", container.image.clone());
        insert_opt(
            &mut details,
            "Image Pull Policy",
            container.image_pull_policy.clone(),
        );

        let ports = container
            .ports
            .iter()
            .flatten()
            .map(|port| {
                format!(
                    "{}/{}",
                    port.container_port,
                    port.protocol.as_deref().unwrap_or("TCP")
                )
            })
            .collect::<Vec<_>>();
        details.insert(
            "Container Ports".to_string(),
            if ports.is_empty() {
                "None".to_string()
            } else {
                ports.join(", ")
            },
        );

        let resources = container.resources.as_ref();
        let requests = resources.and_then(|r| r.requests.as_ref());
        let limits = resources.and_then(|r| r.limits.as_ref());
        insert_opt(&mut details, "CPU Request", quantity(requests, "cpu"));
        insert_opt(&mut details, "Memory Request", quantity(requests, "memory"));
        insert_opt(&mut details, "CPU Limit", quantity(limits, "cpu"));
        insert_opt(&mut details, "Memory Limit", quantity(limits, "memory"));
    }

    if let Some(container_status) = status
        .and_then(|s| s.container_statuses.as_ref())
        .and_then(|statuses| statuses.first())
    {
        details.insert(
            "Container Ready".to_string(),
            container_status.ready.to_string(),
        );
        details.insert(
            "Restart Count".to_string(),
            container_status.restart_count.to_string(),
        );
        insert_opt(
            &mut details,
            "Container ID",
            container_status.container_id.clone(),
        );
        if let Some(terminated) = container_status
            .last_state
            .as_ref()
            .and_then(|state| state.terminated.as_ref())
        {
            details.insert(
                "Last Exit Code".to_string(),
                terminated.exit_code.to_string(),
            );
            insert_opt(&mut details, "Last Exit Reason", terminated.reason.clone());
        }
    }

    let conditions = status.and_then(|s| s.conditions.as_ref());
    for (condition_type, key) in [
        ("Ready", "Ready Condition"),
        ("PodScheduled", "Scheduled Condition"),
        ("Initialized", "Initialized Condition"),
    ] {
        let value = conditions
            .and_then(|conditions| {
                conditions
                    .iter()
                    .find(|condition| condition.type_ == condition_type)
            })
            .map(|condition| condition.status.clone())
            .unwrap_or_else(|| "Unknown".to_string());
        details.insert(key.to_string(), value);
    }

    details
}

fn new_deployment(image: &str, name: &str, namespace: &str) -> Deployment {
    let labels = BTreeMap::from([(APP_LABEL.to_string(), name.to_string())]);

    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..ObjectMeta::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: CONTAINER_NAME.to_string(),
                        image: Some(image.to_string()),
                        image_pull_policy: Some(PULL_POLICY_NEVER.to_string()),
                        ports: Some(vec![ContainerPort {
                            container_port: CONTAINER_PORT,
                            protocol: Some("TCP".to_string()),
                            ..ContainerPort::default()
                        }]),
                        ..Container::default()
                    }],
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

fn insert_opt(details: &mut DetailMap, key: &str, value: Option<String>) {
    if let Some(value) = value.filter(|value| !value.is_empty()) {
        details.insert(key.to_string(), value);
    }
}

fn quantity(values: Option<&BTreeMap<String, Quantity>>, key: &str) -> Option<String> {
    values
        .and_then(|values| values.get(key))
        .map(|value| value.0.clone())
        .filter(|value| value != "0")
}

fn format_time(time: &Time) -> Option<String> {
    DateTime::from_timestamp(time.0.as_second(), 0)
        .map(|value| value.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string())
}

fn is_already_exists(code: u16, reason: &str) -> bool {
    code == 409 && reason == "AlreadyExists"
}

fn list_params() -> ListParams {
    ListParams::default().limit(500)
}

fn human_age(timestamp: Option<&Time>) -> String {
    let Some(timestamp) = timestamp else {
        return NOT_AVAILABLE.to_string();
    };

    let elapsed_seconds =
        (k8s_openapi::jiff::Timestamp::now().as_second() - timestamp.0.as_second()).max(0);
    format_elapsed_seconds(elapsed_seconds)
}

fn format_elapsed_seconds(seconds: i64) -> String {
    if seconds >= 86_400 {
        return format!("{}d", seconds / 86_400);
    }

    if seconds >= 3_600 {
        return format!("{}h", seconds / 3_600);
    }

    if seconds >= 60 {
        return format!("{}m", seconds / 60);
    }

    format!("{seconds}s")
}

#[cfg(test)]
mod tests {
    use super::{
        cluster_image_reference, deployment_summary, format_elapsed_seconds, is_already_exists,
        new_deployment, pod_details, pod_record,
    };
    use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStatus};
    use k8s_openapi::api::core::v1::{
        Container, ContainerPort, ContainerState, ContainerStateTerminated, ContainerStatus, Pod,
        PodCondition, PodSpec, PodStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn deployment(replicas: Option<i32>, ready: Option<i32>) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("default".to_string()),
                ..ObjectMeta::default()
            },
            spec: Some(DeploymentSpec {
                replicas,
                ..DeploymentSpec::default()
            }),
            status: Some(DeploymentStatus {
                ready_replicas: ready,
                ..DeploymentStatus::default()
            }),
        }
    }

    fn container_status(name: &str, restarts: i32) -> ContainerStatus {
        ContainerStatus {
            name: name.to_string(),
            restart_count: restarts,
            ready: true,
            ..ContainerStatus::default()
        }
    }

    fn sample_pod() -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("web-1".to_string()),
                namespace: Some("default".to_string()),
                labels: Some(BTreeMap::from([
                    ("app".to_string(), "web".to_string()),
                    ("tier".to_string(), "front".to_string()),
                ])),
                ..ObjectMeta::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "app".to_string(),
                    image: Some("localhost:5000/web:v1".to_string()),
                    ports: Some(vec![
                        ContainerPort {
                            container_port: 80,
                            protocol: Some("TCP".to_string()),
                            ..ContainerPort::default()
                        },
                        ContainerPort {
                            container_port: 53,
                            protocol: Some("UDP".to_string()),
                            ..ContainerPort::default()
                        },
                    ]),
                    ..Container::default()
                }],
                ..PodSpec::default()
            }),
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                container_statuses: Some(vec![
                    ContainerStatus {
                        last_state: Some(ContainerState {
                            terminated: Some(ContainerStateTerminated {
                                exit_code: 137,
                                reason: Some("OOMKilled".to_string()),
                                ..ContainerStateTerminated::default()
                            }),
                            ..ContainerState::default()
                        }),
                        ..container_status("app", 2)
                    },
                    container_status("sidecar", 3),
                ]),
                conditions: Some(vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: "True".to_string(),
                    ..PodCondition::default()
                }]),
                ..PodStatus::default()
            }),
            ..Pod::default()
        }
    }

    #[test]
    fn only_already_exists_conflicts_count_as_duplicates() {
        assert!(is_already_exists(409, "AlreadyExists"));
        assert!(!is_already_exists(409, "Conflict"));
        assert!(!is_already_exists(422, "AlreadyExists"));
    }

    #[test]
    fn formats_elapsed_seconds_in_largest_unit() {
        assert_eq!(format_elapsed_seconds(59), "59s");
        assert_eq!(format_elapsed_seconds(61), "1m");
        assert_eq!(format_elapsed_seconds(3_601), "1h");
        assert_eq!(format_elapsed_seconds(172_800), "2d");
    }

    #[test]
    fn deployment_status_follows_ready_replicas() {
        let ready = deployment_summary(&deployment(Some(2), Some(2)));
        assert_eq!(ready.status, "Ready");
        assert_eq!(ready.replica_fraction, "2/2");

        let partial = deployment_summary(&deployment(Some(3), Some(1)));
        assert_eq!(partial.status, "Partial");

        let not_ready = deployment_summary(&deployment(None, None));
        assert_eq!(not_ready.status, "NotReady");
        assert_eq!(not_ready.replica_fraction, "0/1");
    }

    #[test]
    fn pod_record_sums_restarts_and_marks_missing_node() {
        let record = pod_record(&sample_pod());
        assert_eq!(record.name, "web-1");
        assert_eq!(record.status, "Running");
        assert_eq!(record.restarts, "5");
        assert_eq!(record.node, "N/A");
        assert_eq!(record.age, "N/A");
    }

    #[test]
    fn pod_details_cover_container_and_conditions() {
        let details = pod_details(&sample_pod());
        assert_eq!(details["Labels"], "app=web, tier=front");
        assert_eq!(details["Annotations"], "0 annotations");
        assert_eq!(details["Container Ports"], "80/TCP, 53/UDP");
        assert_eq!(details["Restart Count"], "2");
        assert_eq!(details["Last Exit Code"], "137");
        assert_eq!(details["Last Exit Reason"], "OOMKilled");
        assert_eq!(details["Ready Condition"], "True");
        assert_eq!(details["Scheduled Condition"], "Unknown");
        assert!(!details.contains_key("CPU Request"));
    }

    #[test]
    fn new_deployment_uses_single_never_pull_container() {
        let deployment = new_deployment("localhost:5000/app:v1", "app-v1", "default");
        let spec = deployment.spec.unwrap();
        assert_eq!(spec.replicas, Some(1));
        assert_eq!(
            spec.selector.match_labels.unwrap().get("app").map(String::as_str),
            Some("app-v1")
        );

        let containers = spec.template.spec.unwrap().containers;
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].name, "app");
        assert_eq!(containers[0].image_pull_policy.as_deref(), Some("Never"));
        assert_eq!(
            containers[0].ports.as_ref().unwrap()[0].container_port,
            80
        );
    }

    #[test]
    fn cluster_reference_rewrites_foreign_registries() {
        assert_eq!(
            cluster_image_reference("localhost:5000/app:v1", "localhost:5000"),
            "localhost:5000/app:v1"
        );
        assert_eq!(
            cluster_image_reference("host.minikube.internal:5000/app:v1", "localhost:5000"),
            "host.minikube.internal:5000/app:v1"
        );
        assert_eq!(
            cluster_image_reference("registry:5000/team/app:v1", "localhost:5000"),
            "localhost:5000/app:v1"
        );
        assert_eq!(
            cluster_image_reference("nginx:latest", "localhost:5000"),
            "localhost:5000/nginx:latest"
        );
    }
}
