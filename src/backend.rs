use anyhow::{Context, Result};
use std::future::Future;
use tokio::time::{Duration, timeout};

use crate::dispatch::Backend;
use crate::images::ImageGateway;
use crate::k8s::{KubeGateway, cluster_image_reference};
use crate::model::{DetailMap, ImageRecord, WorkloadRecord, WorkloadSummary};

pub const LIST_TIMEOUT: Duration = Duration::from_secs(10);
const MUTATION_TIMEOUT: Duration = Duration::from_secs(30);
const PULL_TIMEOUT: Duration = Duration::from_secs(300);

/// Registry, docker and cluster access behind the dispatcher.
pub struct LiveBackend {
    images: ImageGateway,
    kube: Option<KubeGateway>,
    cluster_registry_host: String,
}

impl LiveBackend {
    pub fn new(
        images: ImageGateway,
        kube: Option<KubeGateway>,
        cluster_registry_host: impl Into<String>,
    ) -> Self {
        Self {
            images,
            kube,
            cluster_registry_host: cluster_registry_host.into(),
        }
    }

    fn kube(&self) -> Result<&KubeGateway> {
        self.kube
            .as_ref()
            .context("Kubernetes cluster is not configured")
    }
}

pub async fn with_timeout<T>(
    limit: Duration,
    operation: &str,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    timeout(limit, future)
        .await
        .with_context(|| format!("{operation} timed out after {}s", limit.as_secs()))?
}

impl Backend for LiveBackend {
    async fn list_images(&self) -> Result<Vec<ImageRecord>> {
        with_timeout(LIST_TIMEOUT, "image listing", self.images.list_images()).await
    }

    async fn delete_image(&self, id: &str) -> Result<()> {
        with_timeout(MUTATION_TIMEOUT, "image delete", self.images.delete_image(id)).await
    }

    async fn pull_image(&self, reference: &str) -> Result<()> {
        with_timeout(PULL_TIMEOUT, "image pull", self.images.pull_image(reference)).await
    }

    async fn list_workloads(&self, namespace: &str) -> Result<Vec<WorkloadSummary>> {
        let kube = self.kube()?;
        with_timeout(
            LIST_TIMEOUT,
            "deployment listing",
            kube.list_deployments(namespace),
        )
        .await
    }

    async fn list_workload_pods(&self, name: &str, namespace: &str) -> Result<Vec<WorkloadRecord>> {
        let kube = self.kube()?;
        with_timeout(
            LIST_TIMEOUT,
            "deployment pod listing",
            kube.list_workload_pods(name, namespace),
        )
        .await
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<WorkloadRecord>> {
        let kube = self.kube()?;
        with_timeout(LIST_TIMEOUT, "pod listing", kube.list_pods(namespace)).await
    }

    async fn pod_detail(&self, name: &str, namespace: &str) -> Result<DetailMap> {
        let kube = self.kube()?;
        with_timeout(
            MUTATION_TIMEOUT,
            "pod detail lookup",
            kube.pod_detail(name, namespace),
        )
        .await
    }

    async fn create_workload(&self, image: &str, name: &str, namespace: &str) -> Result<()> {
        let kube = self.kube()?;
        let image = cluster_image_reference(image, &self.cluster_registry_host);
        with_timeout(
            MUTATION_TIMEOUT,
            "deployment create",
            kube.create_deployment(&image, name, namespace),
        )
        .await
    }

    async fn update_workload(&self, image: &str, name: &str, namespace: &str) -> Result<()> {
        let kube = self.kube()?;
        let image = cluster_image_reference(image, &self.cluster_registry_host);
        with_timeout(
            MUTATION_TIMEOUT,
            "deployment update",
            kube.update_deployment_image(&image, name, namespace),
        )
        .await
    }
}
