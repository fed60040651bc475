use crate::app::{AppCommand, Completion, Payload};
use crate::model::{DetailMap, ImageRecord, WorkloadRecord, WorkloadSummary};
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// External collaborators the dispatcher drives on behalf of the controller.
pub trait Backend: Send + Sync + 'static {
    fn list_images(&self) -> impl Future<Output = Result<Vec<ImageRecord>>> + Send;

    fn delete_image(&self, id: &str) -> impl Future<Output = Result<()>> + Send;

    fn pull_image(&self, reference: &str) -> impl Future<Output = Result<()>> + Send;

    fn list_workloads(
        &self,
        namespace: &str,
    ) -> impl Future<Output = Result<Vec<WorkloadSummary>>> + Send;

    fn list_workload_pods(
        &self,
        name: &str,
        namespace: &str,
    ) -> impl Future<Output = Result<Vec<WorkloadRecord>>> + Send;

    fn list_pods(&self, namespace: &str) -> impl Future<Output = Result<Vec<WorkloadRecord>>> + Send;

    fn pod_detail(
        &self,
        name: &str,
        namespace: &str,
    ) -> impl Future<Output = Result<DetailMap>> + Send;

    fn create_workload(
        &self,
        image: &str,
        name: &str,
        namespace: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn update_workload(
        &self,
        image: &str,
        name: &str,
        namespace: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Runs each command on its own task and reports exactly one completion per
/// dispatch on the shared channel.
pub struct Dispatcher<B> {
    backend: Arc<B>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl<B: Backend> Dispatcher<B> {
    pub fn new(backend: Arc<B>, completions: mpsc::UnboundedSender<Completion>) -> Self {
        Self {
            backend,
            completions,
        }
    }

    pub fn dispatch(&self, command: AppCommand) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let completions = self.completions.clone();

        tokio::spawn(async move {
            debug!("dispatch {}", command.describe());
            let task_command = command.clone();
            let task = tokio::spawn(async move {
                execute(backend.as_ref(), &task_command)
                    .await
                    .map_err(|error| compact_error(&error))
            });
            // A panicking backend call still has to release its pending marker.
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(join_error) => Err(format!("{} aborted: {join_error}", command.describe())),
            };
            if let Err(error) = &outcome {
                warn!("{} failed: {error}", command.describe());
            }
            // The receiver only goes away while the host is shutting down.
            let _ = completions.send(Completion { command, outcome });
        })
    }
}

pub async fn execute<B: Backend>(backend: &B, command: &AppCommand) -> Result<Payload> {
    match command {
        AppCommand::ListWorkloads { namespace } => backend
            .list_workloads(namespace)
            .await
            .map(Payload::Workloads),
        AppCommand::WorkloadPods { name, namespace } => backend
            .list_workload_pods(name, namespace)
            .await
            .map(Payload::Pods),
        AppCommand::RefreshImages => backend.list_images().await.map(Payload::Images),
        AppCommand::RefreshWorkloads { namespace } => {
            backend.list_pods(namespace).await.map(Payload::Pods)
        }
        AppCommand::DeleteImage { id } => {
            backend.delete_image(id).await?;
            Ok(Payload::None)
        }
        AppCommand::PullImage { reference } => {
            backend.pull_image(reference).await?;
            Ok(Payload::None)
        }
        AppCommand::FetchDetail { name, namespace } => backend
            .pod_detail(name, namespace)
            .await
            .map(Payload::Detail),
        AppCommand::CreateWorkload {
            image,
            name,
            namespace,
        } => {
            backend.create_workload(image, name, namespace).await?;
            Ok(Payload::None)
        }
        AppCommand::UpdateWorkload {
            image,
            name,
            namespace,
        } => {
            backend.update_workload(image, name, namespace).await?;
            Ok(Payload::None)
        }
    }
}

pub fn compact_error(error: &anyhow::Error) -> String {
    let mut out = Vec::new();
    for (index, cause) in error.chain().enumerate() {
        if index == 0 {
            out.push(cause.to_string());
        } else if index <= 2 {
            out.push(format!("caused by: {cause}"));
        } else {
            break;
        }
    }

    out.join("\n")
}
