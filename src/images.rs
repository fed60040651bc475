use anyhow::{Context, Result};
use chrono::DateTime;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as TokioCommand;
use tracing::{debug, warn};

use crate::model::ImageRecord;

const MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
const DOCKER_IMAGES_FORMAT: &str = "{{.ID}},{{.Repository}}:{{.Tag}},{{.Size}},{{.CreatedAt}}";
const DANGLING_REFERENCE: &str = "<none>:<none>";
const UNKNOWN: &str = "Unknown";
const REGISTRY_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default, Deserialize)]
struct Catalog {
    #[serde(default)]
    repositories: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct Descriptor {
    #[serde(default)]
    size: u64,
    #[serde(default)]
    digest: String,
}

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    config: Descriptor,
    #[serde(default)]
    layers: Vec<Descriptor>,
}

impl Manifest {
    fn total_size(&self) -> u64 {
        self.config.size + self.layers.iter().map(|layer| layer.size).sum::<u64>()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ImageConfig {
    #[serde(default)]
    created: Option<String>,
}

/// Lists images from the local registry, falling back to the docker daemon,
/// and runs image mutations through the docker CLI.
#[derive(Clone)]
pub struct ImageGateway {
    client: reqwest::Client,
    registry_host: String,
}

impl ImageGateway {
    pub fn new(registry_host: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REGISTRY_REQUEST_TIMEOUT)
            .build()
            .context("failed to build registry HTTP client")?;
        Ok(Self {
            client,
            registry_host: registry_host.into(),
        })
    }

    pub async fn list_images(&self) -> Result<Vec<ImageRecord>> {
        match self.registry_images().await {
            Ok(images) if !images.is_empty() => Ok(images),
            Ok(_) => {
                debug!("registry {} has no tagged images, using docker", self.registry_host);
                local_images().await
            }
            Err(error) => {
                debug!("registry {} unavailable: {error:#}", self.registry_host);
                local_images().await
            }
        }
    }

    pub async fn delete_image(&self, id: &str) -> Result<()> {
        run_docker(&["rmi", "-f", id])
            .await
            .with_context(|| format!("failed to delete image {id}"))?;
        Ok(())
    }

    pub async fn pull_image(&self, reference: &str) -> Result<()> {
        run_docker(&["pull", reference])
            .await
            .with_context(|| format!("failed to pull {reference}"))?;
        Ok(())
    }

    async fn registry_images(&self) -> Result<Vec<ImageRecord>> {
        let catalog: Catalog = self.get_json("/v2/_catalog", None).await?;

        let mut images = Vec::new();
        for repository in catalog.repositories {
            let tags = match self
                .get_json::<TagList>(&format!("/v2/{repository}/tags/list"), None)
                .await
            {
                Ok(list) => list.tags.unwrap_or_default(),
                Err(error) => {
                    warn!("failed to list tags for {repository}: {error:#}");
                    continue;
                }
            };

            for tag in tags {
                let (size, created_at) = self.image_metadata(&repository, &tag).await;
                images.push(ImageRecord {
                    id: format!("registry-{repository}-{tag}"),
                    reference: Some(format!("{}/{repository}:{tag}", self.registry_host)),
                    size,
                    created_at,
                });
            }
        }

        Ok(images)
    }

    async fn image_metadata(&self, repository: &str, tag: &str) -> (String, String) {
        let manifest = match self
            .get_json::<Manifest>(
                &format!("/v2/{repository}/manifests/{tag}"),
                Some(MANIFEST_V2),
            )
            .await
        {
            Ok(manifest) => manifest,
            Err(error) => {
                debug!("no manifest for {repository}:{tag}: {error:#}");
                return (UNKNOWN.to_string(), UNKNOWN.to_string());
            }
        };

        let size = format_bytes(manifest.total_size());
        if manifest.config.digest.is_empty() {
            return (size, UNKNOWN.to_string());
        }

        let created_at = self
            .get_json::<ImageConfig>(
                &format!("/v2/{repository}/blobs/{}", manifest.config.digest),
                None,
            )
            .await
            .ok()
            .and_then(|config| config.created)
            .and_then(|created| format_created(&created))
            .unwrap_or_else(|| UNKNOWN.to_string());

        (size, created_at)
    }

    async fn get_json<T>(&self, path: &str, accept: Option<&str>) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("http://{}{path}", self.registry_host);
        let mut request = self.client.get(&url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?
            .error_for_status()
            .with_context(|| format!("registry rejected {url}"))?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to parse response from {url}"))
    }
}

async fn local_images() -> Result<Vec<ImageRecord>> {
    let output = run_docker(&["images", "--format", DOCKER_IMAGES_FORMAT])
        .await
        .context("failed to get docker images")?;
    Ok(parse_docker_images(&output))
}

async fn run_docker(args: &[&str]) -> Result<String> {
    let output = TokioCommand::new("docker")
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .context("failed to execute docker")?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(anyhow::anyhow!(
            "docker {} exited with {}: {}",
            args.first().copied().unwrap_or_default(),
            output.status,
            stderr.trim()
        ))
    }
}

/// Parses `docker images` output in the `ID,REPO:TAG,SIZE,CREATED` format.
pub fn parse_docker_images(output: &str) -> Vec<ImageRecord> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let mut parts = line.splitn(4, ',');
            let id = parts.next()?.trim();
            let reference = parts.next()?.trim();
            let size = parts.next()?.trim();
            let created_at = parts.next()?.trim();

            Some(ImageRecord {
                id: id.to_string(),
                reference: (!reference.is_empty() && reference != DANGLING_REFERENCE)
                    .then(|| reference.to_string()),
                size: size.to_string(),
                created_at: created_at.to_string(),
            })
        })
        .collect()
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1}{}", UNITS[unit])
}

fn format_created(created: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(created)
        .ok()
        .map(|value| value.format("%Y-%m-%d %H:%M:%S").to_string())
}
