use crate::cli::CliArgs;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const MIN_REFRESH_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LcrConfigFile {
    pub namespace: String,
    pub registry_host: String,
    pub cluster_registry_host: String,
    pub github: GithubConfig,
    pub refresh_ms: u64,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub branch: String,
    pub token: Option<String>,
    pub per_page: u32,
}

impl Default for LcrConfigFile {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            registry_host: default_registry_host().to_string(),
            cluster_registry_host: "localhost:5000".to_string(),
            github: GithubConfig::default(),
            refresh_ms: 5_000,
            log_file: None,
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            owner: None,
            repo: None,
            branch: "master".to_string(),
            token: None,
            per_page: 10,
        }
    }
}

impl LcrConfigFile {
    /// Loads the file config, then applies environment and CLI overrides.
    pub fn load(args: &CliArgs) -> Result<Self> {
        let path = args.config.clone().or_else(discover_config_path);
        let mut config = match path {
            Some(path) => Self::read(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.apply_cli(args);
        Ok(config)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let parsed = Self::parse(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        debug!("loaded config from {}", path.display());
        Ok(parsed)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = lookup("KUBERNETES_NAMESPACE") {
            self.namespace = value;
        }
        if let Some(value) = lookup("REGISTRY_HOST") {
            self.registry_host = value;
        }
        if let Some(value) = lookup("KUBERNETES_REGISTRY_HOST") {
            self.cluster_registry_host = value;
        }
        if let Some(value) = lookup("GITHUB_OWNER") {
            self.github.owner = Some(value);
        }
        if let Some(value) = lookup("GITHUB_REPO") {
            self.github.repo = Some(value);
        }
        if let Some(value) = lookup("GITHUB_BRANCH") {
            self.github.branch = value;
        }
        if let Some(value) = lookup("GITHUB_AUTH_TOKEN") {
            self.github.token = Some(value);
        }
    }

    pub fn apply_cli(&mut self, args: &CliArgs) {
        if let Some(namespace) = args
            .namespace
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            self.namespace = namespace.to_string();
        }
        if let Some(refresh_ms) = args.refresh_ms {
            self.refresh_ms = refresh_ms;
        }
        if let Some(log_file) = &args.log_file {
            self.log_file = Some(log_file.clone());
        }
        self.refresh_ms = self.refresh_ms.max(MIN_REFRESH_MS);
    }
}

fn default_registry_host() -> &'static str {
    if Path::new("/.dockerenv").exists() {
        "registry:5000"
    } else {
        "localhost:5000"
    }
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("LCR_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [
        PathBuf::from("lcr.yaml"),
        PathBuf::from("lcr.yml"),
        PathBuf::from(".lcr.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let user_candidates = [
            PathBuf::from(&home).join(".config/lcr/config.yaml"),
            PathBuf::from(&home).join(".config/lcr/config.yml"),
            PathBuf::from(&home).join(".lcr.yaml"),
        ];
        for candidate in user_candidates {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}
