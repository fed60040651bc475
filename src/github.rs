use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::GithubConfig;
use crate::model::CommitRecord;

const GITHUB_API_URL: &str = "https://api.github.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct CommitEnvelope {
    sha: String,
    commit: CommitBody,
}

#[derive(Debug, Deserialize)]
struct CommitBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    author: Option<CommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

pub struct CommitGateway {
    client: reqwest::Client,
    config: GithubConfig,
}

impl CommitGateway {
    pub fn new(config: GithubConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build GitHub HTTP client")?;
        Ok(Self { client, config })
    }

    pub async fn list_commits(&self) -> Result<Vec<CommitRecord>> {
        let (Some(owner), Some(repo)) = (self.config.owner.as_deref(), self.config.repo.as_deref())
        else {
            debug!("GitHub owner or repository not configured, skipping commits");
            return Ok(Vec::new());
        };

        let url = format!("{GITHUB_API_URL}/repos/{owner}/{repo}/commits");
        let per_page = self.config.per_page.to_string();
        let mut request = self
            .client
            .get(&url)
            .query(&[
                ("sha", self.config.branch.as_str()),
                ("per_page", per_page.as_str()),
                ("page", "1"),
            ])
            .header(USER_AGENT, concat!("lcr/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = self.config.token.as_deref().filter(|token| !token.is_empty()) {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let commits = request
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?
            .error_for_status()
            .with_context(|| format!("GitHub rejected commits request for {owner}/{repo}"))?
            .json::<Vec<CommitEnvelope>>()
            .await
            .context("failed to parse GitHub commits response")?;

        debug!("fetched {} commits from {owner}/{repo}", commits.len());
        Ok(commits.into_iter().map(commit_record).collect())
    }
}

fn commit_record(envelope: CommitEnvelope) -> CommitRecord {
    let author = envelope.commit.author;
    CommitRecord {
        sha: envelope.sha,
        message: envelope.commit.message,
        author: author.as_ref().and_then(|author| author.name.clone()),
        pushed_at: author
            .and_then(|author| author.date)
            .and_then(|date| format_commit_date(&date)),
    }
}

fn format_commit_date(date: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(date).ok().map(|value| {
        value
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    })
}
