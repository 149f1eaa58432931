//! GitHub project data: scraped page text plus latest release metadata.

use std::time::Duration;

use async_trait::async_trait;
use nixpack_core::{ProjectData, ProjectDataProvider, ReleaseMetadata};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::html::html_to_text;
use crate::Result;

const GITHUB_API: &str = "https://api.github.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// `(owner, repo)` of a `https://github.com/<owner>/<repo>[/...]` URL.
pub fn parse_github_repo(url: &str) -> Result<(String, String)> {
    let rest = url
        .trim()
        .strip_prefix("https://")
        .or_else(|| url.trim().strip_prefix("http://"))
        .and_then(|r| r.strip_prefix("github.com/").or_else(|| r.strip_prefix("www.github.com/")))
        .ok_or_else(|| SourceError::InvalidUrl(url.to_string()))?;

    let mut parts = rest.split('/').filter(|p| !p.is_empty());
    match (parts.next(), parts.next()) {
        (Some(owner), Some(repo)) => Ok((
            owner.to_string(),
            repo.trim_end_matches(".git").to_string(),
        )),
        _ => Err(SourceError::InvalidUrl(url.to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct ReleaseJson {
    tag_name: String,
    name: Option<String>,
    published_at: Option<String>,
    tarball_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagJson {
    name: String,
    tarball_url: Option<String>,
}

/// Parse a `releases/latest` response body.
pub fn release_from_json(body: &str) -> serde_json::Result<ReleaseMetadata> {
    let release: ReleaseJson = serde_json::from_str(body)?;
    Ok(ReleaseMetadata {
        tag: release.tag_name,
        name: release.name.filter(|n| !n.is_empty()),
        published_at: release.published_at,
        tarball_url: release.tarball_url,
    })
}

/// Parse a `tags` response body; the first tag is the newest.
pub fn latest_tag_from_json(body: &str) -> serde_json::Result<Option<ReleaseMetadata>> {
    let tags: Vec<TagJson> = serde_json::from_str(body)?;
    Ok(tags.into_iter().next().map(|tag| ReleaseMetadata {
        tag: tag.name,
        name: None,
        published_at: None,
        tarball_url: tag.tarball_url,
    }))
}

pub struct GithubProjectProvider {
    http_client: Client,
    api_base: String,
    token: Option<String>,
}

impl GithubProjectProvider {
    /// Uses `GITHUB_TOKEN` for API calls when set.
    pub fn new() -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent(concat!("nixpack-project-sources/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http_client,
            api_base: GITHUB_API.to_string(),
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
        })
    }

    /// Point API calls somewhere else (GitHub Enterprise, a proxy).
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub async fn page_text(&self, url: &str) -> Result<String> {
        let response = self.http_client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Http { url: url.to_string(), status: status.as_u16() });
        }
        let html = response.text().await?;
        Ok(html_to_text(&html))
    }

    /// Latest release, falling back to the newest tag. `None` when the
    /// project has neither.
    pub async fn latest_release(&self, owner: &str, repo: &str) -> Result<Option<ReleaseMetadata>> {
        let url = format!("{}/repos/{owner}/{repo}/releases/latest", self.api_base);
        let (status, body) = self.api_get(&url).await?;
        if status.is_success() {
            return release_from_json(&body)
                .map(Some)
                .map_err(|e| SourceError::InvalidResponse { url, message: e.to_string() });
        }
        if status != StatusCode::NOT_FOUND {
            return Err(SourceError::Http { url, status: status.as_u16() });
        }

        info!(owner, repo, "no releases, trying tags");
        let url = format!("{}/repos/{owner}/{repo}/tags", self.api_base);
        let (status, body) = self.api_get(&url).await?;
        if !status.is_success() {
            return Err(SourceError::Http { url, status: status.as_u16() });
        }
        latest_tag_from_json(&body)
            .map_err(|e| SourceError::InvalidResponse { url, message: e.to_string() })
    }

    async fn api_get(&self, url: &str) -> Result<(StatusCode, String)> {
        debug!(url, "GitHub API request");
        let mut request = self
            .http_client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        Ok((status, response.text().await?))
    }
}

#[async_trait]
impl ProjectDataProvider for GithubProjectProvider {
    async fn fetch(&self, url: &str) -> nixpack_core::Result<ProjectData> {
        let page_text = self.page_text(url).await?;
        info!(url, chars = page_text.len(), "fetched project page");

        let release = match parse_github_repo(url) {
            Ok((owner, repo)) => match self.latest_release(&owner, &repo).await {
                Ok(release) => release,
                Err(e) => {
                    warn!(error = %e, "release lookup failed, continuing without it");
                    None
                }
            },
            Err(_) => {
                warn!(url, "not a GitHub URL, skipping release lookup");
                None
            }
        };

        Ok(ProjectData { url: url.to_string(), page_text, release })
    }
}
