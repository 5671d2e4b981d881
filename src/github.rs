//! Hosting-API collaborator.
//!
//! The pipeline consumes the hosting API through the narrow [`RepoHost`]
//! trait; [`GithubClient`] is the production implementation against the
//! GitHub REST API. Tests substitute their own implementations.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::error::{LensError, Result};
use crate::models::{IssueSummary, TreeEntry};

/// Repository metadata the pipeline keeps from the hosting API.
#[derive(Debug, Clone, Default)]
pub struct RepoMetadata {
    pub primary_language: Option<String>,
    pub created_at: Option<String>,
    pub default_branch: Option<String>,
}

/// Narrow contract over the repository hosting API.
#[async_trait]
pub trait RepoHost: Send + Sync {
    async fn get_metadata(&self, owner: &str, repo: &str) -> Result<RepoMetadata>;

    /// README body, or `None` when the repository has none.
    async fn get_readme(&self, owner: &str, repo: &str) -> Result<Option<String>>;

    /// Flat recursive tree listing for `branch`, falling back to `main`
    /// then `master`.
    async fn get_tree(&self, owner: &str, repo: &str, branch: &str) -> Result<Vec<TreeEntry>>;

    /// Raw content of one file, or `None` when unreadable.
    async fn get_file_content(&self, owner: &str, repo: &str, path: &str)
        -> Result<Option<String>>;

    /// Issues in the given state, newest-updated first, pull requests
    /// excluded.
    async fn get_issues(
        &self,
        owner: &str,
        repo: &str,
        state: &str,
        max_issues: usize,
    ) -> Result<Vec<IssueSummary>>;
}

/// Parse a GitHub repository URL into `(owner, name)`.
///
/// Accepts `https://github.com/owner/repo`, with or without scheme, `www.`,
/// a trailing slash, or a `.git` suffix. Anything not on github.com is
/// rejected.
pub fn parse_repo_url(url: &str) -> Result<(String, String)> {
    let trimmed = url.trim().trim_end_matches('/').trim_end_matches(".git");

    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let without_www = without_scheme.strip_prefix("www.").unwrap_or(without_scheme);

    let rest = without_www
        .strip_prefix("github.com/")
        .ok_or_else(|| LensError::InvalidUrl(url.to_string()))?;

    let mut parts = rest.split('/');
    let owner = parts.next().unwrap_or("");
    let name = parts.next().unwrap_or("");

    if owner.is_empty() || name.is_empty() {
        return Err(LensError::InvalidUrl(url.to_string()));
    }

    Ok((owner.to_string(), name.to_string()))
}

/// GitHub REST API client with bounded timeouts.
///
/// Reads `GITHUB_TOKEN` from the environment at construction; unauthenticated
/// use works but hits the low anonymous rate limit.
pub struct GithubClient {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(api_base: String, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("repolens/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LensError::Other(e.to_string()))?;

        Ok(Self {
            client,
            api_base,
            token: std::env::var("GITHUB_TOKEN").ok(),
        })
    }

    async fn get_json(&self, url: &str, owner: &str, repo: &str) -> Result<Value> {
        let mut req = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github.v3+json");
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("token {token}"));
        }

        let response = req.send().await?;
        let status = response.status();

        if status.as_u16() == 404 {
            return Err(LensError::HostNotFound(format!("{owner}/{repo}")));
        }
        if status.as_u16() == 403 || status.as_u16() == 429 {
            return Err(LensError::HostRateLimited);
        }
        if !status.is_success() {
            return Err(LensError::Network(format!(
                "GitHub API error {status} for {url}"
            )));
        }

        Ok(response.json().await?)
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(LensError::Network(format!(
                "download failed with {} for {url}",
                response.status()
            )));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl RepoHost for GithubClient {
    async fn get_metadata(&self, owner: &str, repo: &str) -> Result<RepoMetadata> {
        let url = format!("{}/repos/{owner}/{repo}", self.api_base);
        let json = self.get_json(&url, owner, repo).await?;

        Ok(RepoMetadata {
            primary_language: json
                .get("language")
                .and_then(|v| v.as_str())
                .map(String::from),
            created_at: json
                .get("created_at")
                .and_then(|v| v.as_str())
                .map(String::from),
            default_branch: json
                .get("default_branch")
                .and_then(|v| v.as_str())
                .map(String::from),
        })
    }

    async fn get_readme(&self, owner: &str, repo: &str) -> Result<Option<String>> {
        let url = format!("{}/repos/{owner}/{repo}/readme", self.api_base);
        let json = match self.get_json(&url, owner, repo).await {
            Ok(json) => json,
            // A missing README is expected absence, not a failure.
            Err(LensError::HostNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        match json.get("download_url").and_then(|v| v.as_str()) {
            Some(download) => Ok(Some(self.get_text(download).await?)),
            None => Ok(None),
        }
    }

    async fn get_tree(&self, owner: &str, repo: &str, branch: &str) -> Result<Vec<TreeEntry>> {
        let mut last_err = None;
        let mut tried = vec![branch.to_string()];
        for fallback in ["main", "master"] {
            if !tried.contains(&fallback.to_string()) {
                tried.push(fallback.to_string());
            }
        }

        for candidate in &tried {
            let url = format!(
                "{}/repos/{owner}/{repo}/git/trees/{candidate}?recursive=1",
                self.api_base
            );
            match self.get_json(&url, owner, repo).await {
                Ok(json) => {
                    let entries = json
                        .get("tree")
                        .and_then(|v| v.as_array())
                        .map(|arr| {
                            arr.iter()
                                .filter_map(|e| serde_json::from_value(e.clone()).ok())
                                .collect()
                        })
                        .unwrap_or_default();
                    return Ok(entries);
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.unwrap_or_else(|| LensError::Other("no branch candidates".to_string())))
    }

    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> Result<Option<String>> {
        let url = format!("{}/repos/{owner}/{repo}/contents/{path}", self.api_base);
        let json = match self.get_json(&url, owner, repo).await {
            Ok(json) => json,
            Err(LensError::HostNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        match json.get("download_url").and_then(|v| v.as_str()) {
            Some(download) => Ok(Some(self.get_text(download).await?)),
            None => Ok(None),
        }
    }

    async fn get_issues(
        &self,
        owner: &str,
        repo: &str,
        state: &str,
        max_issues: usize,
    ) -> Result<Vec<IssueSummary>> {
        let url = format!(
            "{}/repos/{owner}/{repo}/issues?state={state}&per_page={}&sort=updated&direction=desc",
            self.api_base,
            max_issues.min(100)
        );
        let json = self.get_json(&url, owner, repo).await?;

        let issues = json
            .as_array()
            .map(|arr| {
                arr.iter()
                    // The issues endpoint also lists pull requests.
                    .filter(|item| item.get("pull_request").is_none())
                    .filter_map(|item| {
                        Some(IssueSummary {
                            number: item.get("number")?.as_i64()?,
                            title: item.get("title")?.as_str()?.to_string(),
                            state: item
                                .get("state")
                                .and_then(|v| v.as_str())
                                .unwrap_or(state)
                                .to_string(),
                        })
                    })
                    .take(max_issues)
                    .collect()
            })
            .unwrap_or_default();

        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_https_url() {
        let (owner, repo) = parse_repo_url("https://github.com/acme/widgets").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(repo, "widgets");
    }

    #[test]
    fn test_parse_git_suffix_and_trailing_slash() {
        let (owner, repo) = parse_repo_url("https://github.com/acme/widgets.git/").unwrap();
        assert_eq!((owner.as_str(), repo.as_str()), ("acme", "widgets"));
    }

    #[test]
    fn test_parse_bare_and_www_forms() {
        assert!(parse_repo_url("github.com/acme/widgets").is_ok());
        assert!(parse_repo_url("http://www.github.com/acme/widgets").is_ok());
    }

    #[test]
    fn test_parse_rejects_other_hosts_and_partial_paths() {
        assert!(parse_repo_url("https://gitlab.com/acme/widgets").is_err());
        assert!(parse_repo_url("https://github.com/acme").is_err());
        assert!(parse_repo_url("https://github.com//widgets").is_err());
        assert!(parse_repo_url("not a url").is_err());
    }
}
