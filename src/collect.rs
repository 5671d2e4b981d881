//! Repository data collection.
//!
//! Gathers everything one analysis attempt needs from the hosting API
//! (metadata, README, ranked file subset, file-content snippets, issues),
//! routing every fetch through the shared cache so a re-analysis inside the
//! TTL window costs no external calls.

use std::sync::Arc;

use crate::cache::Cache;
use crate::config::AnalysisConfig;
use crate::error::{LensError, Result};
use crate::github::{RepoHost, RepoMetadata};
use crate::models::{IssueSummary, RankedFile};
use crate::rank;

/// Everything the single-call analyzer needs, assembled once per attempt.
#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    pub repo_name: String,
    pub metadata: RepoMetadata,
    pub readme: Option<String>,
    pub files: Vec<RankedFile>,
    /// `(path, snippet)` for the top-ranked files, already truncated.
    pub file_contents: Vec<(String, String)>,
    pub open_issues: Vec<IssueSummary>,
    pub closed_issues: Vec<IssueSummary>,
}

pub struct Collector {
    host: Arc<dyn RepoHost>,
    cache: Arc<Cache>,
    config: AnalysisConfig,
}

impl Collector {
    pub fn new(host: Arc<dyn RepoHost>, cache: Arc<Cache>, config: AnalysisConfig) -> Self {
        Self {
            host,
            cache,
            config,
        }
    }

    /// Collect and rank repository data. Strictly sequential; every hosting
    /// API response is cached under a deterministic key.
    pub async fn collect(&self, owner: &str, repo: &str) -> Result<AnalysisContext> {
        tracing::info!(owner, repo, "collecting repository data");

        let metadata = self.metadata(owner, repo).await?;
        let readme = self.readme(owner, repo).await?;
        let tree = self.tree(owner, repo, metadata.default_branch.as_deref()).await?;

        let files = rank::rank_files(&tree, self.config.max_files);
        tracing::debug!(
            total = tree.len(),
            ranked = files.len(),
            "ranked repository tree"
        );

        let file_contents = self.contents(owner, repo, &files).await?;

        let open_issues = self
            .issues(owner, repo, "open", self.config.open_issues)
            .await?;
        let closed_issues = self
            .issues(owner, repo, "closed", self.config.closed_issues)
            .await?;

        tracing::info!(
            files = files.len(),
            snippets = file_contents.len(),
            open = open_issues.len(),
            closed = closed_issues.len(),
            "repository data collected"
        );

        Ok(AnalysisContext {
            repo_name: format!("{owner}/{repo}"),
            metadata,
            readme,
            files,
            file_contents,
            open_issues,
            closed_issues,
        })
    }

    async fn metadata(&self, owner: &str, repo: &str) -> Result<RepoMetadata> {
        let key = Cache::key("github:metadata", &[owner, repo]);
        let value = self
            .cache
            .get_or_fetch(&key, None, || async {
                let meta = self.host.get_metadata(owner, repo).await?;
                Ok::<_, LensError>(serde_json::json!({
                    "primary_language": meta.primary_language,
                    "created_at": meta.created_at,
                    "default_branch": meta.default_branch,
                }))
            })
            .await?;

        Ok(RepoMetadata {
            primary_language: value
                .get("primary_language")
                .and_then(|v| v.as_str())
                .map(String::from),
            created_at: value
                .get("created_at")
                .and_then(|v| v.as_str())
                .map(String::from),
            default_branch: value
                .get("default_branch")
                .and_then(|v| v.as_str())
                .map(String::from),
        })
    }

    async fn readme(&self, owner: &str, repo: &str) -> Result<Option<String>> {
        let key = Cache::key("github:readme", &[owner, repo]);
        let value = self
            .cache
            .get_or_fetch(&key, None, || async {
                let readme = self.host.get_readme(owner, repo).await?;
                Ok::<_, LensError>(serde_json::json!(readme))
            })
            .await?;

        Ok(value.as_str().map(String::from))
    }

    async fn tree(
        &self,
        owner: &str,
        repo: &str,
        branch: Option<&str>,
    ) -> Result<Vec<crate::models::TreeEntry>> {
        let branch = branch.unwrap_or("main");
        let key = Cache::key("github:tree", &[owner, repo, branch]);
        let value = self
            .cache
            .get_or_fetch(&key, None, || async {
                let tree = self.host.get_tree(owner, repo, branch).await?;
                let entries: Vec<serde_json::Value> = tree
                    .iter()
                    .map(|e| {
                        serde_json::json!({
                            "path": e.path,
                            "type": e.entry_type,
                            "size": e.size,
                        })
                    })
                    .collect();
                Ok::<_, LensError>(serde_json::Value::Array(entries))
            })
            .await?;

        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    /// Fetch snippets for the top-ranked files. Oversized contents are
    /// dropped; kept contents are truncated to the snippet budget.
    async fn contents(
        &self,
        owner: &str,
        repo: &str,
        files: &[RankedFile],
    ) -> Result<Vec<(String, String)>> {
        let mut contents = Vec::new();

        for file in files.iter().take(self.config.content_files) {
            let key = Cache::key("github:content", &[owner, repo, &file.path]);
            let value = self
                .cache
                .get_or_fetch(&key, None, || async {
                    let content = self.host.get_file_content(owner, repo, &file.path).await?;
                    Ok::<_, LensError>(serde_json::json!(content))
                })
                .await?;

            if let Some(text) = value.as_str() {
                if text.len() < self.config.max_file_bytes {
                    let snippet: String = text.chars().take(self.config.snippet_chars).collect();
                    contents.push((file.path.clone(), snippet));
                }
            }
        }

        Ok(contents)
    }

    async fn issues(
        &self,
        owner: &str,
        repo: &str,
        state: &str,
        max: usize,
    ) -> Result<Vec<IssueSummary>> {
        let max_str = max.to_string();
        let key = Cache::key("github:issues", &[owner, repo, state, &max_str]);
        let value = self
            .cache
            .get_or_fetch(&key, None, || async {
                let issues = self.host.get_issues(owner, repo, state, max).await?;
                let entries: Vec<serde_json::Value> = issues
                    .iter()
                    .map(|i| {
                        serde_json::json!({
                            "number": i.number,
                            "title": i.title,
                            "state": i.state,
                        })
                    })
                    .collect();
                Ok::<_, LensError>(serde_json::Value::Array(entries))
            })
            .await?;

        let issues = value
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|item| {
                        Some(IssueSummary {
                            number: item.get("number")?.as_i64()?,
                            title: item.get("title")?.as_str()?.to_string(),
                            state: item.get("state")?.as_str()?.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(issues)
    }
}
