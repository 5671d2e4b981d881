//! Analysis lifecycle coordination.
//!
//! `start_analysis` registers the repository and a `processing` session,
//! then runs the pipeline on a background task so callers get the
//! repository id immediately and poll for status. `run_analysis` is the
//! same pipeline awaited inline, for the CLI's `--wait` mode.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::analyzer;
use crate::cache::Cache;
use crate::collect::Collector;
use crate::compare::{self, ComparisonKind, ComparisonReport, RepoSnapshot};
use crate::config::Config;
use crate::error::{LensError, Result};
use crate::github::{parse_repo_url, RepoHost};
use crate::llm::TextModel;
use crate::models::{QaRecord, Repository, StatusReport};
use crate::qa::QaEngine;
use crate::schema::RepositoryAnalysis;
use crate::store::Store;

pub struct Orchestrator {
    store: Arc<Store>,
    host: Arc<dyn RepoHost>,
    model: Arc<dyn TextModel>,
    cache: Arc<Cache>,
    config: Config,
}

/// What `start_analysis` hands back before the pipeline runs.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AnalysisTicket {
    pub repo_id: String,
    pub status: String,
}

impl Orchestrator {
    pub fn new(
        store: Arc<Store>,
        host: Arc<dyn RepoHost>,
        model: Arc<dyn TextModel>,
        cache: Arc<Cache>,
        config: Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            host,
            model,
            cache,
            config,
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Register the repository, open a session, and run the pipeline in
    /// the background. Re-analysis of a known URL reuses the repository
    /// row and opens a fresh session.
    pub async fn start_analysis(self: &Arc<Self>, repo_url: &str) -> Result<AnalysisTicket> {
        let (repo, session_id) = self.register(repo_url).await?;

        let this = Arc::clone(self);
        let repo_clone = repo.clone();
        let session_clone = session_id.clone();
        tokio::spawn(async move {
            this.execute(&repo_clone, &session_clone).await;
        });

        Ok(AnalysisTicket {
            repo_id: repo.id,
            status: "processing".to_string(),
        })
    }

    /// Same pipeline, awaited to completion. Returns the repository id.
    pub async fn run_analysis(self: &Arc<Self>, repo_url: &str) -> Result<String> {
        let (repo, session_id) = self.register(repo_url).await?;
        self.execute(&repo, &session_id).await;
        Ok(repo.id)
    }

    async fn register(&self, repo_url: &str) -> Result<(Repository, String)> {
        let (owner, name) = parse_repo_url(repo_url)?;
        let canonical = format!("https://github.com/{owner}/{name}");
        let repo = self
            .store
            .find_or_create_repository(&canonical, &owner, &name)
            .await?;
        let session = self.store.create_session(&repo.id).await?;
        info!(repo = %repo.full_name(), session = %session.id, "analysis session opened");
        Ok((repo, session.id))
    }

    /// Collect, analyze, persist. Collection or persistence failure marks
    /// the session failed; model failure does not, because the analyzer
    /// falls back to a degraded result that still completes the session.
    async fn execute(&self, repo: &Repository, session_id: &str) {
        let collector = Collector::new(
            Arc::clone(&self.host),
            Arc::clone(&self.cache),
            self.config.analysis.clone(),
        );

        let context = match collector.collect(&repo.owner, &repo.name).await {
            Ok(context) => context,
            Err(e) => {
                error!(repo = %repo.full_name(), "collection failed: {e}");
                self.fail_session(session_id, &e.classified_message()).await;
                return;
            }
        };

        let outcome = analyzer::analyze(self.model.as_ref(), &self.config.analysis, &context).await;

        let repo_created_at = context
            .metadata
            .created_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc));

        if let Err(e) = self
            .store
            .save_analysis(
                &repo.id,
                session_id,
                &outcome.analysis,
                &outcome.model_version,
                outcome.calls_made,
                context.metadata.primary_language.as_deref(),
                repo_created_at,
            )
            .await
        {
            error!(repo = %repo.full_name(), "persistence failed: {e}");
            self.fail_session(session_id, &e.classified_message()).await;
            return;
        }

        info!(
            repo = %repo.full_name(),
            model = %outcome.model_version,
            calls = outcome.calls_made,
            "analysis completed"
        );
    }

    async fn fail_session(&self, session_id: &str, message: &str) {
        // A failed failure-write leaves the session processing; the row is
        // still visible for inspection.
        if let Err(e) = self.store.mark_session_failed(session_id, message).await {
            error!(session = %session_id, "could not mark session failed: {e}");
        }
    }

    pub async fn get_status(&self, repo_id: &str) -> Result<StatusReport> {
        self.store.status_report(repo_id).await
    }

    pub async fn get_analysis(&self, repo_id: &str) -> Result<RepositoryAnalysis> {
        self.store.load_analysis(repo_id).await
    }

    pub async fn ask(&self, repo_id: &str, question: &str) -> Result<QaRecord> {
        let engine = QaEngine::new(Arc::clone(&self.store), Arc::clone(&self.model));
        engine.answer(repo_id, question).await
    }

    /// Compare stored analyses across 2-5 repositories. Repositories whose
    /// analysis is missing or unfinished are skipped; at least two loadable
    /// analyses are required.
    pub async fn compare(
        &self,
        repo_ids: &[String],
        kind: ComparisonKind,
    ) -> Result<ComparisonReport> {
        if repo_ids.len() < compare::MIN_REPOS || repo_ids.len() > compare::MAX_REPOS {
            return Err(LensError::Validation(format!(
                "comparison requires {} to {} repository ids, got {}",
                compare::MIN_REPOS,
                compare::MAX_REPOS,
                repo_ids.len()
            )));
        }

        let mut snapshots = Vec::with_capacity(repo_ids.len());
        for repo_id in repo_ids {
            let repo = match self.store.repository_by_id(repo_id).await? {
                Some(repo) => repo,
                None => {
                    warn!(repo_id = %repo_id, "comparison skipping unknown repository");
                    continue;
                }
            };
            match self.store.load_analysis(repo_id).await {
                Ok(analysis) => snapshots.push(RepoSnapshot {
                    name: repo.full_name(),
                    analysis,
                }),
                Err(LensError::NotFound(_) | LensError::Processing(_) | LensError::Failed(_)) => {
                    warn!(repo = %repo.full_name(), "comparison skipping repository without a completed analysis");
                }
                Err(e) => return Err(e),
            }
        }

        if snapshots.len() < compare::MIN_REPOS {
            return Err(LensError::Validation(
                "comparison needs at least 2 repositories with completed analyses".to_string(),
            ));
        }

        Ok(compare::compare(kind, &snapshots))
    }
}
