//! End-to-end pipeline tests against a temporary SQLite database, with the
//! hosting API and generative model replaced by in-process doubles.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use repolens::cache::Cache;
use repolens::config::{Config, DbConfig, ServerConfig};
use repolens::db;
use repolens::error::{LensError, Result};
use repolens::github::{RepoHost, RepoMetadata};
use repolens::llm::TextModel;
use repolens::migrate;
use repolens::models::{IssueSummary, SessionStatus, TreeEntry};
use repolens::compare::{ComparisonKind, ComparisonReport};
use repolens::orchestrate::Orchestrator;
use repolens::store::Store;

// ============ Doubles ============

/// A hosting API double serving one small fixed repository.
struct FakeHost {
    fail_metadata: bool,
}

impl FakeHost {
    fn healthy() -> Self {
        Self {
            fail_metadata: false,
        }
    }

    fn missing_repo() -> Self {
        Self {
            fail_metadata: true,
        }
    }
}

#[async_trait]
impl RepoHost for FakeHost {
    async fn get_metadata(&self, owner: &str, repo: &str) -> Result<RepoMetadata> {
        if self.fail_metadata {
            return Err(LensError::HostNotFound(format!("{owner}/{repo}")));
        }
        Ok(RepoMetadata {
            primary_language: Some("Python".to_string()),
            created_at: Some("2021-06-01T12:00:00Z".to_string()),
            default_branch: Some("main".to_string()),
        })
    }

    async fn get_readme(&self, _owner: &str, _repo: &str) -> Result<Option<String>> {
        Ok(Some("# Demo\nA small demo project.".to_string()))
    }

    async fn get_tree(&self, _owner: &str, _repo: &str, _branch: &str) -> Result<Vec<TreeEntry>> {
        Ok(vec![
            TreeEntry {
                path: "main.py".to_string(),
                entry_type: "blob".to_string(),
                size: 512,
            },
            TreeEntry {
                path: "requirements.txt".to_string(),
                entry_type: "blob".to_string(),
                size: 64,
            },
            TreeEntry {
                path: "src/core.py".to_string(),
                entry_type: "blob".to_string(),
                size: 2048,
            },
        ])
    }

    async fn get_file_content(
        &self,
        _owner: &str,
        _repo: &str,
        path: &str,
    ) -> Result<Option<String>> {
        Ok(Some(format!("# contents of {path}\nprint('hello')\n")))
    }

    async fn get_issues(
        &self,
        _owner: &str,
        _repo: &str,
        state: &str,
        _max_issues: usize,
    ) -> Result<Vec<IssueSummary>> {
        Ok(vec![IssueSummary {
            number: 7,
            title: format!("sample {state} issue"),
            state: state.to_string(),
        }])
    }
}

/// A hosting API double whose metadata fetch never returns in time.
struct TimeoutHost;

#[async_trait]
impl RepoHost for TimeoutHost {
    async fn get_metadata(&self, owner: &str, repo: &str) -> Result<RepoMetadata> {
        Err(LensError::Timeout(format!(
            "metadata fetch for {owner}/{repo} timed out"
        )))
    }

    async fn get_readme(&self, _owner: &str, _repo: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn get_tree(&self, _owner: &str, _repo: &str, _branch: &str) -> Result<Vec<TreeEntry>> {
        Ok(vec![])
    }

    async fn get_file_content(
        &self,
        _owner: &str,
        _repo: &str,
        _path: &str,
    ) -> Result<Option<String>> {
        Ok(None)
    }

    async fn get_issues(
        &self,
        _owner: &str,
        _repo: &str,
        _state: &str,
        _max_issues: usize,
    ) -> Result<Vec<IssueSummary>> {
        Ok(vec![])
    }
}

/// A model double that counts invocations and replays a canned response.
struct FakeModel {
    response: String,
    calls: AtomicU32,
}

impl FakeModel {
    fn replying(response: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            response: response.into(),
            calls: AtomicU32::new(0),
        })
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextModel for FakeModel {
    fn model_name(&self) -> &str {
        "fake-model-1"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.response.is_empty() {
            Err(LensError::Network("connection reset".to_string()))
        } else {
            Ok(self.response.clone())
        }
    }
}

/// A model that reports itself unreachable.
struct UnavailableModel {
    calls: AtomicU32,
}

#[async_trait]
impl TextModel for UnavailableModel {
    fn model_name(&self) -> &str {
        "unavailable"
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(LensError::Other("should never be called".to_string()))
    }
}

// ============ Fixtures ============

fn valid_model_response(tech_name: &str) -> String {
    let summary = "A small demonstration project used to exercise the analysis pipeline. "
        .repeat(4);
    serde_json::json!({
        "summary": summary.trim(),
        "purpose": "Demonstrates the pipeline end to end.",
        "tech_stack": [
            {"name": tech_name, "category": "language", "version": "3.11"}
        ],
        "primary_language": "Python",
        "architecture_pattern": "script",
        "components": [
            {"name": "core", "purpose": "Main logic", "files": ["src/core.py"]}
        ],
        "data_flow": "Input is read from stdin and printed to stdout.",
        "key_files": [
            {"path": "main.py", "role": "entry_point", "purpose": "CLI entry"}
        ],
        "setup_steps": ["Install Python 3.11", "Run python main.py"],
        "contribution_areas": ["test coverage"],
        "risky_areas": ["no input validation"],
        "known_issues": [],
        "confidence_score": 0.9
    })
    .to_string()
}

async fn test_harness(model: Arc<dyn TextModel>) -> (TempDir, Arc<Orchestrator>) {
    let dir = TempDir::new().unwrap();
    let config = Config {
        db: DbConfig {
            path: dir.path().join("test.db"),
        },
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        },
        github: Default::default(),
        llm: Default::default(),
        cache: Default::default(),
        analysis: Default::default(),
    };

    let pool = db::connect(&config).await.unwrap();
    migrate::create_schema(&pool).await.unwrap();

    let store = Arc::new(Store::new(pool));
    let cache = Arc::new(Cache::new(config.cache.default_ttl_secs));
    let host = Arc::new(FakeHost::healthy());
    let orchestrator = Orchestrator::new(store, host, model, cache, config);

    (dir, orchestrator)
}

// ============ Lifecycle ============

#[tokio::test]
async fn analysis_completes_and_persists_structured_result() {
    let model = FakeModel::replying(valid_model_response("Python"));
    let (_dir, orchestrator) = test_harness(model.clone()).await;

    let repo_id = orchestrator
        .run_analysis("https://github.com/demo/project")
        .await
        .unwrap();

    let report = orchestrator.get_status(&repo_id).await.unwrap();
    assert_eq!(report.status, "completed");
    assert!(report.completed_at.is_some());
    assert!(report.error_message.is_none());

    let analysis = orchestrator.get_analysis(&repo_id).await.unwrap();
    assert!(!analysis.tech_stack.is_empty());
    assert_eq!(analysis.tech_stack[0].name, "Python");
    assert_eq!(analysis.setup_steps.len(), 2);
    assert_eq!(analysis.primary_language, "Python");
}

#[tokio::test]
async fn exactly_one_model_call_per_analysis() {
    let model = FakeModel::replying(valid_model_response("Python"));
    let (_dir, orchestrator) = test_harness(model.clone()).await;

    let repo_id = orchestrator
        .run_analysis("https://github.com/demo/project")
        .await
        .unwrap();

    assert_eq!(model.call_count(), 1);

    let session = orchestrator
        .store()
        .latest_session(&repo_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.llm_call_count, 1);
    assert_eq!(session.status, SessionStatus::Completed);
}

#[tokio::test]
async fn garbage_model_response_falls_back_and_still_completes() {
    let model = FakeModel::replying("this is not json at all");
    let (_dir, orchestrator) = test_harness(model.clone()).await;

    let repo_id = orchestrator
        .run_analysis("https://github.com/demo/project")
        .await
        .unwrap();

    // The call was made and counted, even though its output was unusable.
    assert_eq!(model.call_count(), 1);

    let report = orchestrator.get_status(&repo_id).await.unwrap();
    assert_eq!(report.status, "completed");

    let analysis = orchestrator.get_analysis(&repo_id).await.unwrap();
    assert!((analysis.confidence_score - 0.3).abs() < f64::EPSILON);
    assert!(!analysis.summary.is_empty());

    let session = orchestrator
        .store()
        .latest_session(&repo_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.llm_call_count, 1);
}

#[tokio::test]
async fn disabled_model_completes_with_zero_calls() {
    let model = Arc::new(UnavailableModel {
        calls: AtomicU32::new(0),
    });
    let (_dir, orchestrator) = test_harness(model.clone()).await;

    let repo_id = orchestrator
        .run_analysis("https://github.com/demo/project")
        .await
        .unwrap();

    assert_eq!(model.calls.load(Ordering::SeqCst), 0);

    let session = orchestrator
        .store()
        .latest_session(&repo_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.llm_call_count, 0);
}

#[tokio::test]
async fn reanalysis_replaces_child_rows_not_appends() {
    let model = FakeModel::replying(valid_model_response("Python"));
    let (dir, orchestrator) = test_harness(model).await;

    let repo_id = orchestrator
        .run_analysis("https://github.com/demo/project")
        .await
        .unwrap();

    // Second run with a different stack, same URL. Rebuild the harness
    // around the same database so the model double can change.
    let model2 = FakeModel::replying(valid_model_response("Rust"));
    let config = Config {
        db: DbConfig {
            path: dir.path().join("test.db"),
        },
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        },
        github: Default::default(),
        llm: Default::default(),
        cache: Default::default(),
        analysis: Default::default(),
    };
    let pool = db::connect(&config).await.unwrap();
    let store = Arc::new(Store::new(pool));
    let orchestrator2 = Orchestrator::new(
        store.clone(),
        Arc::new(FakeHost::healthy()),
        model2,
        Arc::new(Cache::new(60)),
        config,
    );

    let repo_id2 = orchestrator2
        .run_analysis("https://github.com/demo/project")
        .await
        .unwrap();
    assert_eq!(repo_id, repo_id2, "same URL must reuse the repository row");

    let analysis = orchestrator2.get_analysis(&repo_id).await.unwrap();
    assert_eq!(analysis.tech_stack.len(), 1);
    assert_eq!(analysis.tech_stack[0].name, "Rust");

    let rows = store.child_row_count("tech_stack", &repo_id).await.unwrap();
    assert_eq!(rows, 1, "old child rows must be gone after re-analysis");
}

#[tokio::test]
async fn host_failure_marks_session_failed_with_classified_message() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        db: DbConfig {
            path: dir.path().join("test.db"),
        },
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        },
        github: Default::default(),
        llm: Default::default(),
        cache: Default::default(),
        analysis: Default::default(),
    };
    let pool = db::connect(&config).await.unwrap();
    migrate::create_schema(&pool).await.unwrap();
    let store = Arc::new(Store::new(pool));
    let orchestrator = Orchestrator::new(
        store,
        Arc::new(FakeHost::missing_repo()),
        FakeModel::replying(valid_model_response("Python")),
        Arc::new(Cache::new(60)),
        config,
    );

    let repo_id = orchestrator
        .run_analysis("https://github.com/demo/missing")
        .await
        .unwrap();

    let report = orchestrator.get_status(&repo_id).await.unwrap();
    assert_eq!(report.status, "failed");
    let message = report.error_message.unwrap();
    assert!(
        message.starts_with("not_found:"),
        "expected classified message, got: {message}"
    );

    // Results are not servable from a failed session.
    let err = orchestrator.get_analysis(&repo_id).await.unwrap_err();
    assert!(matches!(err, LensError::Failed(_)));
}

#[tokio::test]
async fn invalid_url_is_rejected_before_any_session_exists() {
    let model = FakeModel::replying(valid_model_response("Python"));
    let (_dir, orchestrator) = test_harness(model.clone()).await;

    let err = orchestrator
        .run_analysis("https://gitlab.com/demo/project")
        .await
        .unwrap_err();
    assert!(matches!(err, LensError::InvalidUrl(_)));
    assert_eq!(model.call_count(), 0);

    let err = orchestrator.run_analysis("not a url").await.unwrap_err();
    assert!(matches!(err, LensError::InvalidUrl(_)));
}

// ============ Retrieval preconditions ============

#[tokio::test]
async fn unknown_repo_id_is_not_found() {
    let model = FakeModel::replying(valid_model_response("Python"));
    let (_dir, orchestrator) = test_harness(model).await;

    let err = orchestrator.get_analysis("no-such-id").await.unwrap_err();
    assert!(matches!(err, LensError::NotFound(_)));

    let err = orchestrator.ask("no-such-id", "what is this?").await.unwrap_err();
    assert!(matches!(err, LensError::NotFound(_)));

    let report = orchestrator.get_status("no-such-id").await.unwrap();
    assert_eq!(report.status, "not_found");
}

#[tokio::test]
async fn processing_session_blocks_results_and_questions() {
    let model = FakeModel::replying(valid_model_response("Python"));
    let (_dir, orchestrator) = test_harness(model).await;

    // Open a session by hand and never run the pipeline.
    let store = orchestrator.store();
    let repo = store
        .find_or_create_repository("https://github.com/demo/slow", "demo", "slow")
        .await
        .unwrap();
    store.create_session(&repo.id).await.unwrap();

    let err = orchestrator.get_analysis(&repo.id).await.unwrap_err();
    assert!(matches!(err, LensError::Processing(_)));

    let err = orchestrator.ask(&repo.id, "anything").await.unwrap_err();
    assert!(matches!(err, LensError::Processing(_)));
}

// ============ Q&A ============

#[tokio::test]
async fn questions_are_answered_and_logged() {
    let model = FakeModel::replying(valid_model_response("Python"));
    let (_dir, orchestrator) = test_harness(model.clone()).await;

    let repo_id = orchestrator
        .run_analysis("https://github.com/demo/project")
        .await
        .unwrap();

    let record = orchestrator
        .ask(&repo_id, "How do I set this up?")
        .await
        .unwrap();
    assert!(!record.answer.is_empty());
    assert_eq!(record.question, "How do I set this up?");
    assert!(record.created_at <= chrono::Utc::now());
    // One call for the analysis, one for the question.
    assert_eq!(model.call_count(), 2);

    let logged = orchestrator
        .store()
        .child_row_count("qa_logs", &repo_id)
        .await
        .unwrap();
    assert_eq!(logged, 1);
}

#[tokio::test]
async fn unavailable_model_answers_from_stored_analysis_without_calls() {
    // Complete an analysis with a working model first.
    let model = FakeModel::replying(valid_model_response("Python"));
    let (dir, orchestrator) = test_harness(model).await;
    let repo_id = orchestrator
        .run_analysis("https://github.com/demo/project")
        .await
        .unwrap();

    // Ask through an unavailable model against the same database.
    let silent = Arc::new(UnavailableModel {
        calls: AtomicU32::new(0),
    });
    let config = Config {
        db: DbConfig {
            path: dir.path().join("test.db"),
        },
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        },
        github: Default::default(),
        llm: Default::default(),
        cache: Default::default(),
        analysis: Default::default(),
    };
    let pool = db::connect(&config).await.unwrap();
    let orchestrator2 = Orchestrator::new(
        Arc::new(Store::new(pool)),
        Arc::new(FakeHost::healthy()),
        silent.clone(),
        Arc::new(Cache::new(60)),
        config,
    );

    let record = orchestrator2
        .ask(&repo_id, "What technology stack is used?")
        .await
        .unwrap();
    assert!(
        record.answer.contains("Python"),
        "fallback must quote stored data: {}",
        record.answer
    );
    assert_eq!(silent.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn background_start_returns_processing_ticket() {
    let model = FakeModel::replying(valid_model_response("Python"));
    let (_dir, orchestrator) = test_harness(model).await;

    let ticket = orchestrator
        .start_analysis("https://github.com/demo/project")
        .await
        .unwrap();
    assert_eq!(ticket.status, "processing");

    // Poll until the background task lands on a terminal state.
    let mut status = String::new();
    for _ in 0..100 {
        let report = orchestrator.get_status(&ticket.repo_id).await.unwrap();
        status = report.status;
        if status != "processing" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(status, "completed");
}

#[tokio::test]
async fn host_timeout_marks_session_failed_with_timeout_message() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        db: DbConfig {
            path: dir.path().join("test.db"),
        },
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        },
        github: Default::default(),
        llm: Default::default(),
        cache: Default::default(),
        analysis: Default::default(),
    };
    let pool = db::connect(&config).await.unwrap();
    migrate::create_schema(&pool).await.unwrap();
    let model = FakeModel::replying(valid_model_response("Python"));
    let orchestrator = Orchestrator::new(
        Arc::new(Store::new(pool)),
        Arc::new(TimeoutHost),
        model.clone(),
        Arc::new(Cache::new(60)),
        config,
    );

    let repo_id = orchestrator
        .run_analysis("https://github.com/demo/glacial")
        .await
        .unwrap();

    let report = orchestrator.get_status(&repo_id).await.unwrap();
    assert_eq!(report.status, "failed");
    let message = report.error_message.unwrap();
    assert!(
        message.starts_with("timeout:"),
        "expected classified message, got: {message}"
    );
    // Collection never produced a context, so the model was never consulted.
    assert_eq!(model.call_count(), 0);

    let err = orchestrator.get_analysis(&repo_id).await.unwrap_err();
    assert!(matches!(err, LensError::Failed(_)));
}

// ============ Comparison ============

/// Analyze two fixed repositories with different stacks into one database
/// and hand back an orchestrator over it.
async fn comparison_harness() -> (TempDir, Arc<Orchestrator>, String, String) {
    let model = FakeModel::replying(valid_model_response("Python"));
    let (dir, orchestrator) = test_harness(model).await;
    let first = orchestrator
        .run_analysis("https://github.com/demo/alpha")
        .await
        .unwrap();

    let config = Config {
        db: DbConfig {
            path: dir.path().join("test.db"),
        },
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        },
        github: Default::default(),
        llm: Default::default(),
        cache: Default::default(),
        analysis: Default::default(),
    };
    let pool = db::connect(&config).await.unwrap();
    let orchestrator2 = Orchestrator::new(
        Arc::new(Store::new(pool)),
        Arc::new(FakeHost::healthy()),
        FakeModel::replying(valid_model_response("Rust")),
        Arc::new(Cache::new(60)),
        config,
    );
    let second = orchestrator2
        .run_analysis("https://github.com/demo/beta")
        .await
        .unwrap();

    (dir, orchestrator2, first, second)
}

#[tokio::test]
async fn tech_stack_comparison_splits_common_and_unique() {
    let (_dir, orchestrator, first, second) = comparison_harness().await;

    let report = orchestrator
        .compare(&[first, second], ComparisonKind::TechStack)
        .await
        .unwrap();

    let ComparisonReport::TechStack {
        repositories,
        common_technologies,
        unique_technologies,
        summary,
        ..
    } = report
    else {
        panic!("expected a tech stack report");
    };

    assert_eq!(repositories.len(), 2);
    assert!(common_technologies.is_empty());
    assert_eq!(unique_technologies["demo/alpha"], vec!["Python".to_string()]);
    assert_eq!(unique_technologies["demo/beta"], vec!["Rust".to_string()]);
    assert!(summary.contains("Compared 2 repositories"));
}

#[tokio::test]
async fn comparison_rejects_fewer_than_two_ids() {
    let (_dir, orchestrator, first, _second) = comparison_harness().await;

    let err = orchestrator
        .compare(&[first], ComparisonKind::TechStack)
        .await
        .unwrap_err();
    assert!(matches!(err, LensError::Validation(_)));
}

#[tokio::test]
async fn comparison_skips_repos_without_a_completed_analysis() {
    let (_dir, orchestrator, first, second) = comparison_harness().await;

    // A repository that was registered but never analyzed.
    let pending = orchestrator
        .store()
        .find_or_create_repository("https://github.com/demo/pending", "demo", "pending")
        .await
        .unwrap();
    orchestrator.store().create_session(&pending.id).await.unwrap();

    let report = orchestrator
        .compare(
            &[first, second, pending.id.clone()],
            ComparisonKind::Complexity,
        )
        .await
        .unwrap();

    let ComparisonReport::Complexity { repositories, ranking, .. } = report else {
        panic!("expected a complexity report");
    };
    assert_eq!(repositories.len(), 2, "the unfinished repo must be skipped");
    assert_eq!(ranking.len(), 2);

    // With only the unfinished repo there is nothing to compare.
    let err = orchestrator
        .compare(
            &[pending.id, "no-such-id".to_string()],
            ComparisonKind::Complexity,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LensError::Validation(_)));
}
