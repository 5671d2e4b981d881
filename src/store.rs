//! Normalized persistence for analysis results.
//!
//! One aggregate root (`repositories`) with seven child collections, a
//! session-history table, a raw-response archive, and an append-only Q&A
//! log. Writes follow replace-on-write: `save_analysis` deletes and
//! reinserts every child collection inside one transaction, together with
//! the session's terminal transition, so readers never observe a partial
//! result and status never disagrees with stored data.

use chrono::{DateTime, TimeZone, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{LensError, Result};
use crate::models::{AnalysisSession, QaRecord, Repository, SessionStatus, StatusReport};
use crate::schema::{ComponentItem, FileInsight, RepositoryAnalysis, TechStackItem};

/// Child tables replaced wholesale on every save.
const CHILD_TABLES: &[&str] = &[
    "tech_stack",
    "architecture_components",
    "key_files",
    "setup_steps",
    "contribution_areas",
    "risky_areas",
    "known_issues",
];

pub struct Store {
    pool: SqlitePool,
}

fn ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ============ Repositories ============

    /// Create-or-reuse the aggregate root for a canonical URL.
    pub async fn find_or_create_repository(
        &self,
        repo_url: &str,
        owner: &str,
        name: &str,
    ) -> Result<Repository> {
        if let Some(existing) = self.repository_by_url(repo_url).await? {
            return Ok(existing);
        }

        let repo = Repository {
            id: Uuid::new_v4().to_string(),
            repo_url: repo_url.to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
            primary_language: None,
            created_at: None,
            analyzed_at: None,
        };

        sqlx::query(
            "INSERT INTO repositories (id, repo_url, owner, name) VALUES (?, ?, ?, ?)",
        )
        .bind(&repo.id)
        .bind(&repo.repo_url)
        .bind(&repo.owner)
        .bind(&repo.name)
        .execute(&self.pool)
        .await?;

        Ok(repo)
    }

    pub async fn repository_by_url(&self, repo_url: &str) -> Result<Option<Repository>> {
        let row = sqlx::query(
            "SELECT id, repo_url, owner, name, primary_language, created_at, analyzed_at
             FROM repositories WHERE repo_url = ?",
        )
        .bind(repo_url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_repository))
    }

    pub async fn repository_by_id(&self, repo_id: &str) -> Result<Option<Repository>> {
        let row = sqlx::query(
            "SELECT id, repo_url, owner, name, primary_language, created_at, analyzed_at
             FROM repositories WHERE id = ?",
        )
        .bind(repo_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_repository))
    }

    // ============ Sessions ============

    /// Open a new `processing` session. Previous sessions are untouched;
    /// the newest `started_at` wins for status queries.
    pub async fn create_session(&self, repo_id: &str) -> Result<AnalysisSession> {
        let session = AnalysisSession {
            id: Uuid::new_v4().to_string(),
            repo_id: repo_id.to_string(),
            status: SessionStatus::Processing,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
            llm_call_count: 0,
        };

        sqlx::query(
            "INSERT INTO analysis_sessions (id, repo_id, status, started_at, llm_call_count)
             VALUES (?, ?, ?, ?, 0)",
        )
        .bind(&session.id)
        .bind(&session.repo_id)
        .bind(session.status.as_str())
        .bind(ts(session.started_at))
        .execute(&self.pool)
        .await?;

        Ok(session)
    }

    /// The most-recently-started session, authoritative for current status.
    pub async fn latest_session(&self, repo_id: &str) -> Result<Option<AnalysisSession>> {
        let row = sqlx::query(
            "SELECT id, repo_id, status, started_at, completed_at, error_message, llm_call_count
             FROM analysis_sessions WHERE repo_id = ?
             ORDER BY started_at DESC, id DESC LIMIT 1",
        )
        .bind(repo_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| AnalysisSession {
            id: row.get("id"),
            repo_id: row.get("repo_id"),
            status: SessionStatus::parse(row.get::<String, _>("status").as_str())
                .unwrap_or(SessionStatus::Failed),
            started_at: from_ts(row.get("started_at")),
            completed_at: row
                .get::<Option<i64>, _>("completed_at")
                .map(from_ts),
            error_message: row.get("error_message"),
            llm_call_count: row.get("llm_call_count"),
        }))
    }

    pub async fn status_report(&self, repo_id: &str) -> Result<StatusReport> {
        match self.latest_session(repo_id).await? {
            Some(session) => Ok(StatusReport {
                repo_id: repo_id.to_string(),
                status: session.status.as_str().to_string(),
                started_at: Some(session.started_at),
                completed_at: session.completed_at,
                error_message: session.error_message,
            }),
            None => Ok(StatusReport::not_found(repo_id)),
        }
    }

    /// Terminal `failed` transition, outside the result transaction. Used
    /// when collection or analysis infrastructure fails before persistence.
    pub async fn mark_session_failed(&self, session_id: &str, message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE analysis_sessions SET status = ?, completed_at = ?, error_message = ?
             WHERE id = ? AND status = ?",
        )
        .bind(SessionStatus::Failed.as_str())
        .bind(ts(Utc::now()))
        .bind(message)
        .bind(session_id)
        .bind(SessionStatus::Processing.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ============ Analysis results ============

    /// Persist a full analysis atomically: summary upsert, every child
    /// collection replaced (delete-all then insert-all), raw archive
    /// upsert, repository metadata refresh, and the session's `completed`
    /// transition with its call count, all in one transaction.
    #[allow(clippy::too_many_arguments)]
    pub async fn save_analysis(
        &self,
        repo_id: &str,
        session_id: &str,
        analysis: &RepositoryAnalysis,
        model_version: &str,
        llm_calls: i64,
        primary_language: Option<&str>,
        repo_created_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let now = ts(Utc::now());
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO analysis_summary
                (repo_id, summary, purpose, architecture_pattern, data_flow, confidence_score, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(repo_id) DO UPDATE SET
                summary = excluded.summary,
                purpose = excluded.purpose,
                architecture_pattern = excluded.architecture_pattern,
                data_flow = excluded.data_flow,
                confidence_score = excluded.confidence_score,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(repo_id)
        .bind(&analysis.summary)
        .bind(&analysis.purpose)
        .bind(&analysis.architecture_pattern)
        .bind(&analysis.data_flow)
        .bind(analysis.confidence_score)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for table in CHILD_TABLES {
            sqlx::query(&format!("DELETE FROM {table} WHERE repo_id = ?"))
                .bind(repo_id)
                .execute(&mut *tx)
                .await?;
        }

        for item in &analysis.tech_stack {
            sqlx::query(
                "INSERT INTO tech_stack (id, repo_id, name, category, version) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(repo_id)
            .bind(&item.name)
            .bind(&item.category)
            .bind(&item.version)
            .execute(&mut *tx)
            .await?;
        }

        for comp in &analysis.components {
            sqlx::query(
                "INSERT INTO architecture_components (id, repo_id, name, purpose, key_files)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(repo_id)
            .bind(&comp.name)
            .bind(&comp.purpose)
            .bind(serde_json::to_string(&comp.files).unwrap_or_else(|_| "[]".to_string()))
            .execute(&mut *tx)
            .await?;
        }

        for file in &analysis.key_files {
            sqlx::query(
                "INSERT INTO key_files (id, repo_id, file_path, role, purpose) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(repo_id)
            .bind(&file.path)
            .bind(&file.role)
            .bind(&file.purpose)
            .execute(&mut *tx)
            .await?;
        }

        for (i, step) in analysis.setup_steps.iter().enumerate() {
            sqlx::query(
                "INSERT INTO setup_steps (id, repo_id, step_order, instruction) VALUES (?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(repo_id)
            .bind((i + 1) as i64)
            .bind(step)
            .execute(&mut *tx)
            .await?;
        }

        for (table, column, values) in [
            ("contribution_areas", "area", &analysis.contribution_areas),
            ("risky_areas", "area", &analysis.risky_areas),
            ("known_issues", "issue", &analysis.known_issues),
        ] {
            for value in values {
                sqlx::query(&format!(
                    "INSERT INTO {table} (id, repo_id, {column}) VALUES (?, ?, ?)"
                ))
                .bind(Uuid::new_v4().to_string())
                .bind(repo_id)
                .bind(value)
                .execute(&mut *tx)
                .await?;
            }
        }

        let raw_json = serde_json::to_string(analysis)
            .map_err(|e| LensError::Other(format!("serialize analysis: {e}")))?;
        sqlx::query(
            r#"
            INSERT INTO raw_analysis_responses (repo_id, raw_json, model_version, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(repo_id) DO UPDATE SET
                raw_json = excluded.raw_json,
                model_version = excluded.model_version,
                created_at = excluded.created_at
            "#,
        )
        .bind(repo_id)
        .bind(&raw_json)
        .bind(model_version)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE repositories SET primary_language = ?, created_at = ?, analyzed_at = ?
             WHERE id = ?",
        )
        .bind(primary_language)
        .bind(repo_created_at.map(ts))
        .bind(now)
        .bind(repo_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE analysis_sessions SET status = ?, completed_at = ?, llm_call_count = ?
             WHERE id = ?",
        )
        .bind(SessionStatus::Completed.as_str())
        .bind(now)
        .bind(llm_calls)
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Reassemble the full analysis from the split tables. Gated: fails
    /// with the precondition error matching the current session state.
    pub async fn load_analysis(&self, repo_id: &str) -> Result<RepositoryAnalysis> {
        self.require_completed(repo_id).await?;

        let summary = sqlx::query(
            "SELECT summary, purpose, architecture_pattern, data_flow, confidence_score
             FROM analysis_summary WHERE repo_id = ?",
        )
        .bind(repo_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| LensError::NotFound(repo_id.to_string()))?;

        let repo = self.repository_by_id(repo_id).await?;

        let tech_rows = sqlx::query(
            "SELECT name, category, version FROM tech_stack WHERE repo_id = ?",
        )
        .bind(repo_id)
        .fetch_all(&self.pool)
        .await?;
        let tech_stack = tech_rows
            .into_iter()
            .map(|row| TechStackItem {
                name: row.get("name"),
                category: row.get("category"),
                version: row.get("version"),
            })
            .collect();

        let comp_rows = sqlx::query(
            "SELECT name, purpose, key_files FROM architecture_components WHERE repo_id = ?",
        )
        .bind(repo_id)
        .fetch_all(&self.pool)
        .await?;
        let components = comp_rows
            .into_iter()
            .map(|row| ComponentItem {
                name: row.get("name"),
                purpose: row.get("purpose"),
                files: row
                    .get::<Option<String>, _>("key_files")
                    .and_then(|json| serde_json::from_str(&json).ok())
                    .unwrap_or_default(),
            })
            .collect();

        let file_rows = sqlx::query(
            "SELECT file_path, role, purpose FROM key_files WHERE repo_id = ?",
        )
        .bind(repo_id)
        .fetch_all(&self.pool)
        .await?;
        let key_files = file_rows
            .into_iter()
            .map(|row| FileInsight {
                path: row.get("file_path"),
                role: row.get("role"),
                purpose: row.get("purpose"),
            })
            .collect();

        let step_rows = sqlx::query(
            "SELECT instruction FROM setup_steps WHERE repo_id = ? ORDER BY step_order",
        )
        .bind(repo_id)
        .fetch_all(&self.pool)
        .await?;
        let setup_steps = step_rows
            .into_iter()
            .map(|row| row.get("instruction"))
            .collect();

        let contribution_areas = self.string_column("contribution_areas", "area", repo_id).await?;
        let risky_areas = self.string_column("risky_areas", "area", repo_id).await?;
        let known_issues = self.string_column("known_issues", "issue", repo_id).await?;

        Ok(RepositoryAnalysis {
            summary: summary.get("summary"),
            purpose: summary.get("purpose"),
            tech_stack,
            primary_language: repo
                .and_then(|r| r.primary_language)
                .unwrap_or_else(|| "Unknown".to_string()),
            architecture_pattern: summary.get("architecture_pattern"),
            components,
            data_flow: summary.get("data_flow"),
            key_files,
            setup_steps,
            contribution_areas,
            risky_areas,
            known_issues,
            confidence_score: summary.get("confidence_score"),
        })
    }

    /// Archived exact payload and the model that produced it, if present.
    pub async fn load_raw_analysis(
        &self,
        repo_id: &str,
    ) -> Result<Option<(RepositoryAnalysis, String)>> {
        let row = sqlx::query(
            "SELECT raw_json, model_version FROM raw_analysis_responses WHERE repo_id = ?",
        )
        .bind(repo_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|row| {
            let raw: String = row.get("raw_json");
            serde_json::from_str(&raw)
                .ok()
                .map(|analysis| (analysis, row.get("model_version")))
        }))
    }

    /// Precondition gate shared by result retrieval and Q&A.
    pub async fn require_completed(&self, repo_id: &str) -> Result<()> {
        match self.latest_session(repo_id).await? {
            None => Err(LensError::NotFound(repo_id.to_string())),
            Some(session) => match session.status {
                SessionStatus::Completed => Ok(()),
                SessionStatus::Processing => Err(LensError::Processing(repo_id.to_string())),
                SessionStatus::Failed => Err(LensError::Failed(
                    session
                        .error_message
                        .unwrap_or_else(|| "unknown error".to_string()),
                )),
            },
        }
    }

    async fn string_column(
        &self,
        table: &str,
        column: &str,
        repo_id: &str,
    ) -> Result<Vec<String>> {
        let rows = sqlx::query(&format!("SELECT {column} FROM {table} WHERE repo_id = ?"))
            .bind(repo_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    // ============ Q&A log ============

    /// Append one answered question. Callers treat failure as a warning;
    /// the computed answer stands either way.
    pub async fn append_qa(&self, record: &QaRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO qa_logs (id, repo_id, question, answer, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&record.repo_id)
        .bind(&record.question)
        .bind(&record.answer)
        .bind(ts(record.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Rows in one child table for a repository. Test and inspection aid.
    pub async fn child_row_count(&self, table: &str, repo_id: &str) -> Result<i64> {
        if !CHILD_TABLES.contains(&table) && table != "qa_logs" {
            return Err(LensError::Other(format!("unknown child table: {table}")));
        }
        let count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE repo_id = ?"))
                .bind(repo_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

fn row_to_repository(row: sqlx::sqlite::SqliteRow) -> Repository {
    Repository {
        id: row.get("id"),
        repo_url: row.get("repo_url"),
        owner: row.get("owner"),
        name: row.get("name"),
        primary_language: row.get("primary_language"),
        created_at: row.get::<Option<i64>, _>("created_at").map(from_ts),
        analyzed_at: row.get::<Option<i64>, _>("analyzed_at").map(from_ts),
    }
}
