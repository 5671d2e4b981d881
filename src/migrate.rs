use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes. Idempotent.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // Aggregate root
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repositories (
            id TEXT PRIMARY KEY,
            repo_url TEXT NOT NULL UNIQUE,
            owner TEXT NOT NULL,
            name TEXT NOT NULL,
            primary_language TEXT,
            created_at INTEGER,
            analyzed_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Session history: one row per analysis attempt, never deleted
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_sessions (
            id TEXT PRIMARY KEY,
            repo_id TEXT NOT NULL,
            status TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            completed_at INTEGER,
            error_message TEXT,
            llm_call_count INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (repo_id) REFERENCES repositories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Single-row summary per repository
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_summary (
            repo_id TEXT PRIMARY KEY,
            summary TEXT NOT NULL,
            purpose TEXT NOT NULL,
            architecture_pattern TEXT NOT NULL,
            data_flow TEXT NOT NULL,
            confidence_score REAL NOT NULL DEFAULT 0.8,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (repo_id) REFERENCES repositories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tech_stack (
            id TEXT PRIMARY KEY,
            repo_id TEXT NOT NULL,
            name TEXT NOT NULL,
            category TEXT NOT NULL,
            version TEXT,
            FOREIGN KEY (repo_id) REFERENCES repositories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS architecture_components (
            id TEXT PRIMARY KEY,
            repo_id TEXT NOT NULL,
            name TEXT NOT NULL,
            purpose TEXT NOT NULL,
            key_files TEXT,
            FOREIGN KEY (repo_id) REFERENCES repositories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS key_files (
            id TEXT PRIMARY KEY,
            repo_id TEXT NOT NULL,
            file_path TEXT NOT NULL,
            role TEXT NOT NULL,
            purpose TEXT NOT NULL,
            FOREIGN KEY (repo_id) REFERENCES repositories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS setup_steps (
            id TEXT PRIMARY KEY,
            repo_id TEXT NOT NULL,
            step_order INTEGER NOT NULL,
            instruction TEXT NOT NULL,
            FOREIGN KEY (repo_id) REFERENCES repositories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contribution_areas (
            id TEXT PRIMARY KEY,
            repo_id TEXT NOT NULL,
            area TEXT NOT NULL,
            FOREIGN KEY (repo_id) REFERENCES repositories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS risky_areas (
            id TEXT PRIMARY KEY,
            repo_id TEXT NOT NULL,
            area TEXT NOT NULL,
            FOREIGN KEY (repo_id) REFERENCES repositories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS known_issues (
            id TEXT PRIMARY KEY,
            repo_id TEXT NOT NULL,
            issue TEXT NOT NULL,
            FOREIGN KEY (repo_id) REFERENCES repositories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Exact validated payload + model id, for reproducibility and Q&A
    // grounding without re-derivation
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS raw_analysis_responses (
            repo_id TEXT PRIMARY KEY,
            raw_json TEXT NOT NULL,
            model_version TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (repo_id) REFERENCES repositories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only Q&A log
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS qa_logs (
            id TEXT PRIMARY KEY,
            repo_id TEXT NOT NULL,
            question TEXT NOT NULL,
            answer TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (repo_id) REFERENCES repositories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sessions_repo_started ON analysis_sessions(repo_id, started_at DESC)",
    )
    .execute(pool)
    .await?;
    for table in [
        "tech_stack",
        "architecture_components",
        "key_files",
        "setup_steps",
        "contribution_areas",
        "risky_areas",
        "known_issues",
        "qa_logs",
    ] {
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_repo_id ON {table}(repo_id)"
        ))
        .execute(pool)
        .await?;
    }

    Ok(())
}
