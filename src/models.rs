//! Core data models for the analysis pipeline.
//!
//! These types represent repositories, analysis sessions, and the raw tree
//! entries that flow from the hosting API into the ranking and analysis
//! stages. The validated generative-response types live in [`crate::schema`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate root: one row per canonical repository URL.
#[derive(Debug, Clone)]
pub struct Repository {
    pub id: String,
    pub repo_url: String,
    pub owner: String,
    pub name: String,
    pub primary_language: Option<String>,
    /// Creation time reported by the hosting API, once known.
    pub created_at: Option<DateTime<Utc>>,
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl Repository {
    /// `owner/name` label used in prompts and logs.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Lifecycle state of one analysis attempt.
///
/// `Processing` is the only non-terminal state. A new attempt always creates
/// a new session; terminal sessions are never reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Processing,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Processing => "processing",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(SessionStatus::Processing),
            "completed" => Some(SessionStatus::Completed),
            "failed" => Some(SessionStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Processing)
    }
}

/// One analysis attempt for a repository.
#[derive(Debug, Clone)]
pub struct AnalysisSession {
    pub id: String,
    pub repo_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Generative-service calls made by this attempt. At most 1.
    pub llm_call_count: i64,
}

/// Status snapshot returned by `GetStatus`. `status` is the raw string so
/// the sentinel `not_found` can be represented alongside session states.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub repo_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StatusReport {
    pub fn not_found(repo_id: &str) -> Self {
        StatusReport {
            repo_id: repo_id.to_string(),
            status: "not_found".to_string(),
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }
}

/// Flat entry from the hosting API's recursive tree listing.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    /// `"blob"` for files, `"tree"` for directories.
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(default)]
    pub size: u64,
}

/// A file selected by the relevance ranker.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedFile {
    pub path: String,
    pub language: &'static str,
    pub role: FileRole,
    pub priority: i32,
    pub size: u64,
}

/// Coarse role a file plays in a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    EntryPoint,
    Configuration,
    SourceCode,
    Other,
}

impl FileRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileRole::EntryPoint => "entry_point",
            FileRole::Configuration => "configuration",
            FileRole::SourceCode => "source_code",
            FileRole::Other => "other",
        }
    }
}

/// Issue summary kept from the hosting API listing.
#[derive(Debug, Clone)]
pub struct IssueSummary {
    pub number: i64,
    pub title: String,
    pub state: String,
}

/// One answered question, as persisted in the append-only Q&A log.
#[derive(Debug, Clone, Serialize)]
pub struct QaRecord {
    pub repo_id: String,
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}
