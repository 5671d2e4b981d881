//! Grounded question answering over stored analyses.
//!
//! Answers come from the persisted analysis only. The archived raw payload
//! is preferred as grounding; if it is missing or unreadable the analysis
//! is reassembled from the normalized tables. At most one generative call
//! per question, and a deterministic keyword-routed answer when the model
//! is unavailable or errors.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::llm::TextModel;
use crate::models::QaRecord;
use crate::schema::RepositoryAnalysis;
use crate::store::Store;

pub struct QaEngine {
    store: Arc<Store>,
    model: Arc<dyn TextModel>,
}

impl QaEngine {
    pub fn new(store: Arc<Store>, model: Arc<dyn TextModel>) -> Self {
        Self { store, model }
    }

    /// Answer a question about a completed analysis, returning the answered
    /// record with its timestamp. Fails with the precondition error matching
    /// the repository's current state.
    pub async fn answer(&self, repo_id: &str, question: &str) -> Result<QaRecord> {
        self.store.require_completed(repo_id).await?;

        // Archived payload first, normalized reconstruction second.
        let analysis = match self.store.load_raw_analysis(repo_id).await? {
            Some((analysis, _)) => analysis,
            None => self.store.load_analysis(repo_id).await?,
        };

        let answer = if self.model.is_available() {
            let prompt = build_question_prompt(question, &analysis);
            match self.model.generate(&prompt).await {
                Ok(text) => {
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        fallback_answer(question, &analysis)
                    } else {
                        trimmed.to_string()
                    }
                }
                Err(e) => {
                    warn!("model error during Q&A, using fallback: {e}");
                    fallback_answer(question, &analysis)
                }
            }
        } else {
            debug!("model unavailable, using fallback answer");
            fallback_answer(question, &analysis)
        };

        let record = QaRecord {
            repo_id: repo_id.to_string(),
            question: question.to_string(),
            answer,
            created_at: Utc::now(),
        };
        // Logging is best effort; the answer stands even if the append fails.
        if let Err(e) = self.store.append_qa(&record).await {
            warn!("failed to log Q&A exchange: {e}");
        }

        Ok(record)
    }
}

fn build_question_prompt(question: &str, analysis: &RepositoryAnalysis) -> String {
    let tech_details: String = analysis
        .tech_stack
        .iter()
        .take(8)
        .map(|t| match &t.version {
            Some(v) => format!("- {} ({}) v{v}\n", t.name, t.category),
            None => format!("- {} ({})\n", t.name, t.category),
        })
        .collect();

    let comp_details: String = analysis
        .components
        .iter()
        .take(5)
        .map(|c| format!("- {}: {}\n", c.name, c.purpose))
        .collect();

    let setup_details: String = analysis
        .setup_steps
        .iter()
        .take(5)
        .enumerate()
        .map(|(i, step)| format!("{}. {step}\n", i + 1))
        .collect();

    let or_unspecified = |s: String| {
        if s.is_empty() {
            "Not specified\n".to_string()
        } else {
            s
        }
    };

    format!(
        "Answer this question about the repository using ONLY the provided analysis data.\n\
         \n\
         Question: {question}\n\
         \n\
         Repository Analysis Data:\n\
         \n\
         OVERVIEW:\n{summary}\n\
         \n\
         PURPOSE:\n{purpose}\n\
         \n\
         TECH STACK:\n{tech}\
         \n\
         ARCHITECTURE:\nPattern: {pattern}\n{data_flow}\n\
         \n\
         COMPONENTS:\n{components}\
         \n\
         SETUP:\n{setup}\
         \n\
         CONTRIBUTION AREAS:\n{contribution}\n\
         \n\
         KNOWN ISSUES:\n{issues}\n\
         \n\
         RULES:\n\
         1. Answer in 2-5 sentences (50-150 words max)\n\
         2. Be specific and reference actual data from the analysis\n\
         3. DO NOT make up information not in the analysis\n\
         4. If the analysis doesn't contain the answer, say so briefly\n\
         5. DO NOT just repeat the summary, answer the specific question asked\n\
         \n\
         Answer:",
        summary = analysis.summary,
        purpose = analysis.purpose,
        tech = or_unspecified(tech_details),
        pattern = analysis.architecture_pattern,
        data_flow = analysis.data_flow,
        components = or_unspecified(comp_details),
        setup = or_unspecified(setup_details),
        contribution = if analysis.contribution_areas.is_empty() {
            "Not specified".to_string()
        } else {
            analysis.contribution_areas.join(", ")
        },
        issues = if analysis.known_issues.is_empty() {
            "None identified".to_string()
        } else {
            analysis.known_issues[..analysis.known_issues.len().min(3)].join(", ")
        },
    )
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Deterministic answer routed by question keywords when no model call
/// is possible. Every branch quotes stored analysis data.
fn fallback_answer(question: &str, analysis: &RepositoryAnalysis) -> String {
    let q = question.to_lowercase();

    let tech_names: Vec<&str> = analysis
        .tech_stack
        .iter()
        .take(5)
        .map(|t| t.name.as_str())
        .collect();
    let comp_names: Vec<&str> = analysis
        .components
        .iter()
        .take(4)
        .map(|c| c.name.as_str())
        .collect();

    if contains_any(&q, &["what is", "what does", "explain", "describe", "about"]) {
        if contains_any(&q, &["architecture", "structure"]) {
            let comps = if comp_names.is_empty() {
                "various modules".to_string()
            } else {
                comp_names.join(", ")
            };
            return format!(
                "This project follows a {} architecture with components including {comps}. {}",
                analysis.architecture_pattern, analysis.data_flow
            );
        }
        if contains_any(&q, &["tech", "technology", "stack", "language", "framework"]) {
            let techs = if tech_names.is_empty() {
                "various technologies".to_string()
            } else {
                tech_names.join(", ")
            };
            return format!(
                "The project is built with {techs}. The primary language is {}.",
                analysis.primary_language
            );
        }
        return format!("{} {}", analysis.summary, analysis.purpose);
    }

    if contains_any(&q, &["how", "setup", "install", "start", "run", "deploy"]) {
        if analysis.setup_steps.is_empty() {
            return "Setup instructions: clone the repository and follow the README for detailed setup steps.".to_string();
        }
        let steps = analysis.setup_steps[..analysis.setup_steps.len().min(3)].join(". ");
        return format!(
            "To get started: {steps}. Check the repository for complete setup instructions."
        );
    }

    if contains_any(
        &q,
        &["tech", "technology", "stack", "built", "language", "framework", "library"],
    ) {
        let techs = if tech_names.is_empty() {
            "various technologies".to_string()
        } else {
            tech_names.join(", ")
        };
        return format!(
            "This project uses {techs}. The architecture follows a {} pattern.",
            analysis.architecture_pattern
        );
    }

    if contains_any(&q, &["architecture", "structure", "organized", "design", "pattern"]) {
        let comps = if comp_names.is_empty() {
            "multiple components".to_string()
        } else {
            comp_names.join(", ")
        };
        return format!(
            "Architecture: {}. Main components: {comps}. {}",
            analysis.architecture_pattern, analysis.data_flow
        );
    }

    if contains_any(&q, &["contribute", "help", "where", "area"]) {
        if analysis.contribution_areas.is_empty() {
            return "Check the repository issues and README for contribution guidelines."
                .to_string();
        }
        let areas =
            analysis.contribution_areas[..analysis.contribution_areas.len().min(3)].join(", ");
        return format!("You can contribute in these areas: {areas}.");
    }

    if contains_any(&q, &["issue", "problem", "bug", "risk", "concern"]) {
        let issues = &analysis.known_issues[..analysis.known_issues.len().min(3)];
        let risks = &analysis.risky_areas[..analysis.risky_areas.len().min(2)];
        if issues.is_empty() && risks.is_empty() {
            return "No specific issues or risks identified in the analysis.".to_string();
        }
        let mut parts = Vec::new();
        if !issues.is_empty() {
            parts.push(format!("Known issues: {}", issues.join(", ")));
        }
        if !risks.is_empty() {
            parts.push(format!("Risky areas: {}", risks.join(", ")));
        }
        return format!("{}.", parts.join(". "));
    }

    if contains_any(&q, &["file", "code", "source", "important"]) {
        if analysis.key_files.is_empty() {
            return "File structure information is available in the repository.".to_string();
        }
        let files: Vec<&str> = analysis
            .key_files
            .iter()
            .take(3)
            .map(|f| f.path.as_str())
            .collect();
        return format!(
            "Key files in this project include: {}. These files are central to the project's functionality.",
            files.join(", ")
        );
    }

    if contains_any(&q, &["data", "flow", "work", "process"]) {
        return format!(
            "Data flow: {}. The system follows a {} pattern.",
            analysis.data_flow, analysis.architecture_pattern
        );
    }

    if contains_any(&q, &["component", "module", "part"]) {
        if comp_names.is_empty() {
            return format!(
                "The project is organized following a {} architecture pattern.",
                analysis.architecture_pattern
            );
        }
        return format!(
            "Main components: {}. Each component serves a specific purpose in the {} architecture.",
            comp_names.join(", "),
            analysis.architecture_pattern
        );
    }

    let tech_summary = if tech_names.is_empty() {
        String::new()
    } else {
        format!(" using {}", tech_names[..tech_names.len().min(3)].join(", "))
    };
    format!(
        "{}{tech_summary}. It follows a {} architecture. {}",
        analysis.summary, analysis.architecture_pattern, analysis.purpose
    )
}
