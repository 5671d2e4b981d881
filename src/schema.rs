//! Structured analysis schema and validation.
//!
//! [`RepositoryAnalysis`] is the fixed JSON object the generative service
//! must emit. [`RepositoryAnalysis::validate`] enforces every field ceiling
//! before a value may cross into the persistence layer; any violation sends
//! the analyzer down the deterministic fallback path.

use serde::{Deserialize, Serialize};

use crate::error::{LensError, Result};

pub const SUMMARY_MIN: usize = 200;
pub const SUMMARY_MAX: usize = 1500;
pub const PURPOSE_MAX: usize = 150;
pub const ARCHITECTURE_MAX: usize = 50;
pub const DATA_FLOW_MAX: usize = 300;
pub const TECH_STACK_MAX: usize = 15;
pub const COMPONENTS_MAX: usize = 10;
pub const KEY_FILES_MAX: usize = 10;
pub const SETUP_STEPS_MIN: usize = 2;
pub const SETUP_STEPS_MAX: usize = 6;
pub const SHORT_LIST_MAX: usize = 5;

/// Narrative filler stripped from summary/purpose/data-flow text.
const FILLER_PHRASES: &[&str] = &[
    "it's important to note",
    "it should be noted",
    "as mentioned",
    "basically",
    "essentially",
    "in conclusion",
    "to summarize",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TechStackItem {
    pub name: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentItem {
    pub name: String,
    pub purpose: String,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileInsight {
    pub path: String,
    /// entry_point | config | core | utility
    pub role: String,
    pub purpose: String,
}

/// Complete repository analysis, produced by exactly one generative call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepositoryAnalysis {
    pub summary: String,
    pub purpose: String,
    pub tech_stack: Vec<TechStackItem>,
    pub primary_language: String,
    pub architecture_pattern: String,
    #[serde(default)]
    pub components: Vec<ComponentItem>,
    pub data_flow: String,
    #[serde(default)]
    pub key_files: Vec<FileInsight>,
    pub setup_steps: Vec<String>,
    #[serde(default)]
    pub contribution_areas: Vec<String>,
    #[serde(default)]
    pub risky_areas: Vec<String>,
    #[serde(default)]
    pub known_issues: Vec<String>,
    #[serde(default = "default_confidence")]
    pub confidence_score: f64,
}

fn default_confidence() -> f64 {
    0.8
}

fn check_len(field: &str, value: &str, max: usize) -> Result<()> {
    if value.chars().count() > max {
        return Err(LensError::BadModelResponse(format!(
            "{field} exceeds {max} chars"
        )));
    }
    Ok(())
}

fn check_count<T>(field: &str, list: &[T], max: usize) -> Result<()> {
    if list.len() > max {
        return Err(LensError::BadModelResponse(format!(
            "{field} exceeds {max} items"
        )));
    }
    Ok(())
}

fn scrub(text: &str) -> String {
    let mut result = text.to_string();
    for phrase in FILLER_PHRASES {
        // Case variants the original emits: as written and Title Case.
        let mut title = String::with_capacity(phrase.len());
        let mut first = true;
        for ch in phrase.chars() {
            if first {
                title.extend(ch.to_uppercase());
                first = false;
            } else {
                title.push(ch);
            }
        }
        result = result.replace(phrase, "").replace(&title, "");
    }
    result.trim().to_string()
}

impl RepositoryAnalysis {
    /// Validates all schema constraints, clamps the confidence score to
    /// `[0, 1]`, and scrubs filler phrases from narrative fields.
    pub fn validate(mut self) -> Result<Self> {
        let summary_len = self.summary.chars().count();
        if summary_len < SUMMARY_MIN {
            return Err(LensError::BadModelResponse(format!(
                "summary under {SUMMARY_MIN} chars"
            )));
        }
        check_len("summary", &self.summary, SUMMARY_MAX)?;
        check_len("purpose", &self.purpose, PURPOSE_MAX)?;
        check_len("architecture_pattern", &self.architecture_pattern, ARCHITECTURE_MAX)?;
        check_len("data_flow", &self.data_flow, DATA_FLOW_MAX)?;

        if self.primary_language.is_empty() {
            return Err(LensError::BadModelResponse(
                "primary_language is empty".to_string(),
            ));
        }

        if self.tech_stack.is_empty() {
            return Err(LensError::BadModelResponse(
                "tech_stack requires at least 1 item".to_string(),
            ));
        }
        check_count("tech_stack", &self.tech_stack, TECH_STACK_MAX)?;
        for item in &self.tech_stack {
            check_len("tech_stack.name", &item.name, 50)?;
            check_len("tech_stack.category", &item.category, 30)?;
            if let Some(version) = &item.version {
                check_len("tech_stack.version", version, 20)?;
            }
        }

        check_count("components", &self.components, COMPONENTS_MAX)?;
        for comp in &self.components {
            check_len("components.name", &comp.name, 50)?;
            check_len("components.purpose", &comp.purpose, 200)?;
            check_count("components.files", &comp.files, 5)?;
        }

        check_count("key_files", &self.key_files, KEY_FILES_MAX)?;
        for file in &self.key_files {
            check_len("key_files.path", &file.path, 200)?;
            check_len("key_files.role", &file.role, 30)?;
            check_len("key_files.purpose", &file.purpose, 150)?;
        }

        if self.setup_steps.len() < SETUP_STEPS_MIN || self.setup_steps.len() > SETUP_STEPS_MAX {
            return Err(LensError::BadModelResponse(format!(
                "setup_steps must have {SETUP_STEPS_MIN}-{SETUP_STEPS_MAX} entries"
            )));
        }

        check_count("contribution_areas", &self.contribution_areas, SHORT_LIST_MAX)?;
        check_count("risky_areas", &self.risky_areas, SHORT_LIST_MAX)?;
        check_count("known_issues", &self.known_issues, SHORT_LIST_MAX)?;

        self.confidence_score = self.confidence_score.clamp(0.0, 1.0);
        self.summary = scrub(&self.summary);
        self.purpose = scrub(&self.purpose);
        self.data_flow = scrub(&self.data_flow);

        Ok(self)
    }
}

/// Pull the JSON object out of a raw model response.
///
/// Strips surrounding ```` ```json ```` fences when present; otherwise scans
/// for the first balanced `{ ... }` object (brace counting, string-aware).
pub fn extract_json(raw: &str) -> Result<String> {
    let trimmed = raw.trim();

    if trimmed.starts_with("```") {
        let inner = trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```");
        let inner = match inner.find("```") {
            Some(end) => &inner[..end],
            None => inner,
        };
        return Ok(inner.trim().to_string());
    }

    let start = trimmed
        .find('{')
        .ok_or_else(|| LensError::BadModelResponse("no JSON object in response".to_string()))?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in trimmed[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(trimmed[start..start + offset + ch.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }

    Err(LensError::BadModelResponse(
        "unbalanced JSON object in response".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_analysis() -> RepositoryAnalysis {
        RepositoryAnalysis {
            summary: "x".repeat(250),
            purpose: "Analyzes repositories".to_string(),
            tech_stack: vec![TechStackItem {
                name: "Rust".to_string(),
                category: "Language".to_string(),
                version: None,
            }],
            primary_language: "Rust".to_string(),
            architecture_pattern: "Pipeline".to_string(),
            components: vec![],
            data_flow: "API to store".to_string(),
            key_files: vec![],
            setup_steps: vec!["Clone".to_string(), "Build".to_string()],
            contribution_areas: vec![],
            risky_areas: vec![],
            known_issues: vec![],
            confidence_score: 0.9,
        }
    }

    #[test]
    fn test_valid_analysis_passes() {
        assert!(valid_analysis().validate().is_ok());
    }

    #[test]
    fn test_short_summary_rejected() {
        let mut a = valid_analysis();
        a.summary = "too short".to_string();
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_empty_tech_stack_rejected() {
        let mut a = valid_analysis();
        a.tech_stack.clear();
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_too_many_setup_steps_rejected() {
        let mut a = valid_analysis();
        a.setup_steps = (0..7).map(|i| format!("step {i}")).collect();
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_list_ceilings() {
        let mut a = valid_analysis();
        a.known_issues = (0..6).map(|i| format!("issue {i}")).collect();
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_confidence_clamped() {
        let mut a = valid_analysis();
        a.confidence_score = 3.5;
        assert_eq!(a.validate().unwrap().confidence_score, 1.0);
    }

    #[test]
    fn test_filler_scrubbed() {
        let mut a = valid_analysis();
        a.purpose = "Essentially a widget factory".to_string();
        let validated = a.validate().unwrap();
        assert_eq!(validated.purpose, "a widget factory");
    }

    #[test]
    fn test_extract_json_from_fences() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json(raw).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_balanced_object_in_prose() {
        let raw = "Here is the result: {\"a\": {\"b\": \"}\"}} trailing text";
        assert_eq!(extract_json(raw).unwrap(), "{\"a\": {\"b\": \"}\"}}");
    }

    #[test]
    fn test_extract_json_none_found() {
        assert!(extract_json("no json here").is_err());
        assert!(extract_json("{\"unbalanced\": ").is_err());
    }

    #[test]
    fn test_default_confidence_on_deserialize() {
        let json = serde_json::json!({
            "summary": "s".repeat(250),
            "purpose": "p",
            "tech_stack": [{"name": "Rust", "category": "Language"}],
            "primary_language": "Rust",
            "architecture_pattern": "CLI",
            "data_flow": "d",
            "setup_steps": ["a", "b"],
        });
        let analysis: RepositoryAnalysis = serde_json::from_value(json).unwrap();
        assert_eq!(analysis.confidence_score, 0.8);
    }
}
