//! Comparative analysis over persisted results.
//!
//! Pure functions from already-stored analyses to a comparison report. No
//! external fetches and no generative calls happen here: comparing reads
//! only what previous analysis sessions persisted. Between two and five
//! repositories can be compared at once.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{LensError, Result};
use crate::schema::RepositoryAnalysis;

pub const MIN_REPOS: usize = 2;
pub const MAX_REPOS: usize = 5;

/// Dimension a comparison is computed along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonKind {
    TechStack,
    Architecture,
    Complexity,
}

impl ComparisonKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "tech_stack" => Ok(ComparisonKind::TechStack),
            "architecture" => Ok(ComparisonKind::Architecture),
            "complexity" => Ok(ComparisonKind::Complexity),
            other => Err(LensError::Validation(format!(
                "unknown comparison type: '{other}'. Must be tech_stack, architecture, or complexity."
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonKind::TechStack => "tech_stack",
            ComparisonKind::Architecture => "architecture",
            ComparisonKind::Complexity => "complexity",
        }
    }
}

/// One repository's stored analysis plus its `owner/name` label.
#[derive(Debug, Clone)]
pub struct RepoSnapshot {
    pub name: String,
    pub analysis: RepositoryAnalysis,
}

/// Where one technology shows up across the compared set.
#[derive(Debug, Clone, Serialize)]
pub struct TechUsage {
    pub category: String,
    pub repos: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchitectureEntry {
    pub pattern: String,
    pub data_flow: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplexityScore {
    pub confidence_score: f64,
    /// `(1 - confidence) * 10`, one decimal. Low confidence stands in for
    /// high complexity.
    pub estimated_complexity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedComplexity {
    pub repo: String,
    pub confidence_score: f64,
    pub estimated_complexity: f64,
}

/// Comparison result, tagged by dimension.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "comparison_type", rename_all = "snake_case")]
pub enum ComparisonReport {
    TechStack {
        repositories: Vec<String>,
        common_technologies: Vec<String>,
        unique_technologies: BTreeMap<String, Vec<String>>,
        technology_matrix: BTreeMap<String, TechUsage>,
        summary: String,
    },
    Architecture {
        repositories: Vec<String>,
        architectures: BTreeMap<String, ArchitectureEntry>,
        most_common_pattern: Option<String>,
        pattern_distribution: BTreeMap<String, usize>,
    },
    Complexity {
        repositories: Vec<String>,
        complexity_scores: BTreeMap<String, ComplexityScore>,
        ranking: Vec<RankedComplexity>,
        summary: String,
    },
}

/// Compare the snapshots along `kind`. Callers enforce the 2..=5 bound;
/// this function assumes at least two snapshots.
pub fn compare(kind: ComparisonKind, snapshots: &[RepoSnapshot]) -> ComparisonReport {
    match kind {
        ComparisonKind::TechStack => compare_tech_stack(snapshots),
        ComparisonKind::Architecture => compare_architecture(snapshots),
        ComparisonKind::Complexity => compare_complexity(snapshots),
    }
}

fn compare_tech_stack(snapshots: &[RepoSnapshot]) -> ComparisonReport {
    let repositories: Vec<String> = snapshots.iter().map(|s| s.name.clone()).collect();

    let mut matrix: BTreeMap<String, TechUsage> = BTreeMap::new();
    for snap in snapshots {
        for tech in &snap.analysis.tech_stack {
            let usage = matrix.entry(tech.name.clone()).or_insert_with(|| TechUsage {
                category: tech.category.clone(),
                repos: Vec::new(),
            });
            if !usage.repos.contains(&snap.name) {
                usage.repos.push(snap.name.clone());
            }
        }
    }

    let common: Vec<String> = matrix
        .iter()
        .filter(|(_, usage)| usage.repos.len() == snapshots.len())
        .map(|(name, _)| name.clone())
        .collect();

    let mut unique: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for snap in snapshots {
        let mut only_here: Vec<String> = snap
            .analysis
            .tech_stack
            .iter()
            .map(|t| t.name.clone())
            .filter(|name| !common.contains(name))
            .collect();
        only_here.sort();
        only_here.dedup();
        if !only_here.is_empty() {
            unique.insert(snap.name.clone(), only_here);
        }
    }

    let summary = format!(
        "Compared {} repositories. Found {} common technologies.",
        snapshots.len(),
        common.len()
    );

    ComparisonReport::TechStack {
        repositories,
        common_technologies: common,
        unique_technologies: unique,
        technology_matrix: matrix,
        summary,
    }
}

fn compare_architecture(snapshots: &[RepoSnapshot]) -> ComparisonReport {
    let repositories: Vec<String> = snapshots.iter().map(|s| s.name.clone()).collect();

    let mut architectures = BTreeMap::new();
    let mut distribution: BTreeMap<String, usize> = BTreeMap::new();
    for snap in snapshots {
        architectures.insert(
            snap.name.clone(),
            ArchitectureEntry {
                pattern: snap.analysis.architecture_pattern.clone(),
                data_flow: snap.analysis.data_flow.clone(),
            },
        );
        *distribution
            .entry(snap.analysis.architecture_pattern.clone())
            .or_insert(0) += 1;
    }

    let most_common_pattern = distribution
        .iter()
        .max_by_key(|(_, count)| **count)
        .map(|(pattern, _)| pattern.clone());

    ComparisonReport::Architecture {
        repositories,
        architectures,
        most_common_pattern,
        pattern_distribution: distribution,
    }
}

fn compare_complexity(snapshots: &[RepoSnapshot]) -> ComparisonReport {
    let repositories: Vec<String> = snapshots.iter().map(|s| s.name.clone()).collect();

    let mut scores = BTreeMap::new();
    for snap in snapshots {
        let confidence = snap.analysis.confidence_score;
        scores.insert(
            snap.name.clone(),
            ComplexityScore {
                confidence_score: confidence,
                estimated_complexity: ((1.0 - confidence) * 100.0).round() / 10.0,
            },
        );
    }

    let mut ranking: Vec<RankedComplexity> = scores
        .iter()
        .map(|(name, score)| RankedComplexity {
            repo: name.clone(),
            confidence_score: score.confidence_score,
            estimated_complexity: score.estimated_complexity,
        })
        .collect();
    ranking.sort_by(|a, b| {
        b.estimated_complexity
            .partial_cmp(&a.estimated_complexity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.repo.cmp(&b.repo))
    });

    let summary = match (ranking.first(), ranking.last()) {
        (Some(most), Some(least)) => format!(
            "Most complex: {}, Least complex: {}",
            most.repo, least.repo
        ),
        _ => String::new(),
    };

    ComparisonReport::Complexity {
        repositories,
        complexity_scores: scores,
        ranking,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TechStackItem;

    fn snapshot(name: &str, techs: &[&str], pattern: &str, confidence: f64) -> RepoSnapshot {
        RepoSnapshot {
            name: name.to_string(),
            analysis: RepositoryAnalysis {
                summary: "s".repeat(200),
                purpose: "p".to_string(),
                tech_stack: techs
                    .iter()
                    .map(|t| TechStackItem {
                        name: t.to_string(),
                        category: "Library".to_string(),
                        version: None,
                    })
                    .collect(),
                primary_language: "Rust".to_string(),
                architecture_pattern: pattern.to_string(),
                data_flow: "in, transform, out".to_string(),
                components: vec![],
                key_files: vec![],
                setup_steps: vec!["a".to_string(), "b".to_string()],
                contribution_areas: vec![],
                risky_areas: vec![],
                known_issues: vec![],
                confidence_score: confidence,
            },
        }
    }

    #[test]
    fn test_kind_parse_rejects_unknown() {
        assert_eq!(
            ComparisonKind::parse("tech_stack").unwrap(),
            ComparisonKind::TechStack
        );
        assert!(matches!(
            ComparisonKind::parse("vibes"),
            Err(LensError::Validation(_))
        ));
    }

    #[test]
    fn test_tech_stack_common_and_unique() {
        let snaps = [
            snapshot("a/one", &["tokio", "serde"], "CLI", 0.9),
            snapshot("a/two", &["tokio", "axum"], "CLI", 0.8),
        ];
        let ComparisonReport::TechStack {
            common_technologies,
            unique_technologies,
            technology_matrix,
            ..
        } = compare(ComparisonKind::TechStack, &snaps)
        else {
            panic!("wrong report kind");
        };

        assert_eq!(common_technologies, vec!["tokio".to_string()]);
        assert_eq!(unique_technologies["a/one"], vec!["serde".to_string()]);
        assert_eq!(unique_technologies["a/two"], vec!["axum".to_string()]);
        assert_eq!(technology_matrix["tokio"].repos.len(), 2);
    }

    #[test]
    fn test_architecture_pattern_distribution() {
        let snaps = [
            snapshot("a/one", &["x"], "CLI", 0.9),
            snapshot("a/two", &["x"], "CLI", 0.8),
            snapshot("a/three", &["x"], "Microservices", 0.7),
        ];
        let ComparisonReport::Architecture {
            most_common_pattern,
            pattern_distribution,
            architectures,
            ..
        } = compare(ComparisonKind::Architecture, &snaps)
        else {
            panic!("wrong report kind");
        };

        assert_eq!(most_common_pattern.as_deref(), Some("CLI"));
        assert_eq!(pattern_distribution["CLI"], 2);
        assert_eq!(pattern_distribution["Microservices"], 1);
        assert_eq!(architectures["a/three"].pattern, "Microservices");
    }

    #[test]
    fn test_complexity_ranking_orders_by_inverse_confidence() {
        let snaps = [
            snapshot("a/simple", &["x"], "CLI", 0.95),
            snapshot("a/hairy", &["x"], "CLI", 0.3),
        ];
        let ComparisonReport::Complexity {
            ranking, summary, ..
        } = compare(ComparisonKind::Complexity, &snaps)
        else {
            panic!("wrong report kind");
        };

        assert_eq!(ranking[0].repo, "a/hairy");
        assert!((ranking[0].estimated_complexity - 7.0).abs() < 1e-9);
        assert!((ranking[1].estimated_complexity - 0.5).abs() < 1e-9);
        assert!(summary.starts_with("Most complex: a/hairy"));
    }
}
