use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_github_timeout")]
    pub timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            timeout_secs: default_github_timeout(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}
fn default_github_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `"disabled"` or `"gemini"`. Disabled forces the deterministic
    /// fallback analysis and templated Q&A answers.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_llm_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl")]
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl(),
        }
    }
}

fn default_ttl() -> u64 {
    3600
}

/// Budgets for data collection and prompt assembly.
#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// Maximum files kept by the relevance ranker.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    /// How many of the top-ranked files get their contents fetched.
    #[serde(default = "default_content_files")]
    pub content_files: usize,
    /// Files larger than this are never inlined into the prompt.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
    /// Per-file snippet length kept for the prompt.
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
    /// README truncation for the prompt.
    #[serde(default = "default_readme_chars")]
    pub readme_chars: usize,
    #[serde(default = "default_open_issues")]
    pub open_issues: usize,
    #[serde(default = "default_closed_issues")]
    pub closed_issues: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            content_files: default_content_files(),
            max_file_bytes: default_max_file_bytes(),
            snippet_chars: default_snippet_chars(),
            readme_chars: default_readme_chars(),
            open_issues: default_open_issues(),
            closed_issues: default_closed_issues(),
        }
    }
}

fn default_max_files() -> usize {
    30
}
fn default_content_files() -> usize {
    10
}
fn default_max_file_bytes() -> usize {
    10_000
}
fn default_snippet_chars() -> usize {
    2_000
}
fn default_readme_chars() -> usize {
    3_000
}
fn default_open_issues() -> usize {
    30
}
fn default_closed_issues() -> usize {
    20
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Rejects configurations that would parse but produce degenerate behavior,
/// like zero-sized collection budgets that collapse every prompt to nothing.
fn validate(config: &Config) -> Result<()> {
    if config.analysis.max_files == 0 {
        anyhow::bail!("analysis.max_files must be > 0");
    }
    if config.analysis.content_files == 0 {
        anyhow::bail!("analysis.content_files must be > 0");
    }
    if config.analysis.content_files > config.analysis.max_files {
        anyhow::bail!("analysis.content_files must be <= analysis.max_files");
    }
    if config.analysis.snippet_chars == 0 {
        anyhow::bail!("analysis.snippet_chars must be > 0");
    }
    if config.analysis.readme_chars == 0 {
        anyhow::bail!("analysis.readme_chars must be > 0");
    }
    if config.github.timeout_secs == 0 || config.llm.timeout_secs == 0 {
        anyhow::bail!("timeout_secs must be > 0");
    }

    match config.llm.provider.as_str() {
        "disabled" | "gemini" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled or gemini.",
            other
        ),
    }

    if config.llm.is_enabled() && config.llm.model.is_none() {
        anyhow::bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Config {
        let base = r#"
            [db]
            path = "./test.db"

            [server]
            bind = "127.0.0.1:8080"
        "#;
        toml::from_str(&format!("{base}\n{body}")).unwrap()
    }

    #[test]
    fn test_defaults_pass_validation() {
        let config = parse("");
        validate(&config).unwrap();
        assert_eq!(config.analysis.max_files, 30);
        assert_eq!(config.analysis.snippet_chars, 2_000);
    }

    #[test]
    fn test_zero_budgets_are_rejected() {
        for body in [
            "[analysis]\nmax_files = 0",
            "[analysis]\ncontent_files = 0",
            "[analysis]\nsnippet_chars = 0",
            "[analysis]\nreadme_chars = 0",
        ] {
            let config = parse(body);
            assert!(validate(&config).is_err(), "accepted: {body}");
        }
    }

    #[test]
    fn test_content_files_may_not_exceed_max_files() {
        let config = parse("[analysis]\nmax_files = 5\ncontent_files = 6");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_timeouts_are_rejected() {
        let config = parse("[github]\ntimeout_secs = 0");
        assert!(validate(&config).is_err());
        let config = parse("[llm]\ntimeout_secs = 0");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_enabled_provider_requires_a_model() {
        let config = parse("[llm]\nprovider = \"gemini\"");
        assert!(validate(&config).is_err());
        let config = parse("[llm]\nprovider = \"gemini\"\nmodel = \"gemini-1.5-flash\"");
        validate(&config).unwrap();
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let config = parse("[llm]\nprovider = \"openai\"");
        assert!(validate(&config).is_err());
    }
}
