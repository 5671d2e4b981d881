//! Generative-text provider abstraction and implementations.
//!
//! Defines the [`TextModel`] trait and concrete implementations:
//! - **[`DisabledModel`]**: returns errors; used when no provider is
//!   configured. Callers fall back to deterministic output.
//! - **[`GeminiModel`]**: calls the Gemini `generateContent` REST API.
//!
//! There is deliberately no retry loop here: the analysis pipeline makes at
//! most one call per attempt, and a retry would break that invariant.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{LensError, Result};

/// One bounded round trip to a generative-text service.
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Returns the model identifier recorded alongside persisted results.
    fn model_name(&self) -> &str;

    /// True when calls can actually reach a service. When false, callers
    /// must not count an invocation against their call budget.
    fn is_available(&self) -> bool {
        true
    }

    /// Send one prompt, return the raw response text.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// A no-op model that always errors. Selected by `provider = "disabled"`.
pub struct DisabledModel;

#[async_trait]
impl TextModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(LensError::Other(
            "generative provider is disabled".to_string(),
        ))
    }
}

/// Gemini `generateContent` client.
///
/// Requires the `GEMINI_API_KEY` environment variable.
pub struct GeminiModel {
    client: reqwest::Client,
    model: String,
    api_key: String,
}

impl GeminiModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| LensError::Other("llm.model required for gemini provider".to_string()))?;

        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| LensError::Other("GEMINI_API_KEY environment variable not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LensError::Other(e.to_string()))?;

        Ok(Self {
            client,
            model,
            api_key,
        })
    }
}

#[async_trait]
impl TextModel for GeminiModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(LensError::Network(format!(
                "Gemini API error {status}: {body_text}"
            )));
        }

        let json: Value = response.json().await?;
        parse_gemini_response(&json)
    }
}

/// Extract `candidates[0].content.parts[*].text` from a generateContent
/// response.
fn parse_gemini_response(json: &Value) -> Result<String> {
    let parts = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            LensError::BadModelResponse("Gemini response missing candidates".to_string())
        })?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.is_empty() {
        return Err(LensError::BadModelResponse(
            "Gemini response contained no text".to_string(),
        ));
    }

    Ok(text)
}

/// Create the appropriate [`TextModel`] based on configuration.
pub fn create_model(config: &LlmConfig) -> Result<Box<dyn TextModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledModel)),
        "gemini" => Ok(Box::new(GeminiModel::new(config)?)),
        other => Err(LensError::Other(format!("Unknown llm provider: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_gemini_response() {
        let json = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "hello " }, { "text": "world" }] }
            }]
        });
        assert_eq!(parse_gemini_response(&json).unwrap(), "hello world");
    }

    #[test]
    fn test_parse_gemini_response_missing_candidates() {
        assert!(parse_gemini_response(&json!({})).is_err());
        assert!(parse_gemini_response(&json!({"candidates": []})).is_err());
    }

    #[tokio::test]
    async fn test_disabled_model_errors() {
        let model = DisabledModel;
        assert!(!model.is_available());
        assert!(model.generate("anything").await.is_err());
    }

    #[test]
    fn test_create_model_unknown_provider() {
        let config = LlmConfig {
            provider: "oracle".to_string(),
            model: None,
            timeout_secs: 10,
        };
        assert!(create_model(&config).is_err());
    }
}
