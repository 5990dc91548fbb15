//! HTTP client for the judgment service.
//!
//! Speaks an Ollama-style API for local model inference. The prompt embeds
//! the requirement and a truncated artifact context; the response must lead
//! with a verdict token (PASS/FAIL/ERROR) followed by reasoning, with
//! evidence lines prefixed `EVIDENCE:`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Evaluation, Evaluator, EvaluatorError, Verdict};

/// Prompt template for compliance judgment. Uses {requirement} and {context}
/// placeholders.
pub const JUDGE_PROMPT: &str = r#"You are a compliance auditor. Decide whether the source artifact below satisfies the requirement.

Requirement:
{requirement}

Artifact context:
{context}

Respond with the verdict on the first line: exactly PASS, FAIL, or ERROR.
Follow with your reasoning. Cite supporting lines each on their own line prefixed with "EVIDENCE: "."#;

/// Configuration for the judgment service client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Whether external judgment is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Ollama API endpoint (default: http://localhost:11434)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model to use for judgment
    #[serde(default = "default_model")]
    pub model: String,
    /// Maximum tokens in response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Temperature for generation (0.0 - 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum characters of artifact context to send
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

fn default_enabled() -> bool {
    true
}
fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "llama3.2:3b".to_string()
}
fn default_max_tokens() -> u32 {
    512
}
fn default_temperature() -> f32 {
    0.1
}
fn default_timeout_secs() -> u64 {
    300
}
fn default_max_context_chars() -> usize {
    12000
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            endpoint: default_endpoint(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

impl JudgeConfig {
    /// Read configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var("JUDGE_ENDPOINT") {
            if !value.is_empty() {
                config.endpoint = value;
            }
        }
        if let Ok(value) = std::env::var("JUDGE_MODEL") {
            if !value.is_empty() {
                config.model = value;
            }
        }
        if let Ok(value) = std::env::var("JUDGE_ENABLED") {
            config.enabled = !matches!(value.as_str(), "0" | "false" | "no");
        }
        if let Ok(value) = std::env::var("JUDGE_TIMEOUT_SECS") {
            if let Ok(parsed) = value.parse() {
                config.timeout_secs = parsed;
            }
        }
        if let Ok(value) = std::env::var("MAX_CONTEXT_CHARS") {
            if let Ok(parsed) = value.parse() {
                config.max_context_chars = parsed;
            }
        }
        config
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

/// Judgment service client.
pub struct JudgeClient {
    config: JudgeConfig,
    client: Client,
}

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama API response format.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    #[allow(dead_code)]
    done: bool,
}

impl JudgeClient {
    /// Create a new client with the given configuration.
    pub fn new(config: JudgeConfig) -> Result<Self, EvaluatorError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EvaluatorError::Connection(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Get the config.
    pub fn config(&self) -> &JudgeConfig {
        &self.config
    }

    /// Check if the judgment service is available.
    pub async fn is_available(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let url = format!("{}/api/tags", self.config.endpoint);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Truncate context to configured maximum (UTF-8 safe).
    fn truncate_context<'a>(&self, text: &'a str) -> &'a str {
        if text.len() <= self.config.max_context_chars {
            return text;
        }
        let mut end = self.config.max_context_chars;
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        &text[..end]
    }

    fn build_prompt(&self, artifact_context: &str, requirement_text: &str) -> String {
        JUDGE_PROMPT
            .replace("{requirement}", requirement_text)
            .replace("{context}", self.truncate_context(artifact_context))
    }

    /// Parse a judgment response: verdict token first, then reasoning, with
    /// evidence lines prefixed `EVIDENCE:`.
    fn parse_response(&self, response: &str) -> Result<Evaluation, EvaluatorError> {
        let mut lines = response.lines().filter(|l| !l.trim().is_empty());

        let verdict_line = lines
            .next()
            .ok_or_else(|| EvaluatorError::Parse("empty response".to_string()))?;
        // Models decorate the verdict ("**FAIL**", "PASS - compliant"); match
        // a leading token and keep anything after it as reasoning.
        let stripped = verdict_line
            .trim()
            .trim_start_matches(|c: char| !c.is_ascii_alphabetic());
        let token_len = stripped
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(stripped.len());
        let status = Verdict::from_str(&stripped[..token_len].to_uppercase()).ok_or_else(|| {
            EvaluatorError::Parse(format!("no verdict token in: {}", verdict_line.trim()))
        })?;

        let mut reasoning_lines = Vec::new();
        let trailing = stripped[token_len..]
            .trim_start_matches(|c: char| c.is_whitespace() || "-:*.".contains(c))
            .trim_end();
        if !trailing.is_empty() {
            reasoning_lines.push(trailing);
        }
        let mut evidence = Vec::new();
        for line in lines {
            let trimmed = line.trim();
            if let Some(rest) = trimmed.strip_prefix("EVIDENCE:") {
                let entry = rest.trim();
                if !entry.is_empty() {
                    evidence.push(entry.to_string());
                }
            } else {
                reasoning_lines.push(trimmed);
            }
        }

        let reasoning = if reasoning_lines.is_empty() {
            "No reasoning given.".to_string()
        } else {
            reasoning_lines.join(" ")
        };

        Ok(Evaluation {
            status,
            reasoning,
            evidence,
        })
    }

    /// Call the generate endpoint with a prompt.
    async fn call_judge(&self, prompt: &str) -> Result<String, EvaluatorError> {
        let request = OllamaRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.config.endpoint);
        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| EvaluatorError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(EvaluatorError::Api(format!("HTTP {}: {}", status, body)));
        }

        let ollama_resp: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| EvaluatorError::Parse(e.to_string()))?;

        Ok(ollama_resp.response)
    }
}

#[async_trait]
impl Evaluator for JudgeClient {
    async fn evaluate(
        &self,
        artifact_context: &str,
        requirement_text: &str,
    ) -> Result<Evaluation, EvaluatorError> {
        if !self.config.enabled {
            return Err(EvaluatorError::Disabled);
        }

        let prompt = self.build_prompt(artifact_context, requirement_text);
        debug!("Requesting judgment from {}", self.config.model);
        let response = self.call_judge(&prompt).await?;
        self.parse_response(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> JudgeClient {
        JudgeClient::new(JudgeConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_pass_with_evidence() {
        let response = "PASS\nEncryption is configured at rest.\nEVIDENCE: config.rs:12: aes_256 = true\nEVIDENCE: docs/security.md:3: data encrypted";
        let evaluation = client().parse_response(response).unwrap();
        assert_eq!(evaluation.status, Verdict::Pass);
        assert!(evaluation.reasoning.contains("Encryption"));
        assert_eq!(evaluation.evidence.len(), 2);
    }

    #[test]
    fn test_parse_verdict_with_decoration() {
        let evaluation = client().parse_response("**FAIL**\nNo retention policy found.").unwrap();
        assert_eq!(evaluation.status, Verdict::Fail);
    }

    #[test]
    fn test_parse_verdict_with_trailing_reasoning() {
        let evaluation = client().parse_response("PASS - compliant").unwrap();
        assert_eq!(evaluation.status, Verdict::Pass);
        assert_eq!(evaluation.reasoning, "compliant");

        let evaluation = client()
            .parse_response("ERROR: could not read artifact\nFile was binary.")
            .unwrap();
        assert_eq!(evaluation.status, Verdict::Error);
        assert!(evaluation.reasoning.contains("could not read artifact"));
        assert!(evaluation.reasoning.contains("File was binary."));
    }

    #[test]
    fn test_parse_rejects_missing_verdict() {
        assert!(matches!(
            client().parse_response("The artifact looks fine to me."),
            Err(EvaluatorError::Parse(_))
        ));
        assert!(matches!(
            client().parse_response(""),
            Err(EvaluatorError::Parse(_))
        ));
    }

    #[test]
    fn test_truncate_context_respects_char_boundary() {
        let mut config = JudgeConfig::default();
        config.max_context_chars = 5;
        let client = JudgeClient::new(config).unwrap();
        // Multi-byte character straddles the cut point
        let truncated = client.truncate_context("abcd\u{00e9}f");
        assert!(truncated.len() <= 5);
        assert!(truncated.starts_with("abcd"));
    }

    #[test]
    fn test_prompt_embeds_requirement_and_context() {
        let prompt = client().build_prompt("line 1\nline 2", "Encrypt data at rest");
        assert!(prompt.contains("Encrypt data at rest"));
        assert!(prompt.contains("line 2"));
    }

    #[test]
    fn test_default_config() {
        let config = JudgeConfig::default();
        assert!(config.enabled);
        assert!(config.endpoint.contains("11434"));
        assert_eq!(config.timeout_secs, 300);
    }
}
