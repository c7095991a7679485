use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ModelTier;

#[derive(Debug, Error)]
pub enum LlmClientError {
    #[error("transport error calling the LLM provider: {0}")]
    Transport(String),
    #[error("LLM provider returned an error: {0}")]
    Provider(String),
    #[error("malformed response from the LLM provider: {0}")]
    Malformed(String),
}

impl LlmClientError {
    /// Transient errors are worth retrying with backoff (spec §4.11, §7);
    /// malformed-schema responses from the judge are handled by the
    /// caller's own bounded retry, not here.
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmClientError::Transport(_))
    }
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Thin client over the Gemini `generateContent` REST endpoint. Calls use
/// deterministic settings (low temperature, bounded tokens) per spec §4.8.
pub struct LlmClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl LlmClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self { http: reqwest::Client::new(), api_key, base_url }
    }

    /// Single-shot generation call, no retry. Callers that need bounded
    /// retry with exponential backoff (the judge, the fixer) call
    /// `generate_with_retry`.
    pub async fn generate(&self, model: &ModelTier, prompt: &str) -> Result<String, LlmClientError> {
        let url = format!("{}/models/{}:generateContent?key={}", self.base_url, model.model_id(), self.api_key);
        let body = GenerateContentRequest {
            contents: vec![Content { parts: vec![Part { text: prompt }] }],
            generation_config: GenerationConfig { temperature: 0.1, max_output_tokens: 8192 },
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmClientError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if status.is_server_error() || status.as_u16() == 429 {
                return Err(LlmClientError::Transport(format!("{status}: {text}")));
            }
            return Err(LlmClientError::Provider(format!("{status}: {text}")));
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| LlmClientError::Malformed(e.to_string()))?;
        let text = parsed
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .and_then(|c| c.parts)
            .and_then(|p| p.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| LlmClientError::Malformed("response had no candidate text".to_string()))?;
        Ok(text)
    }

    /// Exponential backoff with a fixed bound, used for both transient
    /// transport failures and malformed judge responses (spec §4.4, §4.11:
    /// "retry up to three times with exponential backoff").
    pub async fn generate_with_retry(&self, model: &ModelTier, prompt: &str, max_attempts: u32) -> Result<String, LlmClientError> {
        let mut last_err = None;
        for attempt in 0..max_attempts {
            match self.generate(model, prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                    let backoff = Duration::from_millis(200 * 2u64.pow(attempt));
                    tracing::warn!(attempt, %e, "transient LLM provider error, retrying");
                    tokio::time::sleep(backoff).await;
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| LlmClientError::Transport("exhausted retries".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn generate_returns_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/models/.*:generateContent$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "hello"}]}}]
            })))
            .mount(&server)
            .await;

        let client = LlmClient::with_base_url("key".to_string(), server.uri());
        let text = client.generate(&ModelTier::Default, "prompt").await.unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn retries_on_server_error_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/models/.*:generateContent$"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/models/.*:generateContent$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "recovered"}]}}]
            })))
            .mount(&server)
            .await;

        let client = LlmClient::with_base_url("key".to_string(), server.uri());
        let text = client.generate_with_retry(&ModelTier::Default, "prompt", 3).await.unwrap();
        assert_eq!(text, "recovered");
    }
}
