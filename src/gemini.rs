use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::config::{Config, GenerationParams, SafetySetting};

/// Outcome taxonomy for a single generation exchange. No retries happen at
/// this layer; every failure is surfaced to the caller as-is.
#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("Prompt blocked by safety filters.")]
    Blocked {
        reason: String,
        ratings: Vec<SafetyRating>,
    },

    #[error("No content generated or no candidates in response.")]
    NoContent,

    #[error("API request failed: {0}")]
    Provider(String),
}

/// Narrow seam over the text-generation provider: prompt in, text or failure
/// out. Shared across handlers as `Arc<dyn GenerationBackend>` so tests can
/// substitute a deterministic fake.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
    #[serde(default)]
    pub safety_ratings: Vec<SafetyRating>,
}

/// Ratings keep provider strings verbatim; unknown categories must survive
/// deserialization so they can be surfaced in diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyRating {
    pub category: String,
    pub probability: String,
}

pub struct GeminiClient {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    generation: GenerationParams,
    safety: Vec<SafetySetting>,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.provider.timeout_secs))
            .build()
            .with_context(|| {
                format!("Failed to build HTTP client for {}", config.provider.api_base)
            })?;

        Ok(Self {
            client,
            api_base: config.provider.api_base.clone(),
            api_key: config.provider.api_key.clone(),
            model: config.provider.model.clone(),
            generation: config.generation,
            safety: config.safety.clone(),
        })
    }
}

#[async_trait]
impl GenerationBackend for GeminiClient {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model
        );

        let request_body = json!({
            "contents": [
                { "parts": [{ "text": prompt }] }
            ],
            "generationConfig": {
                "temperature": self.generation.temperature,
                "topK": self.generation.top_k,
                "topP": self.generation.top_p,
                "maxOutputTokens": self.generation.max_output_tokens,
            },
            "safetySettings": self.safety,
        });

        tracing::debug!(model = %self.model, "Sending generateContent request");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| GenerationError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Provider(format!(
                "provider returned status {}: {}",
                status, error_text
            )));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Provider(format!("undecodable response body: {}", e)))?;

        interpret_response(body)
    }
}

/// Maps the decoded provider response onto the outcome taxonomy: first
/// candidate's text on success, the block reason when generation was refused,
/// `NoContent` when the provider returned nothing without explanation.
fn interpret_response(
    body: GenerateContentResponse,
) -> std::result::Result<String, GenerationError> {
    if let Some(candidate) = body.candidates.into_iter().next() {
        let text = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default();
        return Ok(text);
    }

    let feedback = body.prompt_feedback.unwrap_or_default();
    match feedback.block_reason {
        Some(reason) => Err(GenerationError::Blocked {
            reason,
            ratings: feedback.safety_ratings,
        }),
        None => Err(GenerationError::NoContent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn decode(value: serde_json::Value) -> GenerateContentResponse {
        serde_json::from_value(value).expect("decode response")
    }

    #[test]
    fn concatenates_parts_of_the_first_candidate() {
        let body = decode(json!({
            "candidates": [{
                "content": {
                    "parts": [{"text": "Hello "}, {"text": "world"}],
                    "role": "model"
                },
                "finishReason": "STOP"
            }]
        }));
        assert_eq!(interpret_response(body).unwrap(), "Hello world");
    }

    #[test]
    fn block_reason_maps_to_blocked_with_ratings() {
        let body = decode(json!({
            "candidates": [],
            "promptFeedback": {
                "blockReason": "SAFETY",
                "safetyRatings": [
                    {"category": "HARM_CATEGORY_DANGEROUS_CONTENT", "probability": "HIGH"}
                ]
            }
        }));
        match interpret_response(body) {
            Err(GenerationError::Blocked { reason, ratings }) => {
                assert_eq!(reason, "SAFETY");
                assert_eq!(ratings.len(), 1);
                assert_eq!(ratings[0].probability, "HIGH");
            }
            other => panic!("expected Blocked, got {:?}", other),
        }
    }

    #[test]
    fn missing_candidates_without_feedback_map_to_no_content() {
        let body = decode(json!({}));
        assert!(matches!(
            interpret_response(body),
            Err(GenerationError::NoContent)
        ));
    }

    fn client_for(server: &mockito::ServerGuard) -> GeminiClient {
        let mut config = Config::default();
        config.provider.api_base = server.url();
        config.provider.api_key = "test-key".to_string();
        GeminiClient::new(&config).expect("build client")
    }

    #[tokio::test]
    async fn sends_prompt_and_returns_generated_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-1.5-pro-latest:generateContent")
            .match_query(mockito::Matcher::UrlEncoded(
                "key".into(),
                "test-key".into(),
            ))
            .match_body(mockito::Matcher::PartialJson(json!({
                "contents": [{"parts": [{"text": "why does this panic?"}]}],
                "generationConfig": {"temperature": 0.5, "topK": 1},
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "candidates": [{
                        "content": {"parts": [{"text": "LINK: https://a.com"}], "role": "model"}
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let text = client.generate("why does this panic?").await.expect("text");
        assert_eq!(text, "LINK: https://a.com");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_2xx_status_surfaces_as_provider_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/gemini-1.5-pro-latest:generateContent")
            .match_query(mockito::Matcher::Any)
            .with_status(429)
            .with_body(r#"{"error": {"message": "quota exceeded"}}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        match client.generate("prompt").await {
            Err(GenerationError::Provider(detail)) => {
                assert!(detail.contains("429"));
                assert!(detail.contains("quota exceeded"));
            }
            other => panic!("expected Provider error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn undecodable_body_surfaces_as_provider_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/gemini-1.5-pro-latest:generateContent")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let client = client_for(&server);
        assert!(matches!(
            client.generate("prompt").await,
            Err(GenerationError::Provider(_))
        ));
    }
}
