//! LLM boundary: entity extraction and response generation.
//!
//! Talks to an OpenAI-compatible chat-completions endpoint. Both calls are
//! fallible and latency-bearing; the request timeout is caller-imposed via
//! [`LlmConfig`] and every failure is recoverable (the extractor falls back
//! to patterns, the pipeline falls back to a deterministic summary).

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{BufferedMessage, ExtractedEntities};

/// Confidence assumed when the model omits the field.
const DEFAULT_LLM_CONFIDENCE: f64 = 0.8;

/// LLM client configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Chat-completions endpoint URL
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Per-request timeout (reference budget: sub-second for extraction)
    pub timeout: Duration,
}

/// Client for the chat-completions endpoint.
#[derive(Clone)]
pub struct LlmClient {
    config: LlmConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Wire format of the extraction response, tolerant of missing fields.
#[derive(Deserialize)]
struct WireEntities {
    #[serde(default)]
    reqs: Vec<String>,
    #[serde(default)]
    components: Vec<String>,
    #[serde(default)]
    users_mentioned: Vec<String>,
    #[serde(default)]
    topics: Vec<String>,
    confidence: Option<f64>,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, client })
    }

    /// Extract entities from message text via the LLM.
    pub async fn extract_entities(&self, text: &str) -> Result<ExtractedEntities> {
        let prompt = format!(
            "Extract entities from this hardware engineering message. Be precise and \
             only extract entities that are explicitly mentioned.\n\n\
             Message: \"{text}\"\n\n\
             Return JSON with these fields:\n\
             - reqs: Array of requirement IDs (REQ-XXX format)\n\
             - components: Array of hardware components (motor, pcb, firmware, etc)\n\
             - users_mentioned: Array of @username mentions\n\
             - topics: Array of engineering topics/concepts\n\
             - confidence: Float 0-1 for extraction confidence\n\n\
             JSON:"
        );

        let content = self.chat(&prompt).await?;
        let wire: WireEntities = serde_json::from_str(strip_code_fence(&content))
            .map_err(|e| Error::Extraction(format!("malformed extraction response: {e}")))?;

        Ok(ExtractedEntities {
            requirement_ids: wire.reqs.into_iter().map(|r| r.to_uppercase()).collect(),
            components: wire.components.into_iter().collect(),
            topics: wire.topics.into_iter().collect(),
            mentioned_users: wire
                .users_mentioned
                .into_iter()
                .map(|u| u.trim_start_matches('@').to_string())
                .collect::<BTreeSet<_>>(),
            confidence: wire.confidence.unwrap_or(DEFAULT_LLM_CONFIDENCE),
        })
    }

    /// Generate a context-aware reply to `text` given matched discussion.
    pub async fn generate_response(
        &self,
        text: &str,
        context: &[BufferedMessage],
    ) -> Result<String> {
        let context_block = context
            .iter()
            .map(|m| format!("- {}: {}", m.author_id, m.text))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "You are an engineering assistant. Answer the question using the recent \
             team discussion below. Mention who discussed what.\n\n\
             Recent discussion:\n{context_block}\n\n\
             Question: {text}\n\nAnswer:"
        );

        self.chat(&prompt).await
    }

    async fn chat(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: 300,
            temperature: 0.1,
        };

        let mut builder = self.client.post(&self.config.endpoint).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?.error_for_status()?;
        let parsed: ChatResponse = response.json().await?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Extraction("empty chat response".to_string()))?;

        debug!("LLM response: {} chars", content.len());
        Ok(content)
    }
}

/// Strip a ```json fence if the model wrapped its output in one.
fn strip_code_fence(s: &str) -> &str {
    let trimmed = s.trim();
    let Some(rest) = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
    else {
        return trimmed;
    };
    rest.trim_end_matches("```").trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn wire_entities_tolerates_missing_fields() {
        let wire: WireEntities = serde_json::from_str("{\"reqs\": [\"req-245\"]}").unwrap();
        assert_eq!(wire.reqs, vec!["req-245"]);
        assert!(wire.components.is_empty());
        assert!(wire.confidence.is_none());
    }

    #[test]
    fn wire_entities_full_payload() {
        let wire: WireEntities = serde_json::from_str(
            "{\"reqs\": [\"REQ-245\"], \"components\": [\"motor\"], \
             \"users_mentioned\": [\"@alice\"], \"topics\": [\"torque_specs\"], \
             \"confidence\": 0.9}",
        )
        .unwrap();
        assert_eq!(wire.components, vec!["motor"]);
        assert_eq!(wire.confidence, Some(0.9));
    }
}
