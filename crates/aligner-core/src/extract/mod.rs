//! Entity extraction from chat messages.
//!
//! Extraction prefers the LLM boundary when a client is configured and
//! falls back to deterministic pattern matching on any failure. Extraction
//! never blocks message storage: total failure yields an empty entity set
//! with confidence 0.0 and the message is still buffered.

pub mod llm;

pub use llm::{LlmClient, LlmConfig};

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::types::ExtractedEntities;

/// Confidence assigned to pattern-only extraction.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Requirement-ID pattern: alphanumeric prefix + numeric id, case-insensitive.
static REQ_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bREQ-\d+\b").expect("valid regex"));

/// `@user` mentions.
static MENTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(\w+)").expect("valid regex"));

/// Hardware component vocabulary: pattern → canonical component name.
static COMPONENT_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\b(motor|actuator|servo|stepper)\b", "motor"),
        (r"\b(pcb|circuit\s+board|board)\b", "pcb"),
        (r"\b(power\s+supply|psu|voltage|current)\b", "power_supply"),
        (r"\b(firmware|software|code)\b", "firmware"),
        (r"\b(thermal|heat|temperature|cooling)\b", "thermal"),
        (r"\b(mechanical|mounting|assembly)\b", "mechanical"),
        (r"\b(security|encryption|auth)\b", "security"),
        (r"\b(validation|testing|qa|test)\b", "testing"),
        (r"\b(architecture|system|integration)\b", "architecture"),
        (r"\b(protocol|communication|interface)\b", "protocol"),
    ]
    .into_iter()
    .map(|(p, name)| (Regex::new(p).expect("valid regex"), name))
    .collect()
});

/// Engineering topic vocabulary: pattern → topic label.
static TOPIC_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\b(torque|force|power)\b", "mechanical_specs"),
        (r"\b(temperature|thermal|heat)\b", "thermal_management"),
        (r"\b(voltage|current|power)\b", "electrical_specs"),
        (r"\b(can\s+bus|i2c|spi|uart)\b", "communication_protocols"),
        (r"\b(stackup|layer|trace)\b", "pcb_design"),
        (r"\b(boot|secure|encryption)\b", "security_features"),
    ]
    .into_iter()
    .map(|(p, name)| (Regex::new(p).expect("valid regex"), name))
    .collect()
});

/// Entity extractor with an optional LLM boundary.
pub struct EntityExtractor {
    llm: Option<LlmClient>,
}

impl EntityExtractor {
    pub fn new(llm: Option<LlmClient>) -> Self {
        Self { llm }
    }

    /// Extract entities from message text.
    ///
    /// Tries the LLM client first; any failure (timeout, HTTP error,
    /// malformed response) degrades to pattern matching. Infallible by
    /// contract.
    pub async fn extract(&self, text: &str) -> ExtractedEntities {
        if let Some(llm) = &self.llm {
            match llm.extract_entities(text).await {
                Ok(entities) => return entities,
                Err(e) => {
                    warn!("LLM extraction failed, using pattern fallback: {}", e);
                }
            }
        }

        extract_with_patterns(text)
    }

    /// Generate a context-aware reply via the LLM. `None` when no client
    /// is configured or the call fails; the caller supplies its own
    /// fallback.
    pub async fn generate_response(
        &self,
        text: &str,
        context: &[crate::types::BufferedMessage],
    ) -> Option<String> {
        let llm = self.llm.as_ref()?;
        match llm.generate_response(text, context).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                warn!("LLM response generation failed, using summary fallback: {}", e);
                None
            }
        }
    }
}

/// Deterministic pattern-based extraction.
///
/// Always available; used directly when no LLM client is configured and as
/// the fallback when the LLM call fails. Yields `FALLBACK_CONFIDENCE` when
/// anything scoring-relevant matched, 0.0 otherwise.
pub fn extract_with_patterns(text: &str) -> ExtractedEntities {
    let lower = text.to_lowercase();

    let requirement_ids: BTreeSet<String> = REQ_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_uppercase())
        .collect();

    let mentioned_users: BTreeSet<String> = MENTION_PATTERN
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect();

    let components: BTreeSet<String> = COMPONENT_PATTERNS
        .iter()
        .filter(|(pattern, _)| pattern.is_match(&lower))
        .map(|(_, name)| name.to_string())
        .collect();

    let topics: BTreeSet<String> = TOPIC_PATTERNS
        .iter()
        .filter(|(pattern, _)| pattern.is_match(&lower))
        .map(|(_, name)| name.to_string())
        .collect();

    let confidence = if requirement_ids.is_empty() && components.is_empty() && topics.is_empty() {
        0.0
    } else {
        FALLBACK_CONFIDENCE
    };

    ExtractedEntities {
        requirement_ids,
        components,
        topics,
        mentioned_users,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_requirement_ids_case_insensitive() {
        let entities = extract_with_patterns("Updated req-245 and REQ-300 today");
        assert!(entities.requirement_ids.contains("REQ-245"));
        assert!(entities.requirement_ids.contains("REQ-300"));
        assert_eq!(entities.requirement_ids.len(), 2);
    }

    #[test]
    fn extracts_canonical_components() {
        let entities = extract_with_patterns("The servo draws too much current from the PSU");
        assert!(entities.components.contains("motor"));
        assert!(entities.components.contains("power_supply"));
    }

    #[test]
    fn extracts_topics() {
        let entities = extract_with_patterns("Motor torque spec needs review, check CAN bus too");
        assert!(entities.topics.contains("mechanical_specs"));
        assert!(entities.topics.contains("communication_protocols"));
    }

    #[test]
    fn extracts_mentions_without_at_sign() {
        let entities = extract_with_patterns("@alice can you check with @bob?");
        assert!(entities.mentioned_users.contains("alice"));
        assert!(entities.mentioned_users.contains("bob"));
    }

    #[test]
    fn fallback_confidence_when_anything_matched() {
        let entities = extract_with_patterns("motor issue");
        assert_eq!(entities.confidence, FALLBACK_CONFIDENCE);
    }

    #[test]
    fn zero_confidence_on_empty_extraction() {
        let entities = extract_with_patterns("hello there, lunch at noon?");
        assert!(entities.is_empty());
        assert_eq!(entities.confidence, 0.0);
    }

    #[test]
    fn mention_only_message_has_zero_confidence() {
        // Mentions alone are not scoring-relevant
        let entities = extract_with_patterns("ping @carol");
        assert_eq!(entities.confidence, 0.0);
        assert!(entities.mentioned_users.contains("carol"));
    }

    #[tokio::test]
    async fn extractor_without_llm_uses_patterns() {
        let extractor = EntityExtractor::new(None);
        let entities = extractor
            .extract("Updated REQ-245 motor torque 2.0Nm to 2.5Nm")
            .await;
        assert!(entities.requirement_ids.contains("REQ-245"));
        assert!(entities.components.contains("motor"));
        assert_eq!(entities.confidence, FALLBACK_CONFIDENCE);
    }
}
