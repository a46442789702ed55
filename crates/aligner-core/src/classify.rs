//! Decision-worthiness classification.
//!
//! Decides whether a message represents an engineering decision and, if so,
//! which kind. Rules apply in priority order, first match wins. Pure
//! function; persisting the decision is the pipeline's job.

use crate::types::{DecisionType, ExtractedEntities};

/// Keywords that, combined with multiple components, mark a technical
/// decision.
pub const DECISION_KEYWORDS: &[&str] = &["decision", "approved", "updated", "changed", "spec"];

/// Minimum distinct components for the keyword rule.
pub const MIN_COMPONENTS_FOR_DECISION: usize = 2;

/// Minimum distinct topics for the confidence rule.
pub const MIN_TOPICS_FOR_DECISION: usize = 2;

/// Extraction confidence required for the topic rule.
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Classify a message's decision-worthiness.
///
/// Rules, first match wins:
/// 1. any requirement ID → `RequirementChange`
/// 2. ≥2 distinct components and a decision keyword → `TechnicalDecision`
/// 3. confidence > 0.8 and ≥2 distinct topics → `Other`
pub fn classify(entities: &ExtractedEntities, text: &str) -> Option<DecisionType> {
    if !entities.requirement_ids.is_empty() {
        return Some(DecisionType::RequirementChange);
    }

    let lower = text.to_lowercase();
    let has_keyword = DECISION_KEYWORDS.iter().any(|kw| lower.contains(kw));
    if entities.components.len() >= MIN_COMPONENTS_FOR_DECISION && has_keyword {
        return Some(DecisionType::TechnicalDecision);
    }

    if entities.confidence > HIGH_CONFIDENCE_THRESHOLD
        && entities.topics.len() >= MIN_TOPICS_FOR_DECISION
    {
        return Some(DecisionType::Other);
    }

    None
}
