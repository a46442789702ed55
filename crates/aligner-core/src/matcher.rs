//! Overlap scoring between a query and the recent-context window.
//!
//! Scoring is deterministic: entity sets are ordered, each distinct entity
//! contributes once no matter how many buffered messages mention it, and
//! ties rank by buffer recency.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::types::{BufferedMessage, ExtractedEntities};

/// Points per shared requirement ID. Always a high-confidence signal.
pub const REQ_MATCH_POINTS: f64 = 2.0;
/// Points per shared core component. High-confidence signal.
pub const CORE_COMPONENT_POINTS: f64 = 1.5;
/// Points per shared non-core component.
pub const COMPONENT_POINTS: f64 = 1.0;
/// Points per shared topic.
pub const TOPIC_POINTS: f64 = 0.8;
/// Points per query component matched only through a synonym.
pub const SYNONYM_POINTS: f64 = 0.6;
/// Aggregate score at which context injection triggers.
pub const INJECTION_THRESHOLD: f64 = 1.0;

/// Components central enough to the product that sharing one is a strong
/// signal on its own.
pub const CORE_COMPONENTS: &[&str] = &["motor", "pcb", "firmware", "power_supply"];

/// Synonym vocabulary: canonical component → words that imply it in
/// buffered text when the component itself was not extracted.
const COMPONENT_SYNONYMS: &[(&str, &[&str])] = &[
    ("thermal", &["heat", "temperature", "cooling", "dissipation"]),
    (
        "power_supply",
        &["power", "supply", "voltage", "current", "battery", "electrical"],
    ),
    ("motor", &["actuator", "drive", "stepper", "servo"]),
    ("pcb", &["board", "circuit", "layout"]),
    ("firmware", &["software", "code", "programming"]),
    ("testing", &["validation", "qa", "verification"]),
];

/// Confidence band for an overlap outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    High,
    Medium,
    Low,
    None,
}

impl MatchConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::None => "none",
        }
    }
}

/// A buffered message with its individual overlap score, used for ranking.
#[derive(Debug, Clone)]
pub struct ScoredMessage {
    pub message: BufferedMessage,
    pub score: f64,
}

/// Result of scoring a query against a channel window.
#[derive(Debug, Clone)]
pub struct OverlapOutcome {
    /// Aggregate score reached the injection threshold
    pub triggered: bool,
    pub confidence: MatchConfidence,
    /// Aggregate score over distinct entities
    pub score: f64,
    /// Messages with any overlap, strongest first
    pub matching: Vec<ScoredMessage>,
}

impl OverlapOutcome {
    fn empty() -> Self {
        Self {
            triggered: false,
            confidence: MatchConfidence::None,
            score: 0.0,
            matching: Vec::new(),
        }
    }

    /// Strongest matching message, if any.
    pub fn best(&self) -> Option<&ScoredMessage> {
        self.matching.first()
    }
}

/// Stateless scorer; one instance shared across the pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlapScorer;

impl OverlapScorer {
    /// Score `query` against a buffer window.
    ///
    /// The aggregate score counts each distinct shared entity once across
    /// the whole window; per-message scores exist only to rank matches.
    pub fn score(&self, query: &ExtractedEntities, window: &[BufferedMessage]) -> OverlapOutcome {
        if query.is_empty() || window.is_empty() {
            return OverlapOutcome::empty();
        }

        let mut aggregate = 0.0;
        let mut high_signal = false;

        // Distinct entity pools across the whole window
        let mut window_reqs = BTreeSet::new();
        let mut window_components = BTreeSet::new();
        let mut window_topics = BTreeSet::new();
        for m in window {
            window_reqs.extend(m.entities.requirement_ids.iter().cloned());
            window_components.extend(m.entities.components.iter().cloned());
            window_topics.extend(m.entities.topics.iter().cloned());
        }

        let shared_reqs = query.requirement_ids.intersection(&window_reqs).count();
        if shared_reqs > 0 {
            aggregate += shared_reqs as f64 * REQ_MATCH_POINTS;
            high_signal = true;
        }

        for component in query.components.intersection(&window_components) {
            if CORE_COMPONENTS.contains(&component.as_str()) {
                aggregate += CORE_COMPONENT_POINTS;
                high_signal = true;
            } else {
                aggregate += COMPONENT_POINTS;
            }
        }

        aggregate += query.topics.intersection(&window_topics).count() as f64 * TOPIC_POINTS;

        // Synonym credit: query components absent from the window's
        // extracted components but implied by buffered text
        for component in &query.components {
            if window_components.contains(component) {
                continue;
            }
            if let Some(synonyms) = synonyms_for(component) {
                let implied = window.iter().any(|m| {
                    let lower = m.text.to_lowercase();
                    synonyms.iter().any(|s| lower.contains(s))
                });
                if implied {
                    aggregate += SYNONYM_POINTS;
                }
            }
        }

        let mut matching: Vec<ScoredMessage> = window
            .iter()
            .filter_map(|m| {
                let score = message_score(query, m);
                (score > 0.0).then(|| ScoredMessage {
                    message: m.clone(),
                    score,
                })
            })
            .collect();
        // Stable sort keeps the window's newest-first order within ties
        matching.sort_by(|a, b| b.score.total_cmp(&a.score));

        let triggered = aggregate >= INJECTION_THRESHOLD;
        let confidence = if aggregate == 0.0 {
            MatchConfidence::None
        } else if high_signal {
            MatchConfidence::High
        } else if triggered {
            MatchConfidence::Medium
        } else {
            MatchConfidence::Low
        };

        OverlapOutcome {
            triggered,
            confidence,
            score: aggregate,
            matching,
        }
    }
}

/// Score one buffered message against the query. Same point values as the
/// aggregate, minus synonym credit (synonyms rank text, not entities).
fn message_score(query: &ExtractedEntities, message: &BufferedMessage) -> f64 {
    let mut score = query
        .requirement_ids
        .intersection(&message.entities.requirement_ids)
        .count() as f64
        * REQ_MATCH_POINTS;
    for component in query.components.intersection(&message.entities.components) {
        if CORE_COMPONENTS.contains(&component.as_str()) {
            score += CORE_COMPONENT_POINTS;
        } else {
            score += COMPONENT_POINTS;
        }
    }
    score += query.topics.intersection(&message.entities.topics).count() as f64 * TOPIC_POINTS;

    if score == 0.0 {
        let lower = message.text.to_lowercase();
        let implied = query.components.iter().any(|c| {
            synonyms_for(c).is_some_and(|syns| syns.iter().any(|s| lower.contains(s)))
        });
        if implied {
            score = SYNONYM_POINTS;
        }
    }

    score
}

fn synonyms_for(component: &str) -> Option<&'static [&'static str]> {
    COMPONENT_SYNONYMS
        .iter()
        .find(|(name, _)| *name == component)
        .map(|(_, syns)| *syns)
}

/// Entities shared between the query and the matching messages. Used by
/// gap synthesis to describe what overlapped.
pub fn overlapping_entities(
    query: &ExtractedEntities,
    matching: &[ScoredMessage],
) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut components = BTreeSet::new();
    let mut reqs = BTreeSet::new();
    for scored in matching {
        for c in query.components.intersection(&scored.message.entities.components) {
            components.insert(c.clone());
        }
        for r in query
            .requirement_ids
            .intersection(&scored.message.entities.requirement_ids)
        {
            reqs.insert(r.clone());
        }
    }
    (components, reqs)
}
