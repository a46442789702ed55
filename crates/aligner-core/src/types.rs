//! Shared types for aligner-core.
//!
//! These types are used by the pipeline, the database layer, and the REST
//! API. Entity sets are `BTreeSet` so iteration order (and therefore
//! scoring and serialization) is deterministic.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Entities
// ─────────────────────────────────────────────────────────────────────────────

/// Structured entities extracted from one message. Immutable after creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractedEntities {
    /// Requirement IDs, normalized upper-case (e.g. "REQ-245")
    pub requirement_ids: BTreeSet<String>,
    /// Canonical component names (motor, pcb, power_supply, ...)
    pub components: BTreeSet<String>,
    /// Topic labels (mechanical_specs, thermal_management, ...)
    pub topics: BTreeSet<String>,
    /// `@user` mentions, stored without the leading `@`
    pub mentioned_users: BTreeSet<String>,
    /// Extraction confidence in [0, 1]
    pub confidence: f64,
}

impl ExtractedEntities {
    /// True when nothing scoring-relevant was extracted.
    pub fn is_empty(&self) -> bool {
        self.requirement_ids.is_empty() && self.components.is_empty() && self.topics.is_empty()
    }
}

/// A message held in the recent-context buffer. Owned by the buffer for its
/// lifetime; dropped on TTL expiry or size eviction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferedMessage {
    pub channel_id: String,
    pub message_id: String,
    pub author_id: String,
    pub text: String,
    pub entities: ExtractedEntities,
    pub mentioned_user_ids: BTreeSet<String>,
    /// Millisecond timestamp
    pub created_at: i64,
    /// Link to the decision created from this message, if any
    pub decision_id: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Decisions
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of engineering decision a message represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    RequirementChange,
    TechnicalDecision,
    Other,
}

impl DecisionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequirementChange => "requirement_change",
            Self::TechnicalDecision => "technical_decision",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "requirement_change" => Some(Self::RequirementChange),
            "technical_decision" => Some(Self::TechnicalDecision),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// A persisted engineering decision. Permanent tier; never mutated after
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub author_id: String,
    pub decision_type: DecisionType,
    pub text: String,
    pub affected_components: BTreeSet<String>,
    pub referenced_reqs: BTreeSet<String>,
    /// Message this decision was extracted from. Unique: retries cannot
    /// create a second row.
    pub source_message_id: String,
    pub channel_id: String,
    pub created_at: i64,
}

/// Input for creating a new decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDecision {
    pub author_id: String,
    pub decision_type: DecisionType,
    pub text: String,
    pub affected_components: BTreeSet<String>,
    pub referenced_reqs: BTreeSet<String>,
    pub source_message_id: String,
    pub channel_id: String,
    pub created_at: i64,
}

/// Filter for listing decisions
#[derive(Debug, Clone, Default)]
pub struct DecisionFilter {
    pub author_id: Option<String>,
    pub component: Option<String>,
    pub limit: Option<usize>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Gaps
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapSeverity {
    Critical,
    Warning,
}

impl GapSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(Self::Critical),
            "warning" => Some(Self::Warning),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl GapStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "acknowledged" => Some(Self::Acknowledged),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

/// A record of a user who should have been, but was not, included in the
/// discussion underlying a decision. Mutable only in `priority` and
/// `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gap {
    pub id: String,
    /// The user who should have been included
    pub assignee_id: String,
    pub decision_id: Option<String>,
    /// Idempotence key: the decision id when the matched context carries
    /// one, else the highest-scoring matching message id.
    /// UNIQUE(assignee_id, context_key).
    pub context_key: String,
    pub description: String,
    pub recommendation: String,
    pub severity: GapSeverity,
    pub status: GapStatus,
    /// User-adjustable ordering; defaults to insertion order
    pub priority: i32,
    pub created_at: i64,
}

/// Input for creating a new gap
#[derive(Debug, Clone)]
pub struct NewGap {
    pub assignee_id: String,
    pub decision_id: Option<String>,
    pub context_key: String,
    pub description: String,
    pub recommendation: String,
    pub severity: GapSeverity,
}

/// Filter for listing gaps
#[derive(Debug, Clone, Default)]
pub struct GapFilter {
    pub assignee_id: Option<String>,
    pub status: Option<GapStatus>,
    pub limit: Option<usize>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Gap details
// ─────────────────────────────────────────────────────────────────────────────

/// Pointer from a relationship detail to a prior gap sharing a component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelatedGap {
    pub gap_id: String,
    pub shared_components: BTreeSet<String>,
}

/// Typed payload of a gap detail row, tagged by detail type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GapDetailPayload {
    /// What overlapped and where the gap came from
    Context {
        components: BTreeSet<String>,
        requirement_ids: BTreeSet<String>,
        matching_messages: usize,
        /// "realtime" for pipeline-created gaps
        source: String,
    },
    /// Who was missing from the discussion
    Stakeholder { user_id: String, role: String },
    /// Back-references to prior gaps sharing a component
    Relationship {
        related: Vec<RelatedGap>,
        relationship_type: String,
    },
    /// Free-form recommendation (manually created gaps)
    Recommendation { text: String },
}

impl GapDetailPayload {
    pub fn detail_type(&self) -> &'static str {
        match self {
            Self::Context { .. } => "context",
            Self::Stakeholder { .. } => "stakeholder",
            Self::Relationship { .. } => "relationship",
            Self::Recommendation { .. } => "recommendation",
        }
    }
}

/// A stored gap detail row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapDetail {
    pub id: String,
    pub gap_id: String,
    pub payload: GapDetailPayload,
    pub created_at: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline I/O
// ─────────────────────────────────────────────────────────────────────────────

/// An inbound chat message, pre-extraction.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub channel_id: String,
    pub message_id: String,
    pub author_id: String,
    pub text: String,
    /// Millisecond timestamp; defaults to now
    pub timestamp: Option<i64>,
    /// Users explicitly tagged by the chat layer (merged with extracted
    /// `@mentions`)
    #[serde(default)]
    pub mentioned_user_ids: BTreeSet<String>,
}

/// Outcome of processing one message through the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    pub decision_created: bool,
    pub decision_id: Option<String>,
    pub context_injected: bool,
    pub confidence: String,
    pub score: f64,
    pub matching_messages: usize,
    pub gap_created: bool,
    pub gap_id: Option<String>,
    /// Context-aware reply when context was injected
    pub response: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_type_round_trip() {
        for ty in [
            DecisionType::RequirementChange,
            DecisionType::TechnicalDecision,
            DecisionType::Other,
        ] {
            assert_eq!(DecisionType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(DecisionType::parse("bogus"), None);
    }

    #[test]
    fn gap_enums_round_trip() {
        assert_eq!(GapSeverity::parse("critical"), Some(GapSeverity::Critical));
        assert_eq!(GapSeverity::parse("warning"), Some(GapSeverity::Warning));
        assert_eq!(GapStatus::parse("open"), Some(GapStatus::Open));
        assert_eq!(GapStatus::parse("resolved"), Some(GapStatus::Resolved));
        assert_eq!(GapStatus::parse(""), None);
    }

    #[test]
    fn detail_payload_tagged_serialization() {
        let payload = GapDetailPayload::Stakeholder {
            user_id: "bob".to_string(),
            role: "should_have_been_notified".to_string(),
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "stakeholder");
        assert_eq!(json["user_id"], "bob");

        let back: GapDetailPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
        assert_eq!(back.detail_type(), "stakeholder");
    }

    #[test]
    fn entities_is_empty_ignores_mentions() {
        let mut entities = ExtractedEntities::default();
        entities.mentioned_users.insert("alice".to_string());
        assert!(entities.is_empty());

        entities.components.insert("motor".to_string());
        assert!(!entities.is_empty());
    }
}
