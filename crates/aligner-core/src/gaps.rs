//! Gap synthesis: recording users who were left out of discussions they
//! should have been part of.
//!
//! A gap is synthesized when a user's message overlaps recent discussion
//! that did not mention them. Synthesis is idempotent per (assignee,
//! context): asking about the same discussion twice yields one gap.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::db::Database;
use crate::error::Result;
use crate::matcher::{overlapping_entities, OverlapOutcome};
use crate::types::{
    ExtractedEntities, GapDetailPayload, GapSeverity, NewGap, RelatedGap,
};

/// Cap on back-references in a relationship detail.
pub const RELATED_GAP_LIMIT: usize = 10;

/// Role recorded on the stakeholder detail.
pub const STAKEHOLDER_ROLE: &str = "should_have_been_notified";

/// Source label for pipeline-created gaps.
pub const REALTIME_SOURCE: &str = "realtime";

/// Relationship type for gaps linked by a shared component.
pub const SHARED_COMPONENT_RELATIONSHIP: &str = "shared_component";

/// Outcome of a synthesis attempt.
#[derive(Debug, Clone)]
pub struct SynthesizedGap {
    pub gap_id: String,
    /// False when an existing gap for the same context was reused
    pub created: bool,
}

/// Turns a triggered overlap into a persisted gap with its detail rows.
pub struct GapSynthesizer {
    db: Arc<Database>,
}

impl GapSynthesizer {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Synthesize a gap for `user_id` from a triggered overlap.
    ///
    /// Returns `None` when the gap is suppressed: the user was mentioned
    /// in one of the matching messages, so they were already in the loop.
    pub fn synthesize(
        &self,
        user_id: &str,
        query: &ExtractedEntities,
        outcome: &OverlapOutcome,
    ) -> Result<Option<SynthesizedGap>> {
        let Some(best) = outcome.best() else {
            return Ok(None);
        };

        let mentioned = outcome.matching.iter().any(|scored| {
            scored
                .message
                .mentioned_user_ids
                .iter()
                .chain(scored.message.entities.mentioned_users.iter())
                .any(|u| u.trim_start_matches('@') == user_id)
        });
        if mentioned {
            return Ok(None);
        }

        // Any decision or message id among the matches identifies this
        // discussion; reuse an existing gap keyed by any of them
        for key in self.candidate_keys(outcome) {
            if let Some(existing) = self.db.gap_for_context(user_id, &key)? {
                return Ok(Some(SynthesizedGap {
                    gap_id: existing.id,
                    created: false,
                }));
            }
        }

        let (components, reqs) = overlapping_entities(query, &outcome.matching);
        let decision_id = outcome
            .matching
            .iter()
            .find_map(|s| s.message.decision_id.clone());
        let context_key = decision_id
            .clone()
            .unwrap_or_else(|| best.message.message_id.clone());

        // Requirement-level overlap means a spec the user depends on moved
        let severity = if reqs.is_empty() {
            GapSeverity::Warning
        } else {
            GapSeverity::Critical
        };

        // Query related gaps before inserting so the new gap never
        // references itself
        let related = self.db.find_gaps_sharing_component(&components, RELATED_GAP_LIMIT)?;

        let new_gap = NewGap {
            assignee_id: user_id.to_string(),
            decision_id,
            context_key: context_key.clone(),
            description: gap_description(user_id, &components, &reqs),
            recommendation: format!(
                "Include {user_id} in future discussions about overlapping components"
            ),
            severity,
        };

        let gap_id = match self.db.create_gap(&new_gap) {
            Ok(id) => id,
            Err(e) if e.is_constraint_violation() => {
                // Raced with another synthesis for the same context
                warn!(user_id, context_key, "gap already recorded, reusing");
                let existing = self
                    .db
                    .gap_for_context(user_id, &context_key)?
                    .ok_or(e)?;
                return Ok(Some(SynthesizedGap {
                    gap_id: existing.id,
                    created: false,
                }));
            }
            Err(e) => return Err(e),
        };

        self.db.create_gap_detail(
            &gap_id,
            &GapDetailPayload::Context {
                components: components.clone(),
                requirement_ids: reqs,
                matching_messages: outcome.matching.len(),
                source: REALTIME_SOURCE.to_string(),
            },
        )?;
        self.db.create_gap_detail(
            &gap_id,
            &GapDetailPayload::Stakeholder {
                user_id: user_id.to_string(),
                role: STAKEHOLDER_ROLE.to_string(),
            },
        )?;
        // Relationship detail is always written, even when empty, so
        // consumers see a fixed detail shape
        self.db.create_gap_detail(
            &gap_id,
            &GapDetailPayload::Relationship {
                related: related
                    .into_iter()
                    .map(|(gap, shared_components)| RelatedGap {
                        gap_id: gap.id,
                        shared_components,
                    })
                    .collect(),
                relationship_type: SHARED_COMPONENT_RELATIONSHIP.to_string(),
            },
        )?;

        info!(gap_id, user_id, "created gap for missing stakeholder");
        Ok(Some(SynthesizedGap {
            gap_id,
            created: true,
        }))
    }

    /// All keys that could identify this discussion's existing gap: every
    /// matched decision id and message id.
    fn candidate_keys(&self, outcome: &OverlapOutcome) -> Vec<String> {
        let mut keys = Vec::new();
        for scored in &outcome.matching {
            if let Some(decision_id) = &scored.message.decision_id {
                keys.push(decision_id.clone());
            }
            keys.push(scored.message.message_id.clone());
        }
        keys
    }
}

/// Describe what overlapped, mirroring the injected-context summary.
fn gap_description(
    user_id: &str,
    components: &BTreeSet<String>,
    reqs: &BTreeSet<String>,
) -> String {
    let mut parts = Vec::new();
    if !reqs.is_empty() {
        let reqs_str = reqs.iter().cloned().collect::<Vec<_>>().join(", ");
        parts.push(format!("Requirements {reqs_str} mentioned"));
    }
    if !components.is_empty() {
        let components_str = components.iter().cloned().collect::<Vec<_>>().join(", ");
        parts.push(format!("Components {components_str} discussed"));
    }
    let context_info = parts.join(" and ");

    format!(
        "User {user_id} mentioned {context_info} that were previously discussed \
         without their involvement. Consider including them in future related \
         decisions."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_with_patterns;
    use crate::matcher::OverlapScorer;
    use crate::types::BufferedMessage;

    fn buffered(id: &str, text: &str, decision_id: Option<&str>) -> BufferedMessage {
        BufferedMessage {
            channel_id: "eng".to_string(),
            message_id: id.to_string(),
            author_id: "alice".to_string(),
            text: text.to_string(),
            entities: extract_with_patterns(text),
            mentioned_user_ids: Default::default(),
            created_at: 1_700_000_000_000,
            decision_id: decision_id.map(|d| d.to_string()),
        }
    }

    fn outcome_for(query_text: &str, window: Vec<BufferedMessage>) -> (ExtractedEntities, OverlapOutcome) {
        let query = extract_with_patterns(query_text);
        let outcome = OverlapScorer.score(&query, &window);
        (query, outcome)
    }

    #[test]
    fn synthesizes_gap_with_three_details() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let synth = GapSynthesizer::new(db.clone());

        let window = vec![buffered("m1", "Updated REQ-245 motor torque to 2.5Nm", Some("dec-1"))];
        let (query, outcome) = outcome_for("What about REQ-245 motor specs?", window);

        let gap = synth.synthesize("bob", &query, &outcome).unwrap().unwrap();
        assert!(gap.created);

        let stored = db.get_gap(&gap.gap_id).unwrap().unwrap();
        assert_eq!(stored.assignee_id, "bob");
        assert_eq!(stored.context_key, "dec-1");
        assert_eq!(stored.severity, GapSeverity::Critical);
        assert!(stored.description.contains("REQ-245"));

        let details = db.list_gap_details(&gap.gap_id).unwrap();
        assert_eq!(details.len(), 3);
        assert_eq!(details[0].payload.detail_type(), "context");
        assert_eq!(details[1].payload.detail_type(), "stakeholder");
        assert_eq!(details[2].payload.detail_type(), "relationship");

        // Relationship detail is present but empty for the first gap
        let GapDetailPayload::Relationship { related, .. } = &details[2].payload else {
            panic!("expected relationship detail");
        };
        assert!(related.is_empty());
    }

    #[test]
    fn suppressed_when_user_was_mentioned() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let synth = GapSynthesizer::new(db);

        let window = vec![buffered(
            "m1",
            "@bob updated REQ-245 motor torque to 2.5Nm",
            None,
        )];
        let (query, outcome) = outcome_for("What about REQ-245 motor specs?", window);

        assert!(synth.synthesize("bob", &query, &outcome).unwrap().is_none());
    }

    #[test]
    fn repeated_query_reuses_existing_gap() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let synth = GapSynthesizer::new(db.clone());

        let window = vec![buffered("m1", "Updated REQ-245 motor torque", Some("dec-1"))];
        let (query, outcome) = outcome_for("What about REQ-245?", window.clone());
        let first = synth.synthesize("bob", &query, &outcome).unwrap().unwrap();
        assert!(first.created);

        // Second query about the same discussion, now also matching bob's
        // own first question buffered without a decision id
        let mut window2 = window;
        window2.push(buffered("m2", "What about REQ-245?", None));
        let (query2, outcome2) = outcome_for("Any news on REQ-245?", window2);
        let second = synth.synthesize("bob", &query2, &outcome2).unwrap().unwrap();
        assert!(!second.created);
        assert_eq!(second.gap_id, first.gap_id);
    }

    #[test]
    fn component_only_overlap_is_warning() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let synth = GapSynthesizer::new(db.clone());

        let window = vec![buffered("m1", "motor mount redesign approved", None)];
        let (query, outcome) = outcome_for("How is the motor doing?", window);

        let gap = synth.synthesize("bob", &query, &outcome).unwrap().unwrap();
        let stored = db.get_gap(&gap.gap_id).unwrap().unwrap();
        assert_eq!(stored.severity, GapSeverity::Warning);
        // No decision in the window: keyed by the best matching message
        assert_eq!(stored.context_key, "m1");
    }

    #[test]
    fn second_gap_links_back_through_shared_component() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let synth = GapSynthesizer::new(db.clone());

        let window = vec![buffered("m1", "Updated REQ-245 motor torque", Some("dec-1"))];
        let (query, outcome) = outcome_for("What about the motor?", window);
        let first = synth.synthesize("bob", &query, &outcome).unwrap().unwrap();

        let window = vec![buffered("m2", "motor driver firmware approved and updated", Some("dec-2"))];
        let (query, outcome) = outcome_for("Did the motor firmware change?", window);
        let second = synth.synthesize("carol", &query, &outcome).unwrap().unwrap();
        assert!(second.created);

        let details = db.list_gap_details(&second.gap_id).unwrap();
        let GapDetailPayload::Relationship { related, relationship_type } = &details[2].payload
        else {
            panic!("expected relationship detail");
        };
        assert_eq!(relationship_type, SHARED_COMPONENT_RELATIONSHIP);
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].gap_id, first.gap_id);
        assert!(related[0].shared_components.contains("motor"));
    }
}
