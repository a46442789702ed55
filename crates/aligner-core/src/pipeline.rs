//! Message processing pipeline.
//!
//! One entry point, `process_message`, runs the full flow: validate,
//! extract entities, classify and persist decisions, score against the
//! recent-context buffer, and synthesize gaps when overlap is found.
//! Buffer and extraction failures degrade; decision and gap persistence
//! failures propagate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::buffer::{now_millis, ContextBuffer, BUFFER_TTL, MAX_MESSAGES_PER_CHANNEL};
use crate::classify::classify;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::extract::EntityExtractor;
use crate::gaps::GapSynthesizer;
use crate::matcher::{overlapping_entities, OverlapOutcome, OverlapScorer, ScoredMessage};
use crate::types::{
    BufferedMessage, ExtractedEntities, IncomingMessage, NewDecision, ProcessingResult,
};

/// Running counters for the pipeline, exposed via the stats endpoint.
#[derive(Debug, Default)]
pub struct PipelineStats {
    messages_processed: AtomicU64,
    decisions_created: AtomicU64,
    context_injections: AtomicU64,
    gaps_created: AtomicU64,
}

/// Point-in-time snapshot of [`PipelineStats`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub messages_processed: u64,
    pub decisions_created: u64,
    pub context_injections: u64,
    pub gaps_created: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            decisions_created: self.decisions_created.load(Ordering::Relaxed),
            context_injections: self.context_injections.load(Ordering::Relaxed),
            gaps_created: self.gaps_created.load(Ordering::Relaxed),
        }
    }
}

/// The ingestion pipeline. Cheap to share behind an `Arc`.
pub struct MessagePipeline {
    extractor: EntityExtractor,
    buffer: Arc<dyn ContextBuffer>,
    scorer: OverlapScorer,
    gaps: GapSynthesizer,
    db: Arc<Database>,
    stats: PipelineStats,
}

impl MessagePipeline {
    pub fn new(
        extractor: EntityExtractor,
        buffer: Arc<dyn ContextBuffer>,
        db: Arc<Database>,
    ) -> Self {
        Self {
            extractor,
            buffer,
            scorer: OverlapScorer,
            gaps: GapSynthesizer::new(db.clone()),
            db,
            stats: PipelineStats::default(),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Process one inbound message end to end.
    pub async fn process_message(&self, incoming: IncomingMessage) -> Result<ProcessingResult> {
        validate(&incoming)?;
        let created_at = incoming.timestamp.unwrap_or_else(now_millis);

        let mut entities = self.extractor.extract(&incoming.text).await;
        // Chat-layer tags and extracted @mentions are one pool
        entities
            .mentioned_users
            .extend(incoming.mentioned_user_ids.iter().cloned());

        // Persist the decision before buffering so the buffered copy
        // carries the decision id
        let mut decision_id = None;
        let mut decision_created = false;
        if let Some(decision_type) = classify(&entities, &incoming.text) {
            let already = self.db.decision_for_message(&incoming.message_id)?;
            let id = self.db.create_decision(&NewDecision {
                author_id: incoming.author_id.clone(),
                decision_type,
                text: incoming.text.clone(),
                affected_components: entities.components.clone(),
                referenced_reqs: entities.requirement_ids.clone(),
                source_message_id: incoming.message_id.clone(),
                channel_id: incoming.channel_id.clone(),
                created_at,
            })?;
            decision_created = already.is_none();
            if decision_created {
                self.stats.decisions_created.fetch_add(1, Ordering::Relaxed);
                info!(
                    decision_id = %id,
                    decision_type = decision_type.as_str(),
                    "recorded decision"
                );
            }
            decision_id = Some(id);
        }

        // A buffer outage degrades to scoring against an empty window
        let window = match self
            .buffer
            .recent(&incoming.channel_id, MAX_MESSAGES_PER_CHANNEL, BUFFER_TTL)
            .await
        {
            Ok(window) => window,
            Err(e) => {
                warn!("context buffer read failed, proceeding without context: {e}");
                Vec::new()
            }
        };
        // A reprocessed message must not match its own buffered copy
        let window: Vec<BufferedMessage> = window
            .into_iter()
            .filter(|m| m.message_id != incoming.message_id)
            .collect();

        let outcome = self.scorer.score(&entities, &window);
        debug!(
            score = outcome.score,
            confidence = outcome.confidence.as_str(),
            matching = outcome.matching.len(),
            "scored message against context window"
        );

        let buffered = BufferedMessage {
            channel_id: incoming.channel_id.clone(),
            message_id: incoming.message_id.clone(),
            author_id: incoming.author_id.clone(),
            text: incoming.text.clone(),
            entities: entities.clone(),
            mentioned_user_ids: incoming.mentioned_user_ids.clone(),
            created_at,
            decision_id: decision_id.clone(),
        };
        if let Err(e) = self.buffer.append(&incoming.channel_id, buffered).await {
            warn!("context buffer append failed: {e}");
        }

        let mut gap_created = false;
        let mut gap_id = None;
        let mut response = None;
        if outcome.triggered {
            self.stats.context_injections.fetch_add(1, Ordering::Relaxed);

            if let Some(gap) = self
                .gaps
                .synthesize(&incoming.author_id, &entities, &outcome)?
            {
                gap_created = gap.created;
                if gap.created {
                    self.stats.gaps_created.fetch_add(1, Ordering::Relaxed);
                }
                gap_id = Some(gap.gap_id);
            }

            response = Some(self.build_response(&incoming.text, &entities, &outcome).await);
        }

        self.stats.messages_processed.fetch_add(1, Ordering::Relaxed);

        Ok(ProcessingResult {
            decision_created,
            decision_id,
            context_injected: outcome.triggered,
            confidence: outcome.confidence.as_str().to_string(),
            score: outcome.score,
            matching_messages: outcome.matching.len(),
            gap_created,
            gap_id,
            response,
        })
    }

    /// Context-aware reply: LLM when available, deterministic summary as
    /// the fallback.
    async fn build_response(
        &self,
        text: &str,
        entities: &ExtractedEntities,
        outcome: &OverlapOutcome,
    ) -> String {
        let matched: Vec<BufferedMessage> = outcome
            .matching
            .iter()
            .map(|s| s.message.clone())
            .collect();

        match self.extractor.generate_response(text, &matched).await {
            Some(reply) => reply,
            None => summarize_context(entities, &outcome.matching),
        }
    }
}

fn validate(incoming: &IncomingMessage) -> Result<()> {
    if incoming.channel_id.trim().is_empty() {
        return Err(Error::InvalidMessage("channel_id is required".to_string()));
    }
    if incoming.message_id.trim().is_empty() {
        return Err(Error::InvalidMessage("message_id is required".to_string()));
    }
    if incoming.author_id.trim().is_empty() {
        return Err(Error::InvalidMessage("author_id is required".to_string()));
    }
    if incoming.text.trim().is_empty() {
        return Err(Error::InvalidMessage("text is required".to_string()));
    }
    Ok(())
}

/// Deterministic context summary used when no LLM reply is available.
fn summarize_context(entities: &ExtractedEntities, matching: &[ScoredMessage]) -> String {
    let (components, _) = overlapping_entities(entities, matching);

    let summaries: Vec<String> = matching
        .iter()
        .take(2)
        .map(|s| {
            let text: String = s.message.text.chars().take(100).collect();
            format!("Related discussion by {}: {}", s.message.author_id, text)
        })
        .collect();

    format!(
        "Found {} related discussions about {}. Context: {}",
        matching.len(),
        components.iter().cloned().collect::<Vec<_>>().join(", "),
        summaries.join(" | ")
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::buffer::{ChannelStats, InMemoryContextBuffer};

    /// Buffer whose store is unreachable; every call fails.
    struct UnavailableBuffer;

    #[async_trait::async_trait]
    impl ContextBuffer for UnavailableBuffer {
        async fn append(&self, _channel_id: &str, _message: BufferedMessage) -> Result<()> {
            Err(Error::BufferUnavailable("connection refused".to_string()))
        }

        async fn recent(
            &self,
            _channel_id: &str,
            _max_messages: usize,
            _max_age: Duration,
        ) -> Result<Vec<BufferedMessage>> {
            Err(Error::BufferUnavailable("connection refused".to_string()))
        }

        async fn channel_stats(&self, _channel_id: &str) -> Result<ChannelStats> {
            Err(Error::BufferUnavailable("connection refused".to_string()))
        }
    }

    fn pipeline() -> MessagePipeline {
        let db = Arc::new(Database::open_in_memory().unwrap());
        MessagePipeline::new(
            EntityExtractor::new(None),
            Arc::new(InMemoryContextBuffer::default()),
            db,
        )
    }

    fn message(id: &str, author: &str, text: &str) -> IncomingMessage {
        IncomingMessage {
            channel_id: "hardware-team".to_string(),
            message_id: id.to_string(),
            author_id: author.to_string(),
            text: text.to_string(),
            timestamp: None,
            mentioned_user_ids: Default::default(),
        }
    }

    #[tokio::test]
    async fn decision_message_then_overlapping_query_creates_gap() {
        let p = pipeline();

        let first = p
            .process_message(message(
                "m1",
                "alice",
                "Updated REQ-245 motor torque from 2.0Nm to 2.5Nm",
            ))
            .await
            .unwrap();
        assert!(first.decision_created);
        assert!(!first.context_injected);

        let second = p
            .process_message(message(
                "m2",
                "bob",
                "What's the current motor power requirements for the new specs?",
            ))
            .await
            .unwrap();
        assert!(second.context_injected);
        assert_eq!(second.confidence, "high");
        assert!(second.gap_created);
        assert!(second.gap_id.is_some());
        assert!(second.response.is_some());

        // Bob's question names two components plus the "spec" keyword, so
        // it is itself recorded as a technical decision
        assert!(second.decision_created);

        let stats = p.stats();
        assert_eq!(stats.messages_processed, 2);
        assert_eq!(stats.decisions_created, 2);
        assert_eq!(stats.context_injections, 1);
        assert_eq!(stats.gaps_created, 1);
    }

    #[tokio::test]
    async fn repeated_query_injects_but_does_not_duplicate_gap() {
        let p = pipeline();

        p.process_message(message("m1", "alice", "Updated REQ-245 motor torque to 2.5Nm"))
            .await
            .unwrap();
        let first = p
            .process_message(message("m2", "bob", "What about the motor torque?"))
            .await
            .unwrap();
        assert!(first.gap_created);

        let second = p
            .process_message(message("m3", "bob", "Any updates on the motor torque?"))
            .await
            .unwrap();
        assert!(second.context_injected);
        assert!(!second.gap_created);
        assert_eq!(second.gap_id, first.gap_id);
        assert_eq!(p.stats().gaps_created, 1);
    }

    #[tokio::test]
    async fn mentioned_user_query_injects_without_gap() {
        let p = pipeline();

        p.process_message(message(
            "m1",
            "alice",
            "@bob updated REQ-245 motor torque to 2.5Nm",
        ))
        .await
        .unwrap();

        let result = p
            .process_message(message("m2", "bob", "Thanks, what's the new motor spec?"))
            .await
            .unwrap();
        assert!(result.context_injected);
        assert!(!result.gap_created);
        assert!(result.gap_id.is_none());
    }

    #[tokio::test]
    async fn reprocessing_same_message_is_idempotent() {
        let p = pipeline();
        let msg = message("m1", "alice", "Updated REQ-245 motor torque to 2.5Nm");

        let first = p.process_message(msg.clone()).await.unwrap();
        assert!(first.decision_created);

        // Retry does not self-match or double-record the decision
        let second = p.process_message(msg).await.unwrap();
        assert!(!second.decision_created);
        assert_eq!(second.decision_id, first.decision_id);
        assert!(!second.context_injected);
        assert_eq!(p.stats().decisions_created, 1);
    }

    #[tokio::test]
    async fn unrelated_chatter_passes_through() {
        let p = pipeline();

        p.process_message(message("m1", "alice", "Updated REQ-245 motor torque"))
            .await
            .unwrap();
        let result = p
            .process_message(message("m2", "bob", "anyone up for lunch?"))
            .await
            .unwrap();

        assert!(!result.decision_created);
        assert!(!result.context_injected);
        assert_eq!(result.score, 0.0);
        assert!(result.response.is_none());
    }

    #[tokio::test]
    async fn buffer_outage_degrades_to_no_context() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let p = MessagePipeline::new(
            EntityExtractor::new(None),
            Arc::new(UnavailableBuffer),
            db.clone(),
        );

        // Classification and persistence proceed without the live tier
        let result = p
            .process_message(message(
                "m1",
                "alice",
                "Updated REQ-245 motor torque from 2.0Nm to 2.5Nm",
            ))
            .await
            .unwrap();
        assert!(result.decision_created);
        assert!(!result.context_injected);
        assert_eq!(result.score, 0.0);
        assert!(!result.gap_created);

        let decision_id = result.decision_id.unwrap();
        assert!(db.get_decision(&decision_id).unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_context_does_not_trigger() {
        let p = pipeline();

        let mut old = message("m1", "alice", "Updated REQ-245 motor torque to 2.5Nm");
        old.timestamp = Some(now_millis() - 3 * 60 * 60 * 1000);
        p.process_message(old).await.unwrap();

        let result = p
            .process_message(message("m2", "bob", "What about the motor torque?"))
            .await
            .unwrap();
        assert!(!result.context_injected);
        assert!(!result.gap_created);
    }

    #[tokio::test]
    async fn blank_fields_are_rejected() {
        let p = pipeline();
        let mut msg = message("m1", "alice", "hello");
        msg.text = "   ".to_string();

        assert!(matches!(
            p.process_message(msg).await,
            Err(Error::InvalidMessage(_))
        ));
    }

    #[tokio::test]
    async fn explicit_mention_ids_suppress_gap() {
        let p = pipeline();

        let mut msg = message("m1", "alice", "Updated REQ-245 motor torque to 2.5Nm");
        msg.mentioned_user_ids.insert("bob".to_string());
        p.process_message(msg).await.unwrap();

        let result = p
            .process_message(message("m2", "bob", "What changed on the motor?"))
            .await
            .unwrap();
        assert!(result.context_injected);
        assert!(!result.gap_created);
    }

    #[tokio::test]
    async fn fallback_response_summarizes_matches() {
        let p = pipeline();

        p.process_message(message("m1", "alice", "Updated REQ-245 motor torque"))
            .await
            .unwrap();
        let result = p
            .process_message(message("m2", "bob", "What about the motor?"))
            .await
            .unwrap();

        let response = result.response.unwrap();
        assert!(response.contains("alice"));
        assert!(response.contains("motor"));
    }
}
