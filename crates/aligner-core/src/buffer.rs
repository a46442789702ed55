//! Recent-context buffer.
//!
//! A bounded, TTL-limited window of recent messages per channel. This is
//! the live tier: losing it degrades context injection to "no matches" but
//! never loses decisions or gaps, which live in the database.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::BufferedMessage;

/// How long a buffered message stays eligible for matching (2 hours).
pub const BUFFER_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Per-channel size cap; oldest messages evicted first.
pub const MAX_MESSAGES_PER_CHANNEL: usize = 30;

/// Buffer tuning knobs, defaulting to the production TTL and size cap.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    pub ttl: Duration,
    pub max_messages: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            ttl: BUFFER_TTL,
            max_messages: MAX_MESSAGES_PER_CHANNEL,
        }
    }
}

/// Live occupancy of one channel's buffer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    pub channel_id: String,
    pub message_count: usize,
    /// Millisecond timestamp of the oldest unexpired message
    pub oldest: Option<i64>,
    /// Millisecond timestamp of the newest message
    pub newest: Option<i64>,
}

/// Storage seam for the recent-context window.
///
/// The in-memory implementation is the default; a remote store can slot in
/// behind the same trait without touching the pipeline.
#[async_trait]
pub trait ContextBuffer: Send + Sync {
    /// Append a message to a channel's window, evicting expired and excess
    /// entries. Re-appending the same `message_id` replaces the old copy.
    async fn append(&self, channel_id: &str, message: BufferedMessage) -> Result<()>;

    /// Unexpired messages for a channel, newest first, capped at
    /// `max_messages` and `max_age` (clamped to the buffer TTL).
    async fn recent(
        &self,
        channel_id: &str,
        max_messages: usize,
        max_age: Duration,
    ) -> Result<Vec<BufferedMessage>>;

    async fn channel_stats(&self, channel_id: &str) -> Result<ChannelStats>;
}

/// In-process buffer keyed by channel id. Eviction is lazy: expired entries
/// are dropped on the next append or read touching their channel.
pub struct InMemoryContextBuffer {
    channels: Mutex<HashMap<String, VecDeque<BufferedMessage>>>,
    config: BufferConfig,
}

impl InMemoryContextBuffer {
    pub fn new(config: BufferConfig) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            config,
        }
    }

    fn cutoff(&self, now: i64) -> i64 {
        now - self.config.ttl.as_millis() as i64
    }
}

impl Default for InMemoryContextBuffer {
    fn default() -> Self {
        Self::new(BufferConfig::default())
    }
}

#[async_trait]
impl ContextBuffer for InMemoryContextBuffer {
    async fn append(&self, channel_id: &str, message: BufferedMessage) -> Result<()> {
        let now = now_millis();
        let cutoff = self.cutoff(now);

        let mut channels = self.channels.lock().map_err(|_| Error::LockPoisoned)?;
        let window = channels.entry(channel_id.to_string()).or_default();

        window.retain(|m| m.message_id != message.message_id && m.created_at >= cutoff);
        window.push_back(message);

        while window.len() > self.config.max_messages {
            window.pop_front();
        }

        debug!(
            channel_id,
            buffered = window.len(),
            "appended message to context buffer"
        );
        Ok(())
    }

    async fn recent(
        &self,
        channel_id: &str,
        max_messages: usize,
        max_age: Duration,
    ) -> Result<Vec<BufferedMessage>> {
        let age = max_age.min(self.config.ttl);
        let cutoff = now_millis() - age.as_millis() as i64;

        let channels = self.channels.lock().map_err(|_| Error::LockPoisoned)?;
        let Some(window) = channels.get(channel_id) else {
            return Ok(Vec::new());
        };

        // Newest first by timestamp, not insertion order: callers may
        // backdate messages
        let mut recent: Vec<BufferedMessage> = window
            .iter()
            .filter(|m| m.created_at >= cutoff)
            .cloned()
            .collect();
        recent.sort_by_key(|m| std::cmp::Reverse(m.created_at));
        recent.truncate(max_messages);
        Ok(recent)
    }

    async fn channel_stats(&self, channel_id: &str) -> Result<ChannelStats> {
        let cutoff = self.cutoff(now_millis());

        let channels = self.channels.lock().map_err(|_| Error::LockPoisoned)?;
        let live: Vec<&BufferedMessage> = channels
            .get(channel_id)
            .map(|w| w.iter().filter(|m| m.created_at >= cutoff).collect())
            .unwrap_or_default();

        Ok(ChannelStats {
            channel_id: channel_id.to_string(),
            message_count: live.len(),
            oldest: live.iter().map(|m| m.created_at).min(),
            newest: live.iter().map(|m| m.created_at).max(),
        })
    }
}

/// Current time as a millisecond timestamp.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
