//! Application state.

use std::sync::Arc;
use std::time::Instant;

use aligner_core::buffer::{ContextBuffer, InMemoryContextBuffer};
use aligner_core::extract::{EntityExtractor, LlmClient};
use aligner_core::{Database, MessagePipeline};

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,
    /// Database connection
    pub db: Arc<Database>,
    /// Recent-context buffer (shared with the pipeline)
    pub buffer: Arc<dyn ContextBuffer>,
    /// Message processing pipeline
    pub pipeline: Arc<MessagePipeline>,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, db: Database) -> anyhow::Result<Arc<Self>> {
        let db = Arc::new(db);
        let buffer: Arc<dyn ContextBuffer> = Arc::new(InMemoryContextBuffer::default());

        let llm = match &config.llm {
            Some(llm_config) => Some(LlmClient::new(llm_config.clone())?),
            None => None,
        };
        let pipeline = Arc::new(MessagePipeline::new(
            EntityExtractor::new(llm),
            buffer.clone(),
            db.clone(),
        ));

        Ok(Arc::new(Self {
            config: Arc::new(config),
            db,
            buffer,
            pipeline,
            start_time: Instant::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_wires_pipeline_without_llm() {
        let db = Database::open_in_memory().unwrap();
        let state = AppState::new(Config::default(), db).unwrap();

        assert!(state.db.ping().is_ok());
        assert_eq!(state.pipeline.stats().messages_processed, 0);
    }
}
