//! aligner-core - Core library for Context Aligner
//!
//! This crate provides the message ingestion pipeline shared by the
//! aligner server and its tests:
//!
//! - **extract**: Entity extraction (LLM with pattern fallback)
//! - **classify**: Decision-worthiness classification
//! - **buffer**: TTL-bounded recent-context buffer
//! - **matcher**: Overlap scoring between queries and recent context
//! - **gaps**: Gap synthesis for missing stakeholders
//! - **pipeline**: End-to-end message processing
//! - **db**: SQLite persistence for decisions and gaps

pub mod buffer;
pub mod classify;
pub mod db;
pub mod error;
pub mod extract;
pub mod gaps;
pub mod matcher;
pub mod pipeline;
pub mod types;

// Re-export commonly used types
pub use db::Database;
pub use error::{Error, Result};
pub use pipeline::MessagePipeline;
