//! Memory collaborator interface for proactive pattern analysis.
//!
//! The intent engine can inspect recently stored memories to surface
//! candidate automation patterns.  How those memories are produced and what
//! makes a pattern "interesting" is deliberately left to the collaborator —
//! this crate only defines the seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single record recalled from the memory collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// The stored content.
    pub content: String,
    /// Optional category tag (e.g. "command", "conversation").
    pub category: Option<String>,
    /// When the memory was recorded.
    pub created_at: DateTime<Utc>,
}

/// Read access to the external memory system.
#[async_trait]
pub trait MemoryRecall: Send + Sync {
    /// Recall up to `limit` memories relevant to `query`, most recent first.
    async fn recall(&self, query: &str, limit: usize) -> Result<Vec<MemoryRecord>>;
}
