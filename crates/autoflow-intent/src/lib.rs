//! Intent learning and matching for Autoflow.
//!
//! This crate provides:
//!
//! - **Learning**: Keyword-weighted patterns learned from (utterance, action)
//!   pairs, with similar utterances reinforcing an existing intent instead of
//!   creating duplicates ([`IntentEngine::learn`]).
//! - **Matching**: Overlap-times-confidence scoring of free text against
//!   learned patterns ([`IntentEngine::find_match`]).
//! - **Proactive selection**: Picking the intents whose confidence and
//!   cooldown permit autonomous firing ([`IntentEngine::proactive_due`]).

pub mod engine;
pub mod error;
pub mod memory;
pub mod model;

pub use engine::{IntentEngine, IntentMatch};
pub use error::{IntentError, Result};
pub use memory::{MemoryRecall, MemoryRecord};
pub use model::UserIntent;
