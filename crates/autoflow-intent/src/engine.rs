//! Intent engine — learns patterns from utterances and matches new text
//! against them.
//!
//! Intents are held in a `Vec` so that iteration order is insertion order:
//! when two intents tie on score, the first one learned wins, which keeps
//! matching reproducible.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use autoflow_store::JsonStore;

use crate::error::{IntentError, Result};
use crate::memory::MemoryRecall;
use crate::model::{UserIntent, keywords_of};

// ---------------------------------------------------------------------------
// Tuning constants
// ---------------------------------------------------------------------------

/// Fraction of a new utterance's keywords that must overlap an existing
/// intent for the utterance to reinforce it instead of creating a duplicate.
const REINFORCE_OVERLAP: f64 = 0.7;

/// Minimum score for [`IntentEngine::find_match`] to report a match.
const MATCH_THRESHOLD: f64 = 0.5;

/// Minimum confidence for an intent to fire proactively.
const PROACTIVE_CONFIDENCE: f64 = 0.8;

/// Cooldown between proactive firings of the same intent.
const PROACTIVE_COOLDOWN_MS: i64 = 3_600_000;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A successful match of an utterance against a learned intent.
#[derive(Debug, Clone)]
pub struct IntentMatch {
    /// The matched intent.
    pub intent: UserIntent,
    /// Overlap ratio weighted by the intent's confidence.
    pub score: f64,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Learns keyword-weighted intents and matches utterances against them.
///
/// All learned intents are persisted to `intents.json` on every change.
pub struct IntentEngine {
    /// Learned intents in insertion order.
    intents: RwLock<Vec<UserIntent>>,
    /// Backing store for `intents.json`.
    store: JsonStore,
}

impl IntentEngine {
    /// Create an engine backed by the given store.  Call [`Self::load`]
    /// before use to pick up previously persisted intents.
    pub fn new(store: JsonStore) -> Self {
        Self {
            intents: RwLock::new(Vec::new()),
            store,
        }
    }

    /// Load persisted intents from disk, replacing the in-memory set.
    pub async fn load(&self) -> Result<()> {
        let loaded: Vec<UserIntent> = self.store.load().await?;
        info!(intents = loaded.len(), "intents loaded");
        *self.intents.write().await = loaded;
        Ok(())
    }

    /// Learn from an (utterance, action) pair.
    ///
    /// If at least [`REINFORCE_OVERLAP`] of the utterance's keywords already
    /// appear in an existing intent's keyword set, that intent is reinforced
    /// (confidence +0.1 capped at 1.0) instead of creating a duplicate.
    /// Returns the learned or reinforced intent.
    pub async fn learn(
        &self,
        utterance: &str,
        action: &str,
        workflow_id: Option<Uuid>,
    ) -> Result<UserIntent> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Err(IntentError::EmptyUtterance);
        }

        let new_keywords = keywords_of(utterance);
        let mut intents = self.intents.write().await;

        if !new_keywords.is_empty() {
            for intent in intents.iter_mut() {
                let overlap = new_keywords
                    .iter()
                    .filter(|k| intent.keywords.contains(k))
                    .count();
                let ratio = overlap as f64 / new_keywords.len() as f64;
                if ratio >= REINFORCE_OVERLAP {
                    intent.reinforce(utterance);
                    info!(
                        intent_id = %intent.id,
                        confidence = intent.confidence,
                        "intent reinforced"
                    );
                    let reinforced = intent.clone();
                    self.persist(&intents).await?;
                    return Ok(reinforced);
                }
            }
        }

        let mut intent = UserIntent::new(utterance, action);
        if let Some(workflow_id) = workflow_id {
            intent = intent.with_workflow(workflow_id);
        }
        info!(intent_id = %intent.id, action = %intent.action, "new intent learned");

        intents.push(intent.clone());
        self.persist(&intents).await?;
        Ok(intent)
    }

    /// Match an utterance against every learned intent.
    ///
    /// Tokenization here uses all tokens (no length filter).  Each intent is
    /// scored by its keyword overlap ratio weighted by its confidence; the
    /// best score must exceed [`MATCH_THRESHOLD`].  Ties keep the
    /// first-learned intent.
    pub async fn find_match(&self, utterance: &str) -> Option<IntentMatch> {
        let tokens: Vec<String> = utterance
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if tokens.is_empty() {
            return None;
        }

        let intents = self.intents.read().await;
        let mut best: Option<IntentMatch> = None;

        for intent in intents.iter() {
            if intent.keywords.is_empty() {
                continue;
            }
            let overlap = intent
                .keywords
                .iter()
                .filter(|k| tokens.contains(k))
                .count();
            let score = overlap as f64 / intent.keywords.len() as f64 * intent.confidence;

            debug!(intent_id = %intent.id, overlap, score, "intent scored");

            // Strictly-greater comparison preserves first-seen-wins on ties.
            if best.as_ref().is_none_or(|b| score > b.score) {
                best = Some(IntentMatch {
                    intent: intent.clone(),
                    score,
                });
            }
        }

        best.filter(|m| m.score > MATCH_THRESHOLD)
    }

    /// Return the intents eligible for proactive firing at `now`: bound to a
    /// workflow, confidence above [`PROACTIVE_CONFIDENCE`], and outside the
    /// per-intent cooldown window.
    pub async fn proactive_due(&self, now: DateTime<Utc>) -> Vec<UserIntent> {
        let cooldown = Duration::milliseconds(PROACTIVE_COOLDOWN_MS);
        self.intents
            .read()
            .await
            .iter()
            .filter(|intent| {
                intent.workflow_id.is_some()
                    && intent.confidence > PROACTIVE_CONFIDENCE
                    && intent
                        .last_triggered
                        .is_none_or(|last| now - last >= cooldown)
            })
            .cloned()
            .collect()
    }

    /// Record that an intent fired proactively at `now`.
    pub async fn mark_triggered(&self, intent_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut intents = self.intents.write().await;
        let intent = intents
            .iter_mut()
            .find(|i| i.id == intent_id)
            .ok_or(IntentError::IntentNotFound { intent_id })?;
        intent.last_triggered = Some(now);
        intent.trigger_count += 1;
        debug!(intent_id = %intent_id, count = intent.trigger_count, "intent triggered");
        self.persist(&intents).await
    }

    /// Return a snapshot of all learned intents in insertion order.
    pub async fn list(&self) -> Vec<UserIntent> {
        self.intents.read().await.clone()
    }

    /// Fetch a single intent by id.
    pub async fn get(&self, intent_id: Uuid) -> Option<UserIntent> {
        self.intents
            .read()
            .await
            .iter()
            .find(|i| i.id == intent_id)
            .cloned()
    }

    /// Surface candidate automation patterns from recent memories.
    ///
    /// This is a thin seam over the memory collaborator: it recalls recent
    /// records and returns their raw content as candidate patterns.  Deciding
    /// which candidates deserve a learned intent is left to the caller (or a
    /// future analysis pass).
    pub async fn analyze_patterns(
        &self,
        memory: &dyn MemoryRecall,
        limit: usize,
    ) -> Result<Vec<String>> {
        let records = memory.recall("recent user activity", limit).await?;
        if records.is_empty() {
            warn!("memory recall returned no records for pattern analysis");
        }
        Ok(records.into_iter().map(|r| r.content).collect())
    }

    /// Rewrite `intents.json` with the current intent set.
    async fn persist(&self, intents: &[UserIntent]) -> Result<()> {
        self.store.save(intents).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
