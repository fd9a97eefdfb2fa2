//! Intent data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Confidence assigned to a freshly learned intent.
pub const INITIAL_CONFIDENCE: f64 = 0.6;

/// Confidence added on each reinforcement, capped at 1.0.
pub const REINFORCEMENT_STEP: f64 = 0.1;

/// A learned utterance pattern, optionally bound to a workflow for
/// proactive firing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIntent {
    /// Unique identifier.
    pub id: Uuid,
    /// The original utterance this intent was learned from.
    pub pattern: String,
    /// Significant keywords extracted from the pattern (length > 3,
    /// case-folded, deduplicated in first-seen order).
    pub keywords: Vec<String>,
    /// The workflow to fire when this intent triggers proactively.
    pub workflow_id: Option<Uuid>,
    /// Free-text label for the action this intent represents.
    pub action: String,
    /// Confidence in [0, 1].  Only ever increases, via reinforcement.
    pub confidence: f64,
    /// Every utterance that contributed to this intent.
    pub learned_from: Vec<String>,
    /// When this intent last fired proactively.
    pub last_triggered: Option<DateTime<Utc>>,
    /// How many times this intent has been reinforced or fired.
    pub trigger_count: u64,
}

impl UserIntent {
    /// Create a new intent from an utterance at the initial confidence.
    pub fn new(pattern: impl Into<String>, action: impl Into<String>) -> Self {
        let pattern = pattern.into();
        Self {
            id: Uuid::now_v7(),
            keywords: keywords_of(&pattern),
            learned_from: vec![pattern.clone()],
            pattern,
            workflow_id: None,
            action: action.into(),
            confidence: INITIAL_CONFIDENCE,
            last_triggered: None,
            trigger_count: 0,
        }
    }

    /// Builder: bind this intent to a workflow.
    pub fn with_workflow(mut self, workflow_id: Uuid) -> Self {
        self.workflow_id = Some(workflow_id);
        self
    }

    /// Reinforce this intent with another contributing utterance.
    pub fn reinforce(&mut self, utterance: &str) {
        self.confidence = (self.confidence + REINFORCEMENT_STEP).min(1.0);
        self.learned_from.push(utterance.to_string());
        self.trigger_count += 1;
    }
}

/// Extract the significant keywords of an utterance: case-folded tokens
/// longer than three characters, deduplicated in first-seen order.
pub fn keywords_of(text: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for token in text.to_lowercase().split_whitespace() {
        if token.len() > 3 && !keywords.iter().any(|k| k == token) {
            keywords.push(token.to_string());
        }
    }
    keywords
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_filter_short_tokens() {
        let kw = keywords_of("remind me to call mom");
        assert_eq!(kw, vec!["remind", "call"]);
    }

    #[test]
    fn keywords_case_fold_and_dedupe() {
        let kw = keywords_of("Backup BACKUP backup photos");
        assert_eq!(kw, vec!["backup", "photos"]);
    }

    #[test]
    fn new_intent_starts_at_initial_confidence() {
        let intent = UserIntent::new("archive old reports weekly", "archive");
        assert!((intent.confidence - INITIAL_CONFIDENCE).abs() < f64::EPSILON);
        assert_eq!(intent.learned_from.len(), 1);
        assert_eq!(intent.trigger_count, 0);
    }

    #[test]
    fn reinforce_caps_at_one() {
        let mut intent = UserIntent::new("archive old reports weekly", "archive");
        for _ in 0..10 {
            intent.reinforce("please archive the old reports");
        }
        assert!((intent.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(intent.learned_from.len(), 11);
        assert_eq!(intent.trigger_count, 10);
    }
}
