//! Intent engine error types.

use uuid::Uuid;

/// Unified error type for the intent engine.
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    /// The referenced intent does not exist.
    #[error("intent not found: {intent_id}")]
    IntentNotFound { intent_id: Uuid },

    /// An utterance with no usable content was submitted.
    #[error("empty utterance")]
    EmptyUtterance,

    /// An error propagated from the persistence layer.
    #[error("store error: {0}")]
    Store(#[from] autoflow_store::StoreError),

    /// Catch-all for unexpected internal errors.
    #[error("internal intent error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the intent crate.
pub type Result<T> = std::result::Result<T, IntentError>;
