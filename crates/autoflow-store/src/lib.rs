//! Persistence layer for Autoflow.
//!
//! Durable state lives in per-collection JSON files ([`JsonStore`]):
//! `workflows.json` for workflow definitions and `intents.json` for learned
//! intents.  Every mutation rewrites the whole collection, which is the right
//! trade-off for low-frequency edits; a store with real write volume would
//! swap in an append log behind the same load/save interface.

pub mod error;
pub mod json_store;

pub use error::{Result, StoreError};
pub use json_store::JsonStore;
