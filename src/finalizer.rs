// Finalizer - single-assignment register for the terminal answer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{info, warn};

/// The terminal answer of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub value: Value,
    /// Where the answer came from (e.g. "execution")
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq)]
pub enum FinalizerError {
    #[error("final answer already set (by {existing_source}); refusing second answer from {source_tag}")]
    MultipleFinalAnswers {
        existing_source: String,
        source_tag: String,
    },
}

/// Guarantees at most one successful assignment per run.
///
/// Every operation goes through one lock so no reader observes a
/// half-written answer, including readers on a cancellation path.
#[derive(Debug, Default)]
pub struct Finalizer {
    slot: Mutex<Option<FinalAnswer>>,
}

impl Finalizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<FinalAnswer>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, value: Value, source: &str) -> Result<FinalAnswer, FinalizerError> {
        let mut slot = self.lock();
        if let Some(existing) = slot.as_ref() {
            warn!(existing = %existing.source, source = source, "second final answer rejected");
            return Err(FinalizerError::MultipleFinalAnswers {
                existing_source: existing.source.clone(),
                source_tag: source.to_string(),
            });
        }

        let answer = FinalAnswer {
            value,
            source: source.to_string(),
            timestamp: Utc::now(),
        };
        *slot = Some(answer.clone());
        info!(source = source, "final answer set");
        Ok(answer)
    }

    pub fn get(&self) -> Option<FinalAnswer> {
        self.lock().clone()
    }

    pub fn is_set(&self) -> bool {
        self.lock().is_some()
    }

    /// Only between independent runs, never mid-run
    pub fn reset(&self) {
        *self.lock() = None;
    }
}
