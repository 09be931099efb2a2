//! Error taxonomy for the matching stage
//!
//! Per-event errors (`MissingCollection`, `InvalidRecord`, `UnknownParticle`)
//! are recovered and tallied by the caller. `Configuration` and
//! `InvalidState` abort the run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("collection '{name}' not found in event {event}")]
    MissingCollection { name: String, event: u64 },

    #[error("invalid record {index} in '{collection}': {reason}")]
    InvalidRecord { collection: String, index: usize, reason: &'static str },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid state: cannot {operation} while {state}")]
    InvalidState { operation: &'static str, state: &'static str },

    #[error("unknown particle with PDG id {0}")]
    UnknownParticle(i32),
}

impl StageError {
    /// True for errors that only affect the current event or record
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StageError::MissingCollection { .. }
                | StageError::InvalidRecord { .. }
                | StageError::UnknownParticle(_)
        )
    }
}
