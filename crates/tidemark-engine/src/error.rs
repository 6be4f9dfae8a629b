//! Engine error types

use thiserror::Error;
use tidemark_core::{Direction, MigrationKey, OperationError};
use tidemark_storage::StorageError;

/// Result type alias for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors that stop the engine before or between steps
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] tidemark_core::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("State drift detected: {0}")]
    StateDrift(String),

    #[error(transparent)]
    Step(#[from] StepError),

    #[error("Run cancelled before {0}")]
    Cancelled(MigrationKey),

    #[error("Cannot resolve {key}: {reason}")]
    Resolve { key: MigrationKey, reason: String },
}

impl EngineError {
    pub fn drift(reason: impl Into<String>) -> Self {
        Self::StateDrift(reason.into())
    }

    /// Whether the target store may hold changes the state store does not know about
    pub fn is_partial(&self) -> bool {
        matches!(self, EngineError::Step(step) if step.is_partial())
    }
}

/// Why the state store bookkeeping after a committed step failed
#[derive(Error, Debug)]
pub enum BookkeepingFailure {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("state store write exceeded the step deadline")]
    TimedOut,
}

/// Failure of a single step
#[derive(Error, Debug)]
pub enum StepError {
    #[error("Failed to load the target schema before {direction} {key}: {source}")]
    Load {
        key: MigrationKey,
        direction: Direction,
        source: StorageError,
    },

    #[error("Operation {direction} {key} failed: {source}")]
    Operation {
        key: MigrationKey,
        direction: Direction,
        source: OperationError,
    },

    #[error("Failed to commit {direction} {key} to the target store: {source}")]
    Commit {
        key: MigrationKey,
        direction: Direction,
        source: StorageError,
    },

    #[error("Step {direction} {key} exceeded its deadline{}", timeout_detail(.effect_unknown))]
    Timeout {
        key: MigrationKey,
        direction: Direction,
        effect_unknown: bool,
    },

    #[error("Migration {key} was applied to the target store but not recorded: {cause}")]
    PartiallyApplied {
        key: MigrationKey,
        cause: BookkeepingFailure,
    },

    #[error("Migration {key} was reverted in the target store but not recorded: {cause}")]
    PartiallyReverted {
        key: MigrationKey,
        cause: BookkeepingFailure,
    },
}

fn timeout_detail(effect_unknown: &bool) -> &'static str {
    if *effect_unknown {
        " while committing; the target store state is unknown"
    } else {
        ""
    }
}

impl StepError {
    pub fn key(&self) -> &MigrationKey {
        match self {
            StepError::Load { key, .. }
            | StepError::Operation { key, .. }
            | StepError::Commit { key, .. }
            | StepError::Timeout { key, .. }
            | StepError::PartiallyApplied { key, .. }
            | StepError::PartiallyReverted { key, .. } => key,
        }
    }

    /// True when the target store may have changed without matching bookkeeping.
    ///
    /// Partial failures need manual repair and must never be retried.
    pub fn is_partial(&self) -> bool {
        match self {
            StepError::PartiallyApplied { .. } | StepError::PartiallyReverted { .. } => true,
            StepError::Timeout { effect_unknown, .. } => *effect_unknown,
            _ => false,
        }
    }
}
