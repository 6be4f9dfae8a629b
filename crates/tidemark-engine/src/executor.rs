//! Single-step execution
//!
//! A step runs in fixed phases: load the target snapshot, run the operation
//! on the blocking pool, commit the new snapshot together with a
//! [`StepMarker`], then record the step in the state store. The target store
//! is always written before the state store, so a failure in the last phase
//! is reported as a partial step instead of losing a real change.

use crate::error::{BookkeepingFailure, StepError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tidemark_core::{ChangeRecord, Direction, MigrationKey, OperationError, Schema, StepMarker};
use tidemark_storage::{MarkOutcome, StateStore, StorageResult, TargetStore};
use tokio::time::Instant;

/// Executor settings
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    /// Deadline for a whole step; `None` waits forever
    pub step_timeout: Option<Duration>,

    /// Check `down(up(s)) == s` against the live snapshot before committing
    pub verify_reversible: bool,
}

/// What a successful step did
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub key: MigrationKey,
    pub direction: Direction,
    /// The state store already held the key; nothing was written to it
    pub already_recorded: bool,
    pub elapsed: Duration,
}

/// Applies and reverts change records one at a time
pub struct Executor {
    target: Arc<dyn TargetStore>,
    state: Arc<dyn StateStore>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(target: Arc<dyn TargetStore>, state: Arc<dyn StateStore>) -> Self {
        Self {
            target,
            state,
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn state_store(&self) -> &Arc<dyn StateStore> {
        &self.state
    }

    pub fn target_store(&self) -> &Arc<dyn TargetStore> {
        &self.target
    }

    /// Run `record.up` and record it as applied
    pub async fn apply(&self, record: &ChangeRecord) -> Result<StepOutcome, StepError> {
        self.step(record, Direction::Up).await
    }

    /// Run `record.down` and remove it from the applied set
    pub async fn revert(&self, record: &ChangeRecord) -> Result<StepOutcome, StepError> {
        self.step(record, Direction::Down).await
    }

    async fn step(
        &self,
        record: &ChangeRecord,
        direction: Direction,
    ) -> Result<StepOutcome, StepError> {
        let key = record.key();
        let started = Instant::now();
        let deadline = self.config.step_timeout.map(|timeout| started + timeout);
        tracing::debug!("Starting {} {}", direction, key);

        let schema = within(deadline, self.target.load())
            .await
            .ok_or_else(|| timed_out(key, direction, false))?
            .map_err(|source| StepError::Load {
                key: key.clone(),
                direction,
                source,
            })?;

        let next = within(deadline, self.transform(record, direction, schema))
            .await
            .ok_or_else(|| timed_out(key, direction, false))?
            .map_err(|source| StepError::Operation {
                key: key.clone(),
                direction,
                source,
            })?;

        let marker = StepMarker::new(key.clone(), direction);
        within(deadline, self.target.commit(&next, &marker))
            .await
            .ok_or_else(|| timed_out(key, direction, true))?
            .map_err(|source| StepError::Commit {
                key: key.clone(),
                direction,
                source,
            })?;

        let already_recorded = match within(deadline, self.record_step(record, direction)).await {
            Some(Ok(already)) => already,
            Some(Err(e)) => return Err(partial(key, direction, BookkeepingFailure::Storage(e))),
            None => return Err(partial(key, direction, BookkeepingFailure::TimedOut)),
        };

        let elapsed = started.elapsed();
        tracing::debug!("Finished {} {} in {:?}", direction, key, elapsed);

        Ok(StepOutcome {
            key: key.clone(),
            direction,
            already_recorded,
            elapsed,
        })
    }

    /// Run the operation on a copy of the snapshot
    async fn transform(
        &self,
        record: &ChangeRecord,
        direction: Direction,
        schema: Schema,
    ) -> Result<Schema, OperationError> {
        let operation = record.operation(direction).clone();
        let inverse = self
            .config
            .verify_reversible
            .then(|| record.operation(direction.reverse()).clone());

        let handle = tokio::task::spawn_blocking(move || {
            let base = inverse.as_ref().map(|_| schema.clone());
            let next = operation.invoke(schema)?;

            if let (Some(inverse), Some(base)) = (inverse, base) {
                let restored = inverse.invoke(next.clone()).map_err(|e| {
                    OperationError::Irreversible(format!(
                        "{} failed on the result: {}",
                        direction.reverse(),
                        e
                    ))
                })?;
                if restored != base {
                    return Err(OperationError::Irreversible(format!(
                        "{} does not restore the snapshot",
                        direction.reverse()
                    )));
                }
            }

            Ok(next)
        });

        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(OperationError::Panicked(panic_message(e.into_panic()))),
            Err(e) => Err(OperationError::failed(e.to_string())),
        }
    }

    /// Returns true when the state store already had the key
    async fn record_step(&self, record: &ChangeRecord, direction: Direction) -> StorageResult<bool> {
        match direction {
            Direction::Up => match self.state.mark_applied(record.key(), record.name()).await? {
                MarkOutcome::Inserted => Ok(false),
                MarkOutcome::AlreadyApplied => {
                    tracing::warn!("Migration {} was already recorded as applied", record.key());
                    Ok(true)
                }
            },
            Direction::Down => {
                self.state.mark_reverted(record.key()).await?;
                Ok(false)
            }
        }
    }
}

async fn within<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

fn timed_out(key: &MigrationKey, direction: Direction, effect_unknown: bool) -> StepError {
    StepError::Timeout {
        key: key.clone(),
        direction,
        effect_unknown,
    }
}

fn partial(key: &MigrationKey, direction: Direction, cause: BookkeepingFailure) -> StepError {
    match direction {
        Direction::Up => StepError::PartiallyApplied {
            key: key.clone(),
            cause,
        },
        Direction::Down => StepError::PartiallyReverted {
            key: key.clone(),
            cause,
        },
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
