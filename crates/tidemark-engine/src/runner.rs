//! Run orchestration
//!
//! The runner owns the registry and the executor. Every entry point that
//! reads state checks it for drift first; `run` then executes the plan one
//! step at a time and stops at the first failure.

use crate::error::{EngineError, EngineResult};
use crate::executor::Executor;
use crate::planner::{build_plan, check_drift, Target};
use serde::Serialize;
use tidemark_core::{
    AppliedRecord, ChangeRecord, Direction, Error, MigrationKey, MigrationPlan, PlanStep, Registry,
    StepMarker,
};
use tokio_util::sync::CancellationToken;

/// Lifecycle of a runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Planning,
    Executing,
    Succeeded,
    Failed,
    PartiallyFailed,
}

/// The step that stopped a run
#[derive(Debug)]
pub struct StepFailure {
    pub key: MigrationKey,
    pub error: EngineError,
}

/// Outcome of one `run`
#[derive(Debug)]
pub struct RunReport {
    pub state: RunState,
    pub plan: MigrationPlan,
    /// Steps that finished, in execution order
    pub completed: Vec<MigrationKey>,
    pub failure: Option<StepFailure>,
    /// Last applied key according to the state store after the run
    pub last_applied: Option<MigrationKey>,
}

impl RunReport {
    /// Planned steps that never ran
    pub fn skipped(&self) -> &[PlanStep] {
        let done = self.completed.len() + usize::from(self.failure.is_some());
        &self.plan.steps[done.min(self.plan.len())..]
    }
}

/// Applied versus pending, without touching either store
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub applied: Vec<AppliedRecord>,
    pub pending: Vec<PlanStep>,
    pub head: Option<MigrationKey>,
    pub last_step: Option<StepMarker>,
    pub drift: Option<String>,
}

impl StatusReport {
    pub fn in_sync(&self) -> bool {
        self.drift.is_none() && self.pending.is_empty()
    }
}

/// Plans and drives migrations against one target store
pub struct Runner {
    registry: Registry,
    executor: Executor,
    state: RunState,
}

impl Runner {
    pub fn new(registry: Registry, executor: Executor) -> Self {
        Self {
            registry,
            executor,
            state: RunState::Idle,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Applied records, after checking them against the registry and the
    /// target store's last committed step
    async fn checked_applied(&self) -> EngineResult<Vec<AppliedRecord>> {
        let applied = self.executor.state_store().list_applied().await?;
        let last_step = self.executor.target_store().last_step().await?;
        check_drift(&self.registry, &applied, last_step.as_ref())?;
        Ok(applied)
    }

    /// Compute the plan for `target` without executing it
    pub async fn plan(&self, target: &Target) -> EngineResult<MigrationPlan> {
        let applied = self.checked_applied().await?;
        build_plan(&self.registry, applied.len(), target)
    }

    /// Plan and execute.
    ///
    /// Drift and planning errors are returned as `Err` before anything runs.
    /// Step failures end the run and are reported in the returned
    /// [`RunReport`] with state `Failed` or `PartiallyFailed`.
    pub async fn run(
        &mut self,
        target: &Target,
        cancel: &CancellationToken,
    ) -> EngineResult<RunReport> {
        self.state = RunState::Planning;

        let prepared = self.prepare(target).await;
        let (plan, records, mut head) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                self.state = RunState::Failed;
                return Err(e);
            }
        };

        self.state = RunState::Executing;
        if plan.is_empty() {
            tracing::info!("Nothing to do");
        } else {
            tracing::info!("Executing {} step(s)", plan.len());
        }

        let mut completed = Vec::new();
        let mut failure = None;

        for record in &records {
            let key = record.key();
            let direction = plan.direction().unwrap_or(Direction::Up);

            if cancel.is_cancelled() {
                tracing::warn!("Run cancelled before {} {}", direction, key);
                failure = Some(StepFailure {
                    key: key.clone(),
                    error: EngineError::Cancelled(key.clone()),
                });
                break;
            }

            let result = match direction {
                Direction::Up => self.executor.apply(record).await,
                Direction::Down => self.executor.revert(record).await,
            };

            match result {
                Ok(outcome) => {
                    tracing::info!(
                        "{} {} ({} ms)",
                        past_tense(direction),
                        key,
                        outcome.elapsed.as_millis()
                    );
                    head = self.head_after(key, direction);
                    completed.push(key.clone());
                }
                Err(e) => {
                    tracing::error!("{}", e);
                    failure = Some(StepFailure {
                        key: key.clone(),
                        error: EngineError::Step(e),
                    });
                    break;
                }
            }
        }

        self.state = match &failure {
            None => RunState::Succeeded,
            Some(f) if f.error.is_partial() => RunState::PartiallyFailed,
            Some(_) => RunState::Failed,
        };

        match &head {
            Some(head) => tracing::info!("Run finished ({:?}), head is {}", self.state, head),
            None => tracing::info!("Run finished ({:?}), nothing applied", self.state),
        }

        Ok(RunReport {
            state: self.state,
            plan,
            completed,
            failure,
            last_applied: head,
        })
    }

    async fn prepare(
        &self,
        target: &Target,
    ) -> EngineResult<(MigrationPlan, Vec<ChangeRecord>, Option<MigrationKey>)> {
        let applied = self.checked_applied().await?;
        let plan = build_plan(&self.registry, applied.len(), target)?;

        let records = plan
            .steps
            .iter()
            .map(|step| {
                self.registry
                    .get(&step.key)
                    .cloned()
                    .ok_or_else(|| EngineError::from(Error::UnknownKey(step.key.to_string())))
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let head = applied.last().map(|r| r.key.clone());
        Ok((plan, records, head))
    }

    fn head_after(&self, key: &MigrationKey, direction: Direction) -> Option<MigrationKey> {
        match direction {
            Direction::Up => Some(key.clone()),
            Direction::Down => {
                let position = self.registry.position(key)?;
                position
                    .checked_sub(1)
                    .map(|previous| self.registry.records()[previous].key().clone())
            }
        }
    }

    /// Applied and pending records, plus any drift. Never mutates.
    pub async fn status(&self) -> EngineResult<StatusReport> {
        let applied = self.executor.state_store().list_applied().await?;
        let last_step = self.executor.target_store().last_step().await?;

        let drift = match check_drift(&self.registry, &applied, last_step.as_ref()) {
            Ok(()) => None,
            Err(EngineError::StateDrift(reason)) => Some(reason),
            Err(e) => return Err(e),
        };

        let pending = self
            .registry
            .records()
            .iter()
            .filter(|record| !applied.iter().any(|a| &a.key == record.key()))
            .map(|record| PlanStep {
                key: record.key().clone(),
                name: record.name().to_string(),
                direction: Direction::Up,
            })
            .collect();

        let head = applied.last().map(|r| r.key.clone());

        Ok(StatusReport {
            applied,
            pending,
            head,
            last_step,
            drift,
        })
    }

    /// Record the bookkeeping for a step the target store committed but the
    /// state store missed.
    ///
    /// Only accepted when the target store's last step is exactly
    /// `direction key` and recording it keeps the applied set a prefix.
    pub async fn resolve(&self, key: &MigrationKey, direction: Direction) -> EngineResult<()> {
        let refuse = |reason: String| EngineError::Resolve {
            key: key.clone(),
            reason,
        };

        let record = self
            .registry
            .get(key)
            .ok_or_else(|| EngineError::from(Error::UnknownKey(key.to_string())))?;
        let position = self.registry.position(key).unwrap_or_default();

        let state = self.executor.state_store();
        let applied = state.list_applied().await?;
        check_drift(&self.registry, &applied, None)?;

        let last_step = self.executor.target_store().last_step().await?;
        match &last_step {
            Some(marker) if &marker.key == key && marker.direction == direction => {}
            Some(marker) => {
                return Err(refuse(format!(
                    "the target store's last committed step is {} {}",
                    marker.direction, marker.key
                )))
            }
            None => {
                return Err(refuse(
                    "the target store has no committed step".to_string(),
                ))
            }
        }

        match direction {
            Direction::Up => {
                if applied.len() != position {
                    return Err(refuse("it is not the next pending migration".to_string()));
                }
                state.mark_applied(key, record.name()).await?;
            }
            Direction::Down => {
                if applied.last().map(|r| &r.key) != Some(key) {
                    return Err(refuse("it is not the last applied migration".to_string()));
                }
                state.mark_reverted(key).await?;
            }
        }

        tracing::info!("Resolved {} {}", direction, key);
        Ok(())
    }
}

fn past_tense(direction: Direction) -> &'static str {
    match direction {
        Direction::Up => "Applied",
        Direction::Down => "Reverted",
    }
}
