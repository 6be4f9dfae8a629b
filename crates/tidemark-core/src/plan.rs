//! Migration plans

use crate::key::MigrationKey;
use crate::record::Direction;
use serde::Serialize;

/// One planned step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStep {
    pub key: MigrationKey,
    pub name: String,
    pub direction: Direction,
}

/// Ordered steps computed for a single invocation; never persisted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    pub steps: Vec<PlanStep>,
}

impl MigrationPlan {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn keys(&self) -> Vec<&MigrationKey> {
        self.steps.iter().map(|s| &s.key).collect()
    }

    /// Direction shared by every step, if the plan is non-empty
    pub fn direction(&self) -> Option<Direction> {
        self.steps.first().map(|s| s.direction)
    }
}
