//! Drift detection and plan computation
//!
//! Both functions are pure: they look at the registry, the applied records
//! and the target store's last step marker, and never touch a store.

use crate::error::{EngineError, EngineResult};
use tidemark_core::{
    AppliedRecord, ChangeRecord, Direction, Error, MigrationKey, MigrationPlan, PlanStep, Registry,
    StepMarker,
};

/// Where a run should leave the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Apply everything pending
    Latest,
    /// Apply pending records up to and including the key
    UpTo(MigrationKey),
    /// Revert records applied after the key; the key stays applied
    DownTo(MigrationKey),
    /// Revert the last `n` applied records
    DownSteps(usize),
    /// Revert everything
    Zero,
    /// Move up or down so the key becomes the last applied record
    Version(MigrationKey),
}

/// Check that the applied records are consistent with the registry and
/// with the last step the target store committed.
pub fn check_drift(
    registry: &Registry,
    applied: &[AppliedRecord],
    last_step: Option<&StepMarker>,
) -> EngineResult<()> {
    for pair in applied.windows(2) {
        if pair[0].key >= pair[1].key {
            return Err(EngineError::drift(format!(
                "{} was recorded after {} but sorts before it",
                pair[1].key, pair[0].key
            )));
        }
    }

    let records = registry.records();
    for (index, entry) in applied.iter().enumerate() {
        if registry.position(&entry.key).is_none() {
            return Err(EngineError::drift(format!(
                "applied migration {} is not in the registry",
                entry.key
            )));
        }
        let expected = records[index].key();
        if &entry.key != expected {
            return Err(EngineError::drift(format!(
                "{} is applied while earlier migration {} is not",
                entry.key, expected
            )));
        }
    }

    let Some(marker) = last_step else {
        return Ok(());
    };

    match marker.direction {
        Direction::Up => {
            let head = applied.last().map(|r| &r.key);
            if head != Some(&marker.key) {
                return Err(EngineError::drift(format!(
                    "target store committed up {} but the state store head is {}; \
                     record it with `resolve {} --direction up` once verified",
                    marker.key,
                    describe_head(head),
                    marker.key
                )));
            }
        }
        Direction::Down => {
            // The reverted key may since have left the registry or gained
            // earlier siblings; only a key still recorded as applied is drift.
            if applied.iter().any(|r| r.key == marker.key) {
                return Err(EngineError::drift(format!(
                    "target store committed down {} but the state store head is {}; \
                     record it with `resolve {} --direction down` once verified",
                    marker.key,
                    describe_head(applied.last().map(|r| &r.key)),
                    marker.key
                )));
            }
        }
    }

    Ok(())
}

fn describe_head(head: Option<&MigrationKey>) -> String {
    head.map(|k| k.to_string())
        .unwrap_or_else(|| "empty".to_string())
}

/// Compute the minimal contiguous plan from `applied_count` applied records
/// to `target`. Up plans ascend, down plans descend.
pub fn build_plan(
    registry: &Registry,
    applied_count: usize,
    target: &Target,
) -> EngineResult<MigrationPlan> {
    let total = registry.len();
    let current = applied_count.min(total);

    let position = |key: &MigrationKey| {
        registry
            .position(key)
            .ok_or_else(|| EngineError::from(Error::UnknownKey(key.to_string())))
    };

    let (range, direction) = match target {
        Target::Latest => (current..total, Direction::Up),
        Target::UpTo(key) => {
            let end = position(key)? + 1;
            (current..end.max(current), Direction::Up)
        }
        Target::DownTo(key) => {
            let keep = position(key)? + 1;
            (keep.min(current)..current, Direction::Down)
        }
        Target::DownSteps(steps) => (current.saturating_sub(*steps)..current, Direction::Down),
        Target::Zero => (0..current, Direction::Down),
        Target::Version(key) => {
            let index = position(key)?;
            if index >= current {
                (current..index + 1, Direction::Up)
            } else {
                (index + 1..current, Direction::Down)
            }
        }
    };

    let records = &registry.records()[range];
    let step = |r: &ChangeRecord| PlanStep {
        key: r.key().clone(),
        name: r.name().to_string(),
        direction,
    };

    let steps: Vec<PlanStep> = match direction {
        Direction::Up => records.iter().map(step).collect(),
        Direction::Down => records.iter().rev().map(step).collect(),
    };

    Ok(MigrationPlan::new(steps))
}
