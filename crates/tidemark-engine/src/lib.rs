//! Tidemark Engine - Plans and executes migrations
//!
//! Drift checks and planning are pure functions over the registry and the
//! applied set. The executor runs one step against the stores, the runner
//! sequences steps and reports the outcome.

#![allow(clippy::result_large_err)]

pub mod error;
pub mod executor;
pub mod planner;
pub mod runner;

#[cfg(test)]
mod testing;

pub use error::{BookkeepingFailure, EngineError, EngineResult, StepError};
pub use executor::{Executor, ExecutorConfig, StepOutcome};
pub use planner::{build_plan, check_drift, Target};
pub use runner::{RunReport, RunState, Runner, StatusReport, StepFailure};
