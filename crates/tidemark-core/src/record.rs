//! Change records and step directions

use crate::key::MigrationKey;
use crate::operation::Operation;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a migration step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One migration step: a key plus a forward and a backward operation.
///
/// Records are immutable once built; the registry hands out shared
/// references only.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    key: MigrationKey,
    name: String,
    up: Operation,
    down: Operation,
}

impl ChangeRecord {
    /// Create a record named after its key's slug
    pub fn new(key: MigrationKey, up: Operation, down: Operation) -> Self {
        Self {
            name: key.slug().to_string(),
            key,
            up,
            down,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn key(&self) -> &MigrationKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn up(&self) -> &Operation {
        &self.up
    }

    pub fn down(&self) -> &Operation {
        &self.down
    }

    /// The operation to run for a step in `direction`
    pub fn operation(&self, direction: Direction) -> &Operation {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_defaults_name_to_slug() {
        let key: MigrationKey = "1749837095_deleted_roles".parse().unwrap();
        let record = ChangeRecord::new(key, Operation::noop(), Operation::noop());
        assert_eq!(record.name(), "deleted_roles");

        let record = record.with_name("Drop roles collection");
        assert_eq!(record.name(), "Drop roles collection");
    }

    #[test]
    fn test_direction_reverse() {
        assert_eq!(Direction::Up.reverse(), Direction::Down);
        assert_eq!(Direction::Down.to_string(), "down");
    }
}
