//! Persisted bookkeeping types

use crate::key::MigrationKey;
use crate::record::Direction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the applied-migrations table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRecord {
    pub key: MigrationKey,

    pub name: String,

    pub applied_at: DateTime<Utc>,
}

impl AppliedRecord {
    pub fn new(key: MigrationKey, name: impl Into<String>, applied_at: DateTime<Utc>) -> Self {
        Self {
            key,
            name: name.into(),
            applied_at,
        }
    }

    /// Order records by application time, breaking ties by key
    pub fn sort(records: &mut [AppliedRecord]) {
        records.sort_by(|a, b| {
            a.applied_at
                .cmp(&b.applied_at)
                .then_with(|| a.key.cmp(&b.key))
        });
    }

    /// Timestamp for a new row that never sorts before `latest`.
    ///
    /// Wall clocks can step backwards; stores use this so application order
    /// and timestamp order agree.
    pub fn next_timestamp(latest: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let now = Utc::now();
        match latest {
            Some(latest) if latest > now => latest,
            _ => now,
        }
    }
}

/// The last step committed to the target store.
///
/// Written atomically with the schema so the engine can tell whether the
/// state store missed the bookkeeping for that step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMarker {
    pub key: MigrationKey,

    pub direction: Direction,

    pub committed_at: DateTime<Utc>,
}

impl StepMarker {
    pub fn new(key: MigrationKey, direction: Direction) -> Self {
        Self {
            key,
            direction,
            committed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key(s: &str) -> MigrationKey {
        s.parse().unwrap()
    }

    #[test]
    fn test_sort_by_time_then_key() {
        let t = Utc::now();
        let mut records = vec![
            AppliedRecord::new(key("3_c"), "c", t + Duration::seconds(1)),
            AppliedRecord::new(key("2_b"), "b", t),
            AppliedRecord::new(key("1_a"), "a", t),
        ];
        AppliedRecord::sort(&mut records);
        let keys: Vec<String> = records.iter().map(|r| r.key.to_string()).collect();
        assert_eq!(keys, vec!["1_a", "2_b", "3_c"]);
    }

    #[test]
    fn test_next_timestamp_never_goes_backwards() {
        let future = Utc::now() + Duration::hours(1);
        assert_eq!(AppliedRecord::next_timestamp(Some(future)), future);
        assert!(AppliedRecord::next_timestamp(None) <= Utc::now());
    }
}
