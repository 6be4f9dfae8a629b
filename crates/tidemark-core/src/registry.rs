//! Registry of change records
//!
//! The registry is built once from an explicit source and owns the ordered
//! records for the rest of the process. There is no global registration.

use crate::error::{Error, Result};
use crate::key::MigrationKey;
use crate::record::ChangeRecord;

/// Something change records can be discovered from
pub trait RecordSource {
    /// Discover every record. Must not have side effects.
    fn discover(&self) -> Result<Vec<ChangeRecord>>;
}

impl RecordSource for Vec<ChangeRecord> {
    fn discover(&self) -> Result<Vec<ChangeRecord>> {
        Ok(self.clone())
    }
}

impl RecordSource for [ChangeRecord] {
    fn discover(&self) -> Result<Vec<ChangeRecord>> {
        Ok(self.to_vec())
    }
}

/// Change records in strict key order
#[derive(Debug, Clone, Default)]
pub struct Registry {
    records: Vec<ChangeRecord>,
}

impl Registry {
    /// Discover records from `source` and order them
    pub fn load<S: RecordSource + ?Sized>(source: &S) -> Result<Self> {
        let records = source.discover()?;
        let registry = Self::from_records(records)?;
        tracing::debug!("Loaded {} change records", registry.len());
        Ok(registry)
    }

    /// Order records by key; two records with the same key is an error
    pub fn from_records(mut records: Vec<ChangeRecord>) -> Result<Self> {
        records.sort_by(|a, b| a.key().cmp(b.key()));

        if let Some(pair) = records.windows(2).find(|w| w[0].key() == w[1].key()) {
            return Err(Error::DuplicateKey(pair[0].key().clone()));
        }

        Ok(Self { records })
    }

    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    pub fn keys(&self) -> impl Iterator<Item = &MigrationKey> {
        self.records.iter().map(ChangeRecord::key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn latest(&self) -> Option<&ChangeRecord> {
        self.records.last()
    }

    pub fn position(&self, key: &MigrationKey) -> Option<usize> {
        self.records.binary_search_by(|r| r.key().cmp(key)).ok()
    }

    pub fn get(&self, key: &MigrationKey) -> Option<&ChangeRecord> {
        self.position(key).map(|i| &self.records[i])
    }

    /// Resolve an operator-supplied reference to a registered key.
    ///
    /// Accepts a full key (`1749253307_updated_users`) or a bare timestamp
    /// when exactly one record carries it.
    pub fn resolve(&self, reference: &str) -> Result<&MigrationKey> {
        if let Ok(key) = reference.parse::<MigrationKey>() {
            return self
                .get(&key)
                .map(ChangeRecord::key)
                .ok_or_else(|| Error::UnknownKey(reference.to_string()));
        }

        let timestamp: u64 = reference
            .parse()
            .map_err(|_| Error::UnknownKey(reference.to_string()))?;

        let matches: Vec<&MigrationKey> = self
            .keys()
            .filter(|k| k.timestamp() == timestamp)
            .collect();

        match matches.as_slice() {
            [] => Err(Error::UnknownKey(reference.to_string())),
            [key] => Ok(*key),
            many => Err(Error::AmbiguousKey {
                reference: reference.to_string(),
                candidates: many
                    .iter()
                    .map(|k| k.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Operation;

    fn record(key: &str) -> ChangeRecord {
        ChangeRecord::new(key.parse().unwrap(), Operation::noop(), Operation::noop())
    }

    #[test]
    fn test_records_are_ordered_by_key() {
        let registry = Registry::from_records(vec![
            record("1750341003_updated_queries"),
            record("1749251593_updated_users"),
            record("1749837095_deleted_roles"),
        ])
        .unwrap();

        let keys: Vec<String> = registry.keys().map(|k| k.to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "1749251593_updated_users",
                "1749837095_deleted_roles",
                "1750341003_updated_queries"
            ]
        );
        assert_eq!(registry.latest().unwrap().name(), "updated_queries");
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let err = Registry::from_records(vec![record("1_a"), record("2_b"), record("1_a")])
            .unwrap_err();
        match err {
            Error::DuplicateKey(key) => assert_eq!(key.to_string(), "1_a"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_is_idempotent() {
        let source = vec![record("2_b"), record("1_a")];
        let first = Registry::load(&source).unwrap();
        let second = Registry::load(&source).unwrap();
        let a: Vec<_> = first.keys().collect();
        let b: Vec<_> = second.keys().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_resolve_references() {
        let registry =
            Registry::from_records(vec![record("10_a"), record("20_b"), record("20_c")]).unwrap();

        assert_eq!(registry.resolve("10_a").unwrap().to_string(), "10_a");
        assert_eq!(registry.resolve("10").unwrap().to_string(), "10_a");
        assert!(matches!(registry.resolve("20"), Err(Error::AmbiguousKey { .. })));
        assert!(matches!(registry.resolve("30"), Err(Error::UnknownKey(_))));
        assert!(matches!(registry.resolve("10_zz"), Err(Error::UnknownKey(_))));
        assert!(matches!(registry.resolve("garbage"), Err(Error::UnknownKey(_))));
    }

    #[test]
    fn test_position_and_get() {
        let registry = Registry::from_records(vec![record("1_a"), record("2_b")]).unwrap();
        let key: MigrationKey = "2_b".parse().unwrap();
        assert_eq!(registry.position(&key), Some(1));
        assert!(registry.get(&"3_c".parse().unwrap()).is_none());
    }
}
