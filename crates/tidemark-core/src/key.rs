//! Migration keys
//!
//! A key is the timestamp a change record was created at plus a slug,
//! rendered as `<timestamp>_<slug>` (e.g. `1749253307_updated_users`).
//! Keys order by timestamp first, then slug.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum slug length
pub const MAX_SLUG_LEN: usize = 128;

/// Orderable identifier of a change record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MigrationKey {
    timestamp: u64,
    slug: String,
}

impl MigrationKey {
    /// Create a key, validating the slug
    pub fn new(timestamp: u64, slug: impl Into<String>) -> Result<Self> {
        let slug = slug.into();
        if !Self::validate_slug(&slug) {
            return Err(Error::InvalidKey(format!("{}_{}", timestamp, slug)));
        }
        Ok(Self { timestamp, slug })
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Validate slug (non-empty, alphanumeric with underscores/hyphens)
    pub fn validate_slug(slug: &str) -> bool {
        !slug.is_empty()
            && slug.len() <= MAX_SLUG_LEN
            && slug
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }
}

impl fmt::Display for MigrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.timestamp, self.slug)
    }
}

impl FromStr for MigrationKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (timestamp, slug) = s
            .split_once('_')
            .ok_or_else(|| Error::InvalidKey(s.to_string()))?;

        if timestamp.is_empty() || !timestamp.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::InvalidKey(s.to_string()));
        }
        let timestamp = timestamp
            .parse::<u64>()
            .map_err(|_| Error::InvalidKey(s.to_string()))?;

        Self::new(timestamp, slug)
    }
}

impl TryFrom<String> for MigrationKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<MigrationKey> for String {
    fn from(key: MigrationKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let key: MigrationKey = "1749253307_updated_users".parse().unwrap();
        assert_eq!(key.timestamp(), 1749253307);
        assert_eq!(key.slug(), "updated_users");
        assert_eq!(key.to_string(), "1749253307_updated_users");
    }

    #[test]
    fn test_ordering_is_timestamp_first() {
        let a: MigrationKey = "9_zzz".parse().unwrap();
        let b: MigrationKey = "10_aaa".parse().unwrap();
        let c: MigrationKey = "10_bbb".parse().unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_rejects_invalid_keys() {
        assert!("updated_users".parse::<MigrationKey>().is_err());
        assert!("1749253307".parse::<MigrationKey>().is_err());
        assert!("1749253307_".parse::<MigrationKey>().is_err());
        assert!("17x9_slug".parse::<MigrationKey>().is_err());
        assert!("1749253307_has space".parse::<MigrationKey>().is_err());
        assert!("-1_slug".parse::<MigrationKey>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let key = MigrationKey::new(1750341003, "updated_queries").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"1750341003_updated_queries\"");
        let back: MigrationKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_str::<MigrationKey>("\"nope\"").is_err());
    }
}
