//! Manifest directory source
//!
//! Each change record lives in its own JSON file named after its key:
//!
//! ```text
//! migrations/
//!   1749253307_updated_users.json
//!   1750341003_updated_queries.json
//! ```
//!
//! with the shape
//!
//! ```json
//! {
//!   "name": "optional display name",
//!   "up":   [ { "op": "add_field", "collection": "queries", "at": 5, "field": { ... } } ],
//!   "down": [ { "op": "remove_field", "collection": "queries", "field_id": "text145363567" } ]
//! }
//! ```
//!
//! Both `up` and `down` are required. Files without a `.json` extension are
//! ignored and subdirectories are not walked.

use crate::error::{Error, Result};
use crate::key::MigrationKey;
use crate::operation::Operation;
use crate::patch::Patch;
use crate::record::ChangeRecord;
use crate::registry::RecordSource;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Extension of manifest files
pub const MANIFEST_EXTENSION: &str = "json";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    up: Option<Vec<Patch>>,
    #[serde(default)]
    down: Option<Vec<Patch>>,
}

/// A directory of JSON change records
#[derive(Debug, Clone)]
pub struct ManifestDir {
    path: PathBuf,
}

impl ManifestDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse a single manifest file
    pub fn parse_file(path: &Path) -> Result<ChangeRecord> {
        let origin = path.display().to_string();

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::malformed(&origin, "file name is not valid UTF-8"))?;
        let key: MigrationKey = stem.parse().map_err(|_| {
            Error::malformed(&origin, "file name must be <timestamp>_<slug>.json")
        })?;

        let content = std::fs::read_to_string(path)?;
        Self::parse_str(key, &content).map_err(|e| match e {
            Error::MalformedRecord { reason, .. } => Error::malformed(&origin, reason),
            other => other,
        })
    }

    /// Parse manifest content for a known key
    pub fn parse_str(key: MigrationKey, content: &str) -> Result<ChangeRecord> {
        let origin = key.to_string();
        let manifest: ManifestFile =
            serde_json::from_str(content).map_err(|e| Error::malformed(&origin, e.to_string()))?;

        let up = manifest
            .up
            .ok_or_else(|| Error::malformed(&origin, "missing required `up` operation"))?;
        let down = manifest
            .down
            .ok_or_else(|| Error::malformed(&origin, "missing required `down` operation"))?;

        let mut record = ChangeRecord::new(key, Operation::from_patches(up), Operation::from_patches(down));
        if let Some(name) = manifest.name {
            record = record.with_name(name);
        }
        Ok(record)
    }
}

impl RecordSource for ManifestDir {
    fn discover(&self) -> Result<Vec<ChangeRecord>> {
        if !self.path.is_dir() {
            return Err(Error::SourceNotFound(self.path.clone()));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(MANIFEST_EXTENSION) {
                tracing::debug!("Skipping non-manifest file: {:?}", path);
                continue;
            }
            paths.push(path);
        }
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            records.push(Self::parse_file(&path)?);
        }

        tracing::debug!("Discovered {} manifests in {:?}", records.len(), self.path);
        Ok(records)
    }
}
